//! Live transcription helper.
//!
//! Runs as its own process (`akari transcribe`) so the bot can start and stop
//! listening by spawning and killing it. Stdout carries one line per event:
//! `READY` once capture is open, `ERROR: …` on recoverable failures, and
//! otherwise recognised text.

mod coalesce;
mod source;
mod vad;
mod whisper;

#[allow(unused_imports)]
pub(crate) use coalesce::*;
#[allow(unused_imports)]
pub(crate) use source::*;
#[allow(unused_imports)]
pub(crate) use vad::*;
#[allow(unused_imports)]
pub(crate) use whisper::*;

use std::io::{self, Write};

use crate::{AkariConfig, AkariResult};

/// Turns one utterance into text lines.
pub(crate) trait Recognizer {
    fn recognize(&self, samples: &[i16]) -> AkariResult<Vec<String>>;
}

impl Recognizer for WhisperClient {
    fn recognize(&self, samples: &[i16]) -> AkariResult<Vec<String>> {
        self.transcribe(samples)
    }
}

fn emit(out: &mut dyn Write, line: &str) -> io::Result<()> {
    writeln!(out, "{line}")?;
    out.flush()
}

/// Frame loop: classify, segment, recognise, coalesce, print.
pub(crate) fn transcribe_stream(
    source: &mut dyn AudioSource,
    classifier: &mut dyn SpeechClassifier,
    recognizer: &dyn Recognizer,
    out: &mut dyn Write,
) -> AkariResult<()> {
    let mut segmenter = VadSegmenter::new();
    let mut coalescer = TranscriptCoalescer::new();
    emit(out, "READY")?;

    while let Some(frame) = source.next_frame()? {
        let speech = classifier.is_speech(&frame);
        let Some(utterance) = segmenter.push(&frame, speech) else {
            continue;
        };
        tracing::debug!(samples = utterance.len(), "utterance closed");
        match recognizer.recognize(&utterance) {
            Ok(lines) => {
                for line in lines {
                    if let Some(text) = coalescer.push(&line) {
                        emit(out, &text)?;
                    }
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "recognition failed");
                emit(out, &format!("ERROR: {err}"))?;
            }
        }
    }

    if let Some(rest) = coalescer.finish() {
        emit(out, &rest)?;
    }
    Ok(())
}

#[derive(Debug, Clone, Default)]
pub(crate) struct TranscribeOptions {
    /// Input device index; `None` picks the default microphone.
    pub(crate) device: Option<usize>,
    /// Read s16le PCM from stdin instead of a microphone.
    pub(crate) stdin: bool,
    pub(crate) list_devices: bool,
}

pub(crate) fn run_transcriber(config: &AkariConfig, options: &TranscribeOptions) -> AkariResult<()> {
    let mut stdout = io::stdout().lock();

    if options.list_devices {
        #[cfg(feature = "microphone")]
        for (i, name) in list_input_devices()?.iter().enumerate() {
            writeln!(stdout, "{i}: {name}")?;
        }
        #[cfg(not(feature = "microphone"))]
        writeln!(stdout, "built without the `microphone` feature")?;
        return Ok(());
    }

    let recognizer = WhisperClient::new(config.whisper.clone(), config.http_timeout_ms)?;
    let mut classifier = EnergyClassifier::default();
    let mut source = open_source(options)?;
    tracing::info!(url = %config.whisper.url, model = %config.whisper.model, "transcriber started");
    transcribe_stream(source.as_mut(), &mut classifier, &recognizer, &mut stdout)
}

fn open_source(options: &TranscribeOptions) -> AkariResult<Box<dyn AudioSource>> {
    if options.stdin {
        return Ok(Box::new(PcmReaderSource::new(io::stdin())));
    }
    #[cfg(feature = "microphone")]
    {
        Ok(Box::new(MicrophoneSource::open(options.device)?))
    }
    #[cfg(not(feature = "microphone"))]
    {
        let _ = options.device;
        Err(crate::AkariError::Config(
            "microphone capture needs the `microphone` feature; use --stdin".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AkariError;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    struct Frames(VecDeque<Vec<i16>>);

    impl AudioSource for Frames {
        fn next_frame(&mut self) -> AkariResult<Option<Vec<i16>>> {
            Ok(self.0.pop_front())
        }
    }

    struct Scripted(RefCell<VecDeque<AkariResult<Vec<String>>>>);

    impl Recognizer for Scripted {
        fn recognize(&self, _samples: &[i16]) -> AkariResult<Vec<String>> {
            self.0.borrow_mut().pop_front().unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    fn utterance(frames: &mut VecDeque<Vec<i16>>) {
        for _ in 0..40 {
            frames.push_back(vec![2000; FRAME_SAMPLES]);
        }
        for _ in 0..30 {
            frames.push_back(vec![0; FRAME_SAMPLES]);
        }
    }

    fn run(recognizer: Scripted, utterances: usize) -> Vec<String> {
        let mut frames = VecDeque::new();
        for _ in 0..utterances {
            utterance(&mut frames);
        }
        let mut out = Vec::new();
        transcribe_stream(
            &mut Frames(frames),
            &mut EnergyClassifier::default(),
            &recognizer,
            &mut out,
        )
        .unwrap();
        String::from_utf8(out).unwrap().lines().map(str::to_string).collect()
    }

    #[test]
    fn ready_then_coalesced_text() {
        let recognizer = Scripted(RefCell::new(VecDeque::from(vec![
            Ok(vec!["えっと".to_string()]),
            Ok(vec!["明日の予定を教えて".to_string()]),
        ])));
        assert_eq!(run(recognizer, 2), vec!["READY", "えっと明日の予定を教えて"]);
    }

    #[test]
    fn recognition_failure_is_reported_and_capture_continues() {
        let recognizer = Scripted(RefCell::new(VecDeque::from(vec![
            Err(AkariError::Transport("offline".to_string())),
            Ok(vec!["天気はどう？".to_string()]),
        ])));
        let lines = run(recognizer, 2);
        assert_eq!(lines[0], "READY");
        assert!(lines[1].starts_with("ERROR: "));
        assert_eq!(lines[2], "天気はどう？");
    }

    #[test]
    fn leftover_fragment_is_printed_at_end_of_input() {
        let recognizer = Scripted(RefCell::new(VecDeque::from(vec![Ok(vec!["はい".to_string()])])));
        assert_eq!(run(recognizer, 1), vec!["READY", "はい"]);
    }
}
