use std::io::Read;

use super::vad::FRAME_SAMPLES;
use crate::AkariResult;

/// Yields fixed 30 ms frames of 16 kHz mono PCM. `None` means end of input.
pub(crate) trait AudioSource {
    fn next_frame(&mut self) -> AkariResult<Option<Vec<i16>>>;
}

/// Raw little-endian s16 PCM, e.g. `ffmpeg -f s16le -ar 16000 -ac 1 -`.
pub(crate) struct PcmReaderSource<R: Read> {
    reader: R,
    buf: Vec<u8>,
}

impl<R: Read> PcmReaderSource<R> {
    pub(crate) fn new(reader: R) -> Self {
        Self {
            reader,
            buf: vec![0u8; FRAME_SAMPLES * 2],
        }
    }
}

impl<R: Read> AudioSource for PcmReaderSource<R> {
    fn next_frame(&mut self) -> AkariResult<Option<Vec<i16>>> {
        let mut filled = 0;
        while filled < self.buf.len() {
            let n = self.reader.read(&mut self.buf[filled..])?;
            if n == 0 {
                // trailing partial frame is dropped
                return Ok(None);
            }
            filled += n;
        }
        let frame = self
            .buf
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        Ok(Some(frame))
    }
}

#[cfg(feature = "microphone")]
pub(crate) use mic::{list_input_devices, MicrophoneSource};

#[cfg(feature = "microphone")]
mod mic {
    use std::collections::VecDeque;
    use std::sync::mpsc::{self, Receiver, Sender};

    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use cpal::{Device, Stream, StreamConfig, StreamError};

    use super::super::vad::{FRAME_SAMPLES, SAMPLE_RATE};
    use super::AudioSource;
    use crate::{AkariError, AkariResult};

    fn audio_err(err: impl std::fmt::Display) -> AkariError {
        AkariError::Audio(err.to_string())
    }

    pub(crate) fn list_input_devices() -> AkariResult<Vec<String>> {
        let host = cpal::default_host();
        let devices = host.input_devices().map_err(audio_err)?;
        Ok(devices
            .map(|d| d.name().unwrap_or_else(|_| "<unknown>".to_string()))
            .collect())
    }

    fn select_device(index: Option<usize>) -> AkariResult<Device> {
        let host = cpal::default_host();
        match index {
            Some(i) => host
                .input_devices()
                .map_err(audio_err)?
                .nth(i)
                .ok_or_else(|| AkariError::Audio(format!("no input device at index {i}"))),
            None => host
                .default_input_device()
                .ok_or_else(|| AkariError::Audio("No input device".to_string())),
        }
    }

    fn log_stream_error(error: StreamError) {
        tracing::warn!(error = %error, "audio stream error");
    }

    /// Live microphone capture at 16 kHz mono.
    pub(crate) struct MicrophoneSource {
        _stream: Stream,
        rx: Receiver<Vec<i16>>,
        pending: VecDeque<i16>,
    }

    impl MicrophoneSource {
        pub(crate) fn open(index: Option<usize>) -> AkariResult<Self> {
            let device = select_device(index)?;
            tracing::info!(device = %device.name().unwrap_or_default(), "opening microphone");
            let config = StreamConfig {
                channels: 1,
                sample_rate: cpal::SampleRate(SAMPLE_RATE),
                buffer_size: cpal::BufferSize::Default,
            };
            let (tx, rx): (Sender<Vec<i16>>, Receiver<Vec<i16>>) = mpsc::channel();
            let stream = device
                .build_input_stream(
                    &config,
                    move |data: &[f32], _: &_| {
                        let chunk = data
                            .iter()
                            .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                            .collect();
                        let _ = tx.send(chunk);
                    },
                    log_stream_error,
                    None,
                )
                .map_err(audio_err)?;
            stream.play().map_err(audio_err)?;
            Ok(Self {
                _stream: stream,
                rx,
                pending: VecDeque::new(),
            })
        }
    }

    impl AudioSource for MicrophoneSource {
        fn next_frame(&mut self) -> AkariResult<Option<Vec<i16>>> {
            while self.pending.len() < FRAME_SAMPLES {
                match self.rx.recv() {
                    Ok(chunk) => self.pending.extend(chunk),
                    Err(_) => return Ok(None),
                }
            }
            Ok(Some(self.pending.drain(..FRAME_SAMPLES).collect()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn reads_whole_frames_and_drops_the_tail() {
        let mut bytes = Vec::new();
        for i in 0..(FRAME_SAMPLES * 2 + 10) {
            bytes.extend_from_slice(&(i as i16).to_le_bytes());
        }
        let mut source = PcmReaderSource::new(Cursor::new(bytes));
        let first = source.next_frame().unwrap().unwrap();
        assert_eq!(first.len(), FRAME_SAMPLES);
        assert_eq!(first[1], 1);
        let second = source.next_frame().unwrap().unwrap();
        assert_eq!(second[0], FRAME_SAMPLES as i16);
        assert!(source.next_frame().unwrap().is_none());
    }
}
