use std::collections::VecDeque;

pub(crate) const SAMPLE_RATE: u32 = 16_000;
pub(crate) const FRAME_MS: u32 = 30;
pub(crate) const FRAME_SAMPLES: usize = (SAMPLE_RATE * FRAME_MS / 1000) as usize;
/// One second of frames.
pub(crate) const RING_FRAMES: usize = (1000 / FRAME_MS) as usize;
/// Eight seconds of frames since the last reset.
pub(crate) const MAX_SEGMENT_FRAMES: usize = (8000 / FRAME_MS) as usize;

const TRIGGER_RATIO: f64 = 0.9;
const RELEASE_RATIO: f64 = 0.8;

/// Per-frame voice activity decision.
pub(crate) trait SpeechClassifier {
    fn is_speech(&mut self, frame: &[i16]) -> bool;
}

/// RMS energy gate. Good enough for a close microphone in a quiet room.
pub(crate) struct EnergyClassifier {
    pub(crate) threshold_rms: f64,
}

impl Default for EnergyClassifier {
    fn default() -> Self {
        Self { threshold_rms: 500.0 }
    }
}

impl SpeechClassifier for EnergyClassifier {
    fn is_speech(&mut self, frame: &[i16]) -> bool {
        if frame.is_empty() {
            return false;
        }
        let sum: f64 = frame.iter().map(|&s| (s as f64) * (s as f64)).sum();
        (sum / frame.len() as f64).sqrt() >= self.threshold_rms
    }
}

/// Ring-buffer hysteresis segmenter.
///
/// Idle: frames enter the ring; more than 90% voiced triggers, seeding the
/// utterance with the ring. Triggered: every frame is collected; more than
/// 80% unvoiced in the ring flushes. Independently, after
/// `MAX_SEGMENT_FRAMES` frames since the last reset, whatever was collected
/// is flushed and all state resets.
pub(crate) struct VadSegmenter {
    ring: VecDeque<(Vec<i16>, bool)>,
    voiced: Vec<i16>,
    triggered: bool,
    frames_since_reset: usize,
}

impl Default for VadSegmenter {
    fn default() -> Self {
        Self::new()
    }
}

impl VadSegmenter {
    pub(crate) fn new() -> Self {
        Self {
            ring: VecDeque::with_capacity(RING_FRAMES),
            voiced: Vec::new(),
            triggered: false,
            frames_since_reset: 0,
        }
    }

    pub(crate) fn is_triggered(&self) -> bool {
        self.triggered
    }

    fn push_ring(&mut self, frame: &[i16], is_speech: bool) {
        if self.ring.len() == RING_FRAMES {
            self.ring.pop_front();
        }
        self.ring.push_back((frame.to_vec(), is_speech));
    }

    fn count(&self, speech: bool) -> usize {
        self.ring.iter().filter(|(_, s)| *s == speech).count()
    }

    /// Feeds one frame; returns a finished utterance (PCM samples) if one closed.
    pub(crate) fn push(&mut self, frame: &[i16], is_speech: bool) -> Option<Vec<i16>> {
        let mut flushed = None;
        self.frames_since_reset += 1;

        if !self.triggered {
            self.push_ring(frame, is_speech);
            if self.count(true) as f64 > TRIGGER_RATIO * RING_FRAMES as f64 {
                self.triggered = true;
                for (f, _) in self.ring.drain(..) {
                    self.voiced.extend_from_slice(&f);
                }
            }
        } else {
            self.voiced.extend_from_slice(frame);
            self.push_ring(frame, is_speech);
            if self.count(false) as f64 > RELEASE_RATIO * RING_FRAMES as f64 {
                flushed = Some(std::mem::take(&mut self.voiced));
                self.triggered = false;
                self.ring.clear();
                self.frames_since_reset = 0;
            }
        }

        if self.frames_since_reset > MAX_SEGMENT_FRAMES {
            if !self.voiced.is_empty() {
                flushed = Some(std::mem::take(&mut self.voiced));
            }
            self.triggered = false;
            self.ring.clear();
            self.frames_since_reset = 0;
        }

        flushed
    }
}
