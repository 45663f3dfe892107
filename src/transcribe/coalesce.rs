const SHORT_FRAGMENT_CHARS: usize = 4;

/// Holds back very short recognitions ("はい", "えっと") so they are joined
/// to the next real sentence instead of triggering a chat turn on their own.
#[derive(Debug, Default)]
pub(crate) struct TranscriptCoalescer {
    buffer: String,
}

impl TranscriptCoalescer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Returns the line to emit, if any.
    pub(crate) fn push(&mut self, text: &str) -> Option<String> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        let len = text.chars().count();
        let buffered = self.buffer.chars().count();

        if len <= SHORT_FRAGMENT_CHARS {
            if !self.buffer.is_empty() && buffered <= SHORT_FRAGMENT_CHARS {
                self.buffer.push_str(text);
            } else {
                self.buffer = text.to_string();
            }
            return None;
        }

        if !self.buffer.is_empty() && buffered <= SHORT_FRAGMENT_CHARS {
            let joined = format!("{}{text}", self.buffer);
            self.buffer.clear();
            return Some(joined);
        }
        Some(text.to_string())
    }

    /// Whatever is still buffered at shutdown.
    pub(crate) fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buffer))
        }
    }
}
