use crate::{Content, Part};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Speaker {
    Master,
    Akari,
}

impl Speaker {
    pub(crate) fn label(self) -> &'static str {
        match self {
            Speaker::Master => "マスター",
            Speaker::Akari => "あかり",
        }
    }

    fn gemini_role(self) -> &'static str {
        match self {
            Speaker::Master => "user",
            Speaker::Akari => "model",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ConversationTurn {
    pub(crate) speaker: Speaker,
    pub(crate) text: String,
}

/// Short-term conversation buffer. Lives for the process, cleared by `!forget`.
#[derive(Debug, Default)]
pub(crate) struct ConversationMemory {
    turns: Vec<ConversationTurn>,
}

impl ConversationMemory {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add_master(&mut self, text: impl Into<String>) {
        self.push(Speaker::Master, text.into());
    }

    pub(crate) fn add_akari(&mut self, text: impl Into<String>) {
        self.push(Speaker::Akari, text.into());
    }

    fn push(&mut self, speaker: Speaker, text: String) {
        self.turns.push(ConversationTurn { speaker, text });
    }

    pub(crate) fn clear(&mut self) {
        self.turns.clear();
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub(crate) fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    /// `マスター: …` / `あかり: …` lines, oldest first.
    pub(crate) fn render_transcript(&self) -> String {
        self.turns
            .iter()
            .map(|turn| format!("{}: {}", turn.speaker.label(), turn.text))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// History as model contents. Gemini rejects consecutive turns with the
    /// same role, so adjacent turns by one speaker are merged.
    pub(crate) fn as_contents(&self) -> Vec<Content> {
        let mut contents: Vec<Content> = Vec::new();
        for turn in &self.turns {
            let role = turn.speaker.gemini_role();
            if let Some(last) = contents.last_mut() {
                if last.role.as_deref() == Some(role) {
                    last.parts.push(Part::text(turn.text.clone()));
                    continue;
                }
            }
            contents.push(Content {
                role: Some(role.to_string()),
                parts: vec![Part::text(turn.text.clone())],
            });
        }
        contents
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transcript_uses_persona_labels() {
        let mut memory = ConversationMemory::new();
        memory.add_master("おはよう");
        memory.add_akari("おはよう、マスター！");
        assert_eq!(
            memory.render_transcript(),
            "マスター: おはよう\nあかり: おはよう、マスター！"
        );
    }

    #[test]
    fn consecutive_akari_turns_merge_into_one_content() {
        let mut memory = ConversationMemory::new();
        memory.add_master("天気は？");
        memory.add_akari("[toolの結果]: 晴れ");
        memory.add_akari("晴れだよ！");
        let contents = memory.as_contents();
        assert_eq!(contents.len(), 2);
        assert_eq!(contents[1].role.as_deref(), Some("model"));
        assert_eq!(contents[1].parts.len(), 2);
    }

    #[test]
    fn clear_empties_history() {
        let mut memory = ConversationMemory::new();
        memory.add_master("覚えてる？");
        memory.clear();
        assert!(memory.is_empty());
        assert_eq!(memory.render_transcript(), "");
    }
}
