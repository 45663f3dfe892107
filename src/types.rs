use serde::{Deserialize, Serialize};

/// External command, either a shell string or an argv array.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub(crate) enum CommandSpec {
    String(String),
    Array(Vec<String>),
}

/// Keyword rule used to annotate calendars in the reader output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub(crate) struct CalendarLabel {
    pub(crate) keywords: Vec<String>,
    pub(crate) description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub(crate) struct WhisperFileConfig {
    #[serde(default)]
    pub(crate) url: Option<String>,
    #[serde(default)]
    pub(crate) model: Option<String>,
    #[serde(default)]
    pub(crate) language: Option<String>,
}

/// One executed tool call, as recorded by the agent loop.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ToolInvocation {
    pub(crate) tool: String,
    pub(crate) input: String,
    pub(crate) output: String,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct AgentRunOutput {
    pub(crate) output: String,
    pub(crate) steps: Vec<ToolInvocation>,
}

impl AgentRunOutput {
    pub(crate) fn used_tool(&self) -> bool {
        !self.steps.is_empty()
    }
}
