use std::path::Path;

use crate::{
    AkariConfig, AkariError, AkariResult, ChatModel, Content, ConversationMemory, GeminiClient,
    GenerateContentRequest, GenerationConfig, ToolAgent, ToolContext, ToolObserver, ToolRunner,
};

const FALLBACK_PERSONA: &str = "あなたは「あかり」です。マスターに寄り添う、明るく優しい女の子として、親しみやすい日本語で短く話してください。";

pub(crate) fn load_persona(path: &Path) -> String {
    match std::fs::read_to_string(path) {
        Ok(text) if !text.trim().is_empty() => text,
        Ok(_) | Err(_) => {
            tracing::warn!(path = %path.display(), "persona prompt missing, using built-in fallback");
            FALLBACK_PERSONA.to_string()
        }
    }
}

/// Style pass: persona system prompt, conversation history, then the input.
pub(crate) struct Refiner<'a> {
    pub(crate) model: &'a dyn ChatModel,
    pub(crate) persona: &'a str,
    pub(crate) temperature: f64,
}

impl Refiner<'_> {
    pub(crate) fn refine(&self, memory: &ConversationMemory, input: &str) -> AkariResult<String> {
        let mut contents = memory.as_contents();
        contents.push(Content::user(input));
        let request = GenerateContentRequest {
            contents,
            system_instruction: Some(Content::system(self.persona)),
            tools: None,
            generation_config: Some(GenerationConfig {
                temperature: Some(self.temperature),
                max_output_tokens: None,
            }),
        };
        Ok(self.model.generate(&request)?.text().trim().to_string())
    }
}

pub(crate) fn tool_result_prompt(message: &str, tool_output: &str) -> String {
    format!("マスター: {message}ツールの結果: {tool_output}\nあかりらしい文章でこの結果をマスターに伝えてね")
}

pub(crate) fn plain_prompt(message: &str) -> String {
    format!("マスター: {message}\n")
}

/// Agent, refiner, and memory wired together for one conversation.
pub(crate) struct Companion {
    model: Box<dyn ChatModel>,
    tools: Box<dyn ToolRunner>,
    memory: ConversationMemory,
    persona: String,
    max_iterations: usize,
    temperature: f64,
}

impl Companion {
    pub(crate) fn new(
        model: Box<dyn ChatModel>,
        tools: Box<dyn ToolRunner>,
        persona: String,
        max_iterations: usize,
        temperature: f64,
    ) -> Self {
        Self {
            model,
            tools,
            memory: ConversationMemory::new(),
            persona,
            max_iterations,
            temperature,
        }
    }

    pub(crate) fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    pub(crate) fn forget(&mut self) {
        self.memory.clear();
    }

    /// History transcript followed by the new master line.
    pub(crate) fn agent_input(&self, message: &str) -> String {
        let history = self.memory.render_transcript();
        if history.is_empty() {
            format!("マスター: {message}")
        } else {
            format!("{history}\nマスター: {message}")
        }
    }

    pub(crate) fn respond(
        &mut self,
        message: &str,
        observer: &mut dyn ToolObserver,
    ) -> AkariResult<String> {
        let agent = ToolAgent {
            model: self.model.as_ref(),
            tools: self.tools.as_ref(),
            max_iterations: self.max_iterations,
            temperature: self.temperature,
        };
        let result = agent.run(&self.agent_input(message), observer)?;

        let refiner = Refiner {
            model: self.model.as_ref(),
            persona: &self.persona,
            temperature: self.temperature,
        };
        let refiner_input = if result.used_tool() {
            tool_result_prompt(message, &result.output)
        } else {
            plain_prompt(message)
        };
        let reply = refiner.refine(&self.memory, &refiner_input)?;

        self.memory.add_master(message);
        if result.used_tool() {
            self.memory.add_akari(format!("[toolの結果]: {}", result.output));
        }
        self.memory.add_akari(reply.clone());
        Ok(reply)
    }
}

/// Gemini-backed companion with the full tool set.
pub(crate) fn build_companion(config: &AkariConfig) -> AkariResult<Companion> {
    let api_key = config
        .gemini_api_key
        .clone()
        .ok_or_else(|| AkariError::Config("Missing GEMINI_API_KEY".to_string()))?;
    let model = GeminiClient::new(api_key, config.gemini_model.clone(), config.http_timeout_ms);
    tracing::info!(model = %config.gemini_model, "companion ready");
    Ok(Companion::new(
        Box::new(model),
        Box::new(ToolContext::new(config.clone())),
        load_persona(&config.prompt_path),
        config.max_iterations,
        config.temperature,
    ))
}
