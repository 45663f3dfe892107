use serde_json::Value;

use crate::{
    AgentRunOutput, AkariResult, ChatModel, Content, FunctionDeclaration, GeminiTool,
    GenerateContentRequest, GenerationConfig, Part, ToolInvocation,
};

pub(crate) const ITERATION_LIMIT_OUTPUT: &str = "Agent stopped due to iteration limit or time limit.";

const AGENT_SYSTEM_PROMPT: &str = "\
あなたはマスターの質問に答えるためにツールを使い分けるアシスタントです。\n\
日時・天気・為替・検索・予定・タスク・マスターの情報が必要なときは、対応するツールを呼び出してください。\n\
ツールの結果が得られたら、その内容をもとに事実だけを簡潔に答えてください。\n\
ツールが不要な雑談には、そのまま短く答えてください。";

/// Executes named tools for the agent loop.
pub(crate) trait ToolRunner {
    fn declarations(&self) -> Vec<FunctionDeclaration>;
    fn run(&self, name: &str, input: &str) -> String;
}

/// Notified before each tool call.
pub(crate) trait ToolObserver {
    fn on_tool_start(&mut self, tool: &str, input: &str);
}

pub(crate) struct NoopObserver;

impl ToolObserver for NoopObserver {
    fn on_tool_start(&mut self, _tool: &str, _input: &str) {}
}

/// LLM-driven tool selection loop. Stops at the first text-only reply or
/// after `max_iterations` model calls.
pub(crate) struct ToolAgent<'a> {
    pub(crate) model: &'a dyn ChatModel,
    pub(crate) tools: &'a dyn ToolRunner,
    pub(crate) max_iterations: usize,
    pub(crate) temperature: f64,
}

impl ToolAgent<'_> {
    pub(crate) fn run(
        &self,
        input: &str,
        observer: &mut dyn ToolObserver,
    ) -> AkariResult<AgentRunOutput> {
        let declarations = self.tools.declarations();
        let tools = if declarations.is_empty() {
            None
        } else {
            Some(vec![GeminiTool {
                function_declarations: declarations,
            }])
        };
        let mut request = GenerateContentRequest {
            contents: vec![Content::user(input)],
            system_instruction: Some(Content::system(AGENT_SYSTEM_PROMPT)),
            tools,
            generation_config: Some(GenerationConfig {
                temperature: Some(self.temperature),
                max_output_tokens: None,
            }),
        };
        let mut steps = Vec::new();

        for iteration in 0..self.max_iterations {
            let reply = self.model.generate(&request)?;
            let calls: Vec<_> = reply.function_calls().into_iter().cloned().collect();
            if calls.is_empty() {
                tracing::debug!(iteration, tools_used = steps.len(), "agent finished");
                return Ok(AgentRunOutput {
                    output: reply.text().trim().to_string(),
                    steps,
                });
            }

            request.contents.push(Content {
                parts: reply.parts.clone(),
                role: Some("model".to_string()),
            });
            let mut responses = Vec::with_capacity(calls.len());
            for call in calls {
                let tool_input = tool_input_from_args(&call.args);
                observer.on_tool_start(&call.name, &tool_input);
                tracing::info!(tool = %call.name, input = %tool_input, "tool call");
                let output = self.tools.run(&call.name, &tool_input);
                responses.push(Part::function_response(
                    call.name.clone(),
                    serde_json::json!({ "output": output }),
                ));
                steps.push(ToolInvocation {
                    tool: call.name,
                    input: tool_input,
                    output,
                });
            }
            request.contents.push(Content {
                parts: responses,
                role: Some("user".to_string()),
            });
        }

        tracing::warn!(max_iterations = self.max_iterations, "agent hit iteration limit");
        Ok(AgentRunOutput {
            output: ITERATION_LIMIT_OUTPUT.to_string(),
            steps,
        })
    }
}

/// Every tool takes one string. Models occasionally send other shapes.
fn tool_input_from_args(args: &Value) -> String {
    match args.get("input") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => match args {
            Value::Object(map) if map.is_empty() => String::new(),
            Value::Null => String::new(),
            other => other.to_string(),
        },
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::cell::RefCell;

    use super::*;

    /// Replays canned replies and records every request it receives.
    pub(crate) struct ScriptedModel {
        pub(crate) replies: RefCell<Vec<Content>>,
        pub(crate) requests: RefCell<Vec<GenerateContentRequest>>,
    }

    impl ScriptedModel {
        pub(crate) fn new(replies: Vec<Content>) -> Self {
            Self {
                replies: RefCell::new(replies),
                requests: RefCell::new(Vec::new()),
            }
        }
    }

    impl ChatModel for ScriptedModel {
        fn generate(&self, request: &GenerateContentRequest) -> AkariResult<Content> {
            self.requests.borrow_mut().push(request.clone());
            let mut replies = self.replies.borrow_mut();
            if replies.is_empty() {
                return Ok(model_text("（台本切れ）"));
            }
            Ok(replies.remove(0))
        }
    }

    pub(crate) fn model_text(text: &str) -> Content {
        Content {
            parts: vec![Part::text(text)],
            role: Some("model".to_string()),
        }
    }

    pub(crate) fn model_call(name: &str, input: &str) -> Content {
        Content {
            parts: vec![Part::function_call(name, serde_json::json!({ "input": input }))],
            role: Some("model".to_string()),
        }
    }

    pub(crate) struct EchoTools;

    impl ToolRunner for EchoTools {
        fn declarations(&self) -> Vec<FunctionDeclaration> {
            vec![FunctionDeclaration {
                name: "WebSearch".to_string(),
                description: "search".to_string(),
                parameters: serde_json::json!({"type": "object"}),
            }]
        }

        fn run(&self, name: &str, input: &str) -> String {
            format!("{name}({input})")
        }
    }

    #[derive(Default)]
    struct RecordingObserver {
        seen: Vec<(String, String)>,
    }

    impl ToolObserver for RecordingObserver {
        fn on_tool_start(&mut self, tool: &str, input: &str) {
            self.seen.push((tool.to_string(), input.to_string()));
        }
    }

    #[test]
    fn text_reply_ends_loop_without_steps() {
        let model = ScriptedModel::new(vec![model_text("こんにちは")]);
        let agent = ToolAgent {
            model: &model,
            tools: &EchoTools,
            max_iterations: 10,
            temperature: 0.7,
        };
        let out = agent.run("マスター: やあ", &mut NoopObserver).unwrap();
        assert_eq!(out.output, "こんにちは");
        assert!(!out.used_tool());
    }

    #[test]
    fn tool_calls_are_executed_observed_and_fed_back() {
        let model = ScriptedModel::new(vec![
            model_call("WebSearch", "今日のニュース"),
            model_text("ニュースはこちら"),
        ]);
        let agent = ToolAgent {
            model: &model,
            tools: &EchoTools,
            max_iterations: 10,
            temperature: 0.7,
        };
        let mut observer = RecordingObserver::default();
        let out = agent.run("ニュースを教えて", &mut observer).unwrap();
        assert_eq!(out.output, "ニュースはこちら");
        assert_eq!(out.steps.len(), 1);
        assert_eq!(out.steps[0].output, "WebSearch(今日のニュース)");
        assert_eq!(observer.seen, vec![("WebSearch".to_string(), "今日のニュース".to_string())]);

        let requests = model.requests.borrow();
        let last = requests.last().unwrap();
        let response = last.contents.last().unwrap().parts[0]
            .function_response
            .as_ref()
            .unwrap();
        assert_eq!(response.response["output"], "WebSearch(今日のニュース)");
    }

    #[test]
    fn iteration_cap_returns_stop_message() {
        let replies = (0..5).map(|_| model_call("WebSearch", "again")).collect();
        let model = ScriptedModel::new(replies);
        let agent = ToolAgent {
            model: &model,
            tools: &EchoTools,
            max_iterations: 3,
            temperature: 0.7,
        };
        let out = agent.run("loop", &mut NoopObserver).unwrap();
        assert_eq!(out.output, ITERATION_LIMIT_OUTPUT);
        assert_eq!(out.steps.len(), 3);
        assert_eq!(model.requests.borrow().len(), 3);
    }

    #[test]
    fn non_string_args_are_stringified() {
        assert_eq!(tool_input_from_args(&serde_json::json!({"input": 24})), "24");
        assert_eq!(tool_input_from_args(&serde_json::json!({})), "");
        assert_eq!(tool_input_from_args(&serde_json::json!({"input": "東京"})), "東京");
    }
}
