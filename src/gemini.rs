use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{AkariError, AkariResult};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Serialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerateContentRequest {
    pub(crate) contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) tools: Option<Vec<GeminiTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) generation_config: Option<GenerationConfig>,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GeminiTool {
    pub(crate) function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Serialize, Debug, Clone)]
pub(crate) struct FunctionDeclaration {
    pub(crate) name: String,
    pub(crate) description: String,
    pub(crate) parameters: Value,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub(crate) struct Content {
    #[serde(default)]
    pub(crate) parts: Vec<Part>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) role: Option<String>,
}

impl Content {
    pub(crate) fn user(text: impl Into<String>) -> Self {
        Self {
            parts: vec![Part::text(text)],
            role: Some("user".to_string()),
        }
    }

    pub(crate) fn system(text: impl Into<String>) -> Self {
        Self {
            parts: vec![Part::text(text)],
            role: None,
        }
    }

    /// Concatenated text parts; empty when the model only called functions.
    pub(crate) fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect::<Vec<_>>()
            .join("")
    }

    pub(crate) fn function_calls(&self) -> Vec<&FunctionCall> {
        self.parts
            .iter()
            .filter_map(|p| p.function_call.as_ref())
            .collect()
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) function_call: Option<FunctionCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) function_response: Option<FunctionResponse>,
}

impl Part {
    pub(crate) fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub(crate) fn function_call(name: impl Into<String>, args: Value) -> Self {
        Self {
            function_call: Some(FunctionCall {
                name: name.into(),
                args,
            }),
            ..Self::default()
        }
    }

    pub(crate) fn function_response(name: impl Into<String>, response: Value) -> Self {
        Self {
            function_response: Some(FunctionResponse {
                name: name.into(),
                response,
            }),
            ..Self::default()
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub(crate) struct FunctionCall {
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) args: Value,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub(crate) struct FunctionResponse {
    pub(crate) name: String,
    pub(crate) response: Value,
}

#[derive(Serialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) max_output_tokens: Option<u32>,
}

#[derive(Deserialize, Debug)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

/// Anything that can answer a generateContent request. The agent and the
/// refiner only depend on this.
pub(crate) trait ChatModel {
    fn generate(&self, request: &GenerateContentRequest) -> AkariResult<Content>;
}

pub(crate) struct GeminiClient {
    agent: ureq::Agent,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub(crate) fn new(api_key: String, model: String, timeout_ms: u64) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_millis(timeout_ms))
            .timeout_read(Duration::from_millis(timeout_ms))
            .timeout_write(Duration::from_millis(timeout_ms))
            .build();
        Self {
            agent,
            api_key,
            model,
        }
    }
}

impl ChatModel for GeminiClient {
    fn generate(&self, request: &GenerateContentRequest) -> AkariResult<Content> {
        let url = format!(
            "{GEMINI_API_BASE}/models/{}:generateContent?key={}",
            self.model,
            urlencoding::encode(&self.api_key)
        );
        tracing::debug!(model = %self.model, contents = request.contents.len(), "gemini request");
        let response = self
            .agent
            .post(&url)
            .set("content-type", "application/json")
            .send_json(serde_json::to_value(request)?);
        let body: GenerateContentResponse = match response {
            Ok(resp) => resp.into_json()?,
            Err(ureq::Error::Status(status, resp)) => {
                let text = resp.into_string().unwrap_or_default();
                return Err(AkariError::Gemini {
                    status,
                    message: extract_error_message(&text),
                });
            }
            Err(err) => return Err(err.into()),
        };
        let candidate = body.candidates.into_iter().next().ok_or_else(|| AkariError::Gemini {
            status: 200,
            message: "no candidates returned".to_string(),
        })?;
        match candidate.content {
            Some(content) => Ok(content),
            None => Err(AkariError::Gemini {
                status: 200,
                message: format!(
                    "empty candidate (finishReason: {})",
                    candidate.finish_reason.unwrap_or_else(|| "unknown".to_string())
                ),
            }),
        }
    }
}

fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(ToString::to_string)
        })
        .unwrap_or_else(|| body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_in_camel_case() {
        let request = GenerateContentRequest {
            contents: vec![Content::user("こんにちは")],
            system_instruction: Some(Content::system("あなたはあかりです")),
            tools: None,
            generation_config: Some(GenerationConfig {
                temperature: Some(0.7),
                max_output_tokens: None,
            }),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("systemInstruction").is_some());
        assert_eq!(json["generationConfig"]["temperature"], 0.7);
        assert!(json.get("tools").is_none());
    }

    #[test]
    fn function_calls_are_read_from_parts() {
        let content: Content = serde_json::from_value(serde_json::json!({
            "role": "model",
            "parts": [{"functionCall": {"name": "GetTodayDate", "args": {"input": ""}}}]
        }))
        .unwrap();
        let calls = content.function_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "GetTodayDate");
        assert_eq!(content.text(), "");
    }

    #[test]
    fn error_message_prefers_api_field() {
        let body = r#"{"error": {"code": 400, "message": "API key not valid"}}"#;
        assert_eq!(extract_error_message(body), "API key not valid");
        assert_eq!(extract_error_message("plain"), "plain");
    }
}
