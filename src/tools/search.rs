use serde_json::{json, Value};

use crate::{AkariError, AkariResult, ToolContext};

const PERPLEXITY_URL: &str = "https://api.perplexity.ai/chat/completions";
const SEARCH_SYSTEM_PROMPT: &str = "あなたは検索結果を活用して、ユーザーの質問に簡潔に答えるアシスタントです。\n返答はできるだけ短く、1〜2文で、最大でも200文字以内で要点のみを伝えてください。\n";

pub(crate) fn search_payload(query: &str) -> Value {
    json!({
        "model": "sonar",
        "messages": [
            {"role": "system", "content": SEARCH_SYSTEM_PROMPT},
            {"role": "user", "content": query}
        ],
        "temperature": 0,
        "top_p": 0.9,
        "return_related_questions": false,
        "return_images": false,
        "top_k": 3,
        "stream": false
    })
}

/// Answer text followed by one `🔗 url` line per citation.
pub(crate) fn format_search_answer(data: &Value) -> AkariResult<String> {
    let content = data
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .ok_or_else(|| {
            let detail = data
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .unwrap_or("応答に choices がありません");
            AkariError::Transport(detail.to_string())
        })?;
    let citations: Vec<String> = data
        .get("citations")
        .and_then(|c| c.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|u| u.as_str())
                .map(|u| format!("🔗 {u}"))
                .collect()
        })
        .unwrap_or_default();
    if citations.is_empty() {
        Ok(content.to_string())
    } else {
        Ok(format!("{content}\n\n{}", citations.join("\n")))
    }
}

fn post_search(ctx: &ToolContext, api_key: &str, query: &str) -> AkariResult<String> {
    let response = ctx
        .http
        .post(PERPLEXITY_URL)
        .set("Authorization", &format!("Bearer {api_key}"))
        .set("Content-Type", "application/json")
        .send_json(search_payload(query));
    let data: Value = match response {
        Ok(resp) => resp.into_json()?,
        Err(ureq::Error::Status(status, resp)) => {
            let body = resp.into_string().unwrap_or_default();
            serde_json::from_str(&body).map_err(|_| AkariError::HttpStatus { status, body })?
        }
        Err(err) => return Err(err.into()),
    };
    format_search_answer(&data)
}

pub(crate) fn web_search(ctx: &ToolContext, query: &str) -> String {
    let Some(api_key) = ctx.config.perplexity_api_key.as_deref() else {
        return "❌ Perplexity APIキーが設定されていません".to_string();
    };
    match post_search(ctx, api_key, query) {
        Ok(answer) => answer,
        Err(err) => format!("❌ Perplexity APIエラー: {err}"),
    }
}
