use std::time::Duration;

use crate::{run_command_capture, ToolContext};

const BROWSER_MODEL: &str = "gemini-1.5-flash-8b";
const BROWSER_TIMEOUT_SECS: u64 = 300;
pub(crate) const NO_FINAL_OUTPUT: &str = "❌ 最終出力が見つかりませんでした。";

/// Delegates a task to the external browser-automation helper. The helper
/// reads `{"task", "model"}` as JSON on stdin and prints its final answer.
pub(crate) fn browser_agent_search(ctx: &ToolContext, task: &str) -> String {
    let Some(command) = ctx.config.browser_agent_command.as_ref() else {
        return "❌ ブラウザ操作コマンドが設定されていません（AKARI_BROWSER_AGENT_COMMAND）".to_string();
    };
    let payload = serde_json::json!({ "task": task, "model": BROWSER_MODEL });
    let bytes = payload.to_string().into_bytes();
    match run_command_capture(
        command,
        &[],
        Some(&bytes),
        Some(Duration::from_secs(BROWSER_TIMEOUT_SECS)),
    ) {
        Ok(out) => final_output(&out.stdout, out.success, &out.stderr),
        Err(err) => format!("❌ ブラウザ操作中にエラー: {err}"),
    }
}

pub(crate) fn final_output(stdout: &str, success: bool, stderr: &str) -> String {
    let text = stdout.trim();
    if !success {
        let detail = if stderr.trim().is_empty() { text } else { stderr.trim() };
        tracing::warn!(detail, "browser helper failed");
        return NO_FINAL_OUTPUT.to_string();
    }
    if text.is_empty() {
        NO_FINAL_OUTPUT.to_string()
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_or_failed_runs_have_no_final_output() {
        assert_eq!(final_output("  \n", true, ""), NO_FINAL_OUTPUT);
        assert_eq!(final_output("partial", false, "boom"), NO_FINAL_OUTPUT);
    }

    #[test]
    fn final_text_is_trimmed() {
        assert_eq!(final_output("検索結果です\n", true, ""), "検索結果です");
    }
}
