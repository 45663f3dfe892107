use chrono::{NaiveDate, NaiveDateTime};
use serde_json::{json, Value};

use crate::{items, path_segment, AkariError, AkariResult, GoogleAccount, GoogleApi, ToolContext, TASKS_API};

const NO_TASK_LISTS: &str = "❌ タスクリストが存在しません。";

pub(crate) fn format_task_line(task: &Value) -> String {
    let title = task.get("title").and_then(|v| v.as_str()).unwrap_or("(無題)");
    let due = task
        .get("due")
        .and_then(|v| v.as_str())
        .map(|d| format!("（期限: {d}）"))
        .unwrap_or_default();
    let done = match task.get("status").and_then(|v| v.as_str()) {
        Some("completed") => "✅ 完了",
        _ => "🕒 未完了",
    };
    let id = task.get("id").and_then(|v| v.as_str()).unwrap_or("None");
    format!("  - {title}{due} {done}（ID: {id}）")
}

pub(crate) struct TaskListing {
    pub(crate) title: String,
    pub(crate) tasks: Vec<Value>,
}

pub(crate) fn render_task_lists(lists: &[TaskListing]) -> String {
    if lists.is_empty() {
        return "📭 タスクリストが見つかりません。".to_string();
    }
    let mut lines = Vec::new();
    for list in lists {
        lines.push(format!("\n🗂 タスクリスト: {}", list.title));
        if list.tasks.is_empty() {
            lines.push("  - タスクなし".to_string());
        }
        for task in &list.tasks {
            lines.push(format_task_line(task));
        }
    }
    lines.join("\n")
}

fn task_lists(api: &GoogleApi) -> AkariResult<Vec<Value>> {
    Ok(items(&api.get(&format!("{TASKS_API}/users/@me/lists"), &[])?))
}

fn first_list_id(api: &GoogleApi) -> AkariResult<Option<String>> {
    Ok(task_lists(api)?
        .first()
        .and_then(|l| l.get("id"))
        .and_then(|v| v.as_str())
        .map(ToString::to_string))
}

fn fetch_task_listings(ctx: &ToolContext) -> AkariResult<Vec<TaskListing>> {
    let api = GoogleApi::connect(ctx, GoogleAccount::Tasks)?;
    let mut listings = Vec::new();
    for list in task_lists(&api)? {
        let Some(id) = list.get("id").and_then(|v| v.as_str()) else {
            continue;
        };
        let tasks = api.get(
            &format!("{TASKS_API}/lists/{}/tasks", path_segment(id)),
            &[("showCompleted", "true")],
        )?;
        listings.push(TaskListing {
            title: list
                .get("title")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string(),
            tasks: items(&tasks),
        });
    }
    Ok(listings)
}

pub(crate) fn tasks_reader(ctx: &ToolContext, _input: &str) -> String {
    match fetch_task_listings(ctx) {
        Ok(listings) => render_task_lists(&listings),
        Err(err) => format!("❌ タスク一覧取得中にエラー: {err}"),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct NewTask {
    pub(crate) title: String,
    pub(crate) due: String,
}

/// `date time title` or `date title`. Tasks store `due` as a naive
/// timestamp suffixed with `Z`.
pub(crate) fn parse_task_input(input: &str) -> Result<NewTask, String> {
    let parts: Vec<&str> = input.trim().splitn(3, ' ').collect();
    match parts.as_slice() {
        [date, time, title] => {
            let joined = format!("{date} {time}");
            let dt = ["%Y-%m-%d %H:%M", "%Y-%m-%d %H:%M:%S", "%Y/%m/%d %H:%M"]
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(&joined, fmt).ok())
                .ok_or_else(|| {
                    "❌ 日付や時刻の解釈に失敗しました。例: '2025-05-15 18:00 レポート提出' のように明示してください。".to_string()
                })?;
            Ok(NewTask {
                title: title.to_string(),
                due: format!("{}Z", dt.format("%Y-%m-%dT%H:%M:%S")),
            })
        }
        [date, title] => {
            let d = ["%Y-%m-%d", "%Y/%m/%d"]
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(date, fmt).ok())
                .ok_or_else(|| {
                    "❌ 日付の解釈に失敗しました。例: '2025-05-15 買い物リスト作成' のように明示してください。".to_string()
                })?;
            Ok(NewTask {
                title: title.to_string(),
                due: format!("{}T00:00:00Z", d.format("%Y-%m-%d")),
            })
        }
        _ => Err("❌ 入力が短すぎます。日付とタスク内容を含めてください。".to_string()),
    }
}

pub(crate) fn format_created_task(created: &Value) -> String {
    let title = created.get("title").and_then(|v| v.as_str()).unwrap_or("");
    let id = created.get("id").and_then(|v| v.as_str()).unwrap_or("");
    format!("✅ タスクを追加しました: {title}（ID: {id}）")
}

enum TaskWriteError {
    NoLists,
    Input(String),
    Api(AkariError),
}

impl From<AkariError> for TaskWriteError {
    fn from(err: AkariError) -> Self {
        TaskWriteError::Api(err)
    }
}

fn add_task(ctx: &ToolContext, input: &str) -> Result<Value, TaskWriteError> {
    let api = GoogleApi::connect(ctx, GoogleAccount::Tasks)?;
    let list_id = first_list_id(&api)?.ok_or(TaskWriteError::NoLists)?;
    let task = parse_task_input(input).map_err(TaskWriteError::Input)?;
    Ok(api.post(
        &format!("{TASKS_API}/lists/{}/tasks", path_segment(&list_id)),
        &json!({"title": task.title, "due": task.due}),
    )?)
}

pub(crate) fn tasks_writer(ctx: &ToolContext, input: &str) -> String {
    match add_task(ctx, input) {
        Ok(created) => format_created_task(&created),
        Err(TaskWriteError::NoLists) => NO_TASK_LISTS.to_string(),
        Err(TaskWriteError::Input(message)) => message,
        Err(TaskWriteError::Api(err)) => format!("❌ タスク追加中にエラー: {err}"),
    }
}

pub(crate) fn tasks_remover(ctx: &ToolContext, task_id: &str) -> String {
    let task_id = task_id.trim();
    let result = GoogleApi::connect(ctx, GoogleAccount::Tasks).and_then(|api| {
        let Some(list_id) = first_list_id(&api)? else {
            return Ok(false);
        };
        api.delete(&format!(
            "{TASKS_API}/lists/{}/tasks/{}",
            path_segment(&list_id),
            path_segment(task_id)
        ))?;
        Ok(true)
    });
    match result {
        Ok(true) => format!("🗑️ タスク（ID: {task_id}）を削除しました。"),
        Ok(false) => NO_TASK_LISTS.to_string(),
        Err(err) => format!("❌ タスク削除中にエラー: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_lines_show_due_and_state() {
        let open = json!({"title": "レポート", "due": "2025-05-15T00:00:00.000Z", "status": "needsAction", "id": "t1"});
        assert_eq!(
            format_task_line(&open),
            "  - レポート（期限: 2025-05-15T00:00:00.000Z） 🕒 未完了（ID: t1）"
        );
        let done = json!({"title": "買い物", "status": "completed", "id": "t2"});
        assert_eq!(format_task_line(&done), "  - 買い物 ✅ 完了（ID: t2）");
    }

    #[test]
    fn empty_lists_are_marked() {
        let out = render_task_lists(&[TaskListing {
            title: "マイタスク".to_string(),
            tasks: Vec::new(),
        }]);
        assert_eq!(out, "\n🗂 タスクリスト: マイタスク\n  - タスクなし");
        assert_eq!(render_task_lists(&[]), "📭 タスクリストが見つかりません。");
    }

    #[test]
    fn timed_task_due_is_naive_with_z() {
        let task = parse_task_input("2025-05-15 18:00 レポート提出").unwrap();
        assert_eq!(task.due, "2025-05-15T18:00:00Z");
        assert_eq!(task.title, "レポート提出");
    }

    #[test]
    fn date_only_task_is_all_day() {
        let task = parse_task_input("2025-05-15 買い物リスト作成").unwrap();
        assert_eq!(task.due, "2025-05-15T00:00:00Z");
    }

    #[test]
    fn ambiguous_inputs_are_rejected_with_examples() {
        assert_eq!(
            parse_task_input("買い物").unwrap_err(),
            "❌ 入力が短すぎます。日付とタスク内容を含めてください。"
        );
        assert!(parse_task_input("木曜の17時 会議 準備").unwrap_err().contains("18:00 レポート提出"));
        assert!(parse_task_input("明日 買い物").unwrap_err().contains("買い物リスト作成"));
    }
}
