use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde_json::{json, Value};

use crate::{
    items, jst, path_segment, AkariError, AkariResult, CalendarLabel, GoogleAccount, GoogleApi,
    ToolContext, CALENDAR_API,
};

const READER_HEADER: &str = "以下は、マスターに関連するすべてのGoogleカレンダーから取得した予定です。\nカレンダーごとに用途と編集権限を明示しています。\nあかりが予定を追加・削除できるのは『あかり専用カレンダー』のみです。\n";
const UNTITLED: &str = "(無題)";

pub(crate) fn describe_calendar(summary: &str, access: &str, labels: &[CalendarLabel]) -> String {
    let summary_lower = summary.to_lowercase();
    labels
        .iter()
        .find(|label| {
            label
                .keywords
                .iter()
                .any(|k| summary_lower.contains(&k.to_lowercase()))
        })
        .map(|label| label.description.clone())
        .unwrap_or_else(|| format!("（他のカレンダー・アクセス権限: {access}）"))
}

/// `2025年05月13日 14時00分` in JST, or `2025年05月13日（終日）` for all-day events.
pub(crate) fn format_event_start(start: &Value) -> String {
    if let Some(date) = start.get("date").and_then(|d| d.as_str()) {
        return match NaiveDate::parse_from_str(date, "%Y-%m-%d") {
            Ok(d) => format!("{}（終日）", d.format("%Y年%m月%d日")),
            Err(_) => format!("{date}（終日）"),
        };
    }
    let raw = start.get("dateTime").and_then(|d| d.as_str()).unwrap_or("");
    match DateTime::parse_from_rfc3339(raw) {
        Ok(dt) => dt.with_timezone(&jst()).format("%Y年%m月%d日 %H時%M分").to_string(),
        Err(_) => raw.to_string(),
    }
}

pub(crate) fn format_event_line(event: &Value) -> String {
    let start = format_event_start(event.get("start").unwrap_or(&Value::Null));
    let summary = event.get("summary").and_then(|s| s.as_str()).unwrap_or(UNTITLED);
    let id = event.get("id").and_then(|s| s.as_str()).unwrap_or("不明");
    format!("  - {start}: {summary}（ID: {id}）")
}

pub(crate) struct CalendarListing {
    pub(crate) summary: String,
    pub(crate) access_role: String,
    pub(crate) events: Vec<Value>,
}

pub(crate) fn render_calendar_summary(calendars: &[CalendarListing], labels: &[CalendarLabel]) -> String {
    let mut lines = vec![READER_HEADER.to_string()];
    for cal in calendars {
        let label = describe_calendar(&cal.summary, &cal.access_role, labels);
        lines.push(format!("\n📅 カレンダー: {} {label}", cal.summary));
        if cal.events.is_empty() {
            lines.push("  - 予定なし".to_string());
        }
        for event in &cal.events {
            lines.push(format_event_line(event));
        }
    }
    lines.join("\n")
}

fn utc_z(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn fetch_calendar_listings(ctx: &ToolContext, hours: i64) -> AkariResult<Vec<CalendarListing>> {
    let api = GoogleApi::connect(ctx, GoogleAccount::CalendarReader)?;
    let now = Utc::now();
    let time_min = utc_z(now);
    let time_max = utc_z(now + Duration::hours(hours));

    let list = api.get(&format!("{CALENDAR_API}/users/me/calendarList"), &[])?;
    let mut listings = Vec::new();
    for item in items(&list) {
        let Some(id) = item.get("id").and_then(|v| v.as_str()) else {
            continue;
        };
        let events = api.get(
            &format!("{CALENDAR_API}/calendars/{}/events", path_segment(id)),
            &[
                ("timeMin", time_min.as_str()),
                ("timeMax", time_max.as_str()),
                ("singleEvents", "true"),
                ("orderBy", "startTime"),
            ],
        )?;
        listings.push(CalendarListing {
            summary: item
                .get("summary")
                .and_then(|v| v.as_str())
                .unwrap_or("(no name)")
                .to_string(),
            access_role: item
                .get("accessRole")
                .and_then(|v| v.as_str())
                .unwrap_or("None")
                .to_string(),
            events: items(&events),
        });
    }
    Ok(listings)
}

pub(crate) fn calendar_reader(ctx: &ToolContext, hours: &str) -> String {
    let result = hours
        .trim()
        .parse::<i64>()
        .map_err(|_| AkariError::Config(format!("時間数は整数で指定してください（入力: {hours}）")))
        .and_then(|hrs| fetch_calendar_listings(ctx, hrs));
    match result {
        Ok(listings) => render_calendar_summary(&listings, &ctx.config.calendar_labels),
        Err(err) => format!("❌ カレンダー読み取り中にエラー: {err}"),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct NewEvent {
    pub(crate) start: DateTime<FixedOffset>,
    pub(crate) end: DateTime<FixedOffset>,
    pub(crate) summary: String,
}

impl NewEvent {
    pub(crate) fn body(&self) -> Value {
        json!({
            "summary": self.summary,
            "start": {"dateTime": self.start.to_rfc3339(), "timeZone": "Asia/Tokyo"},
            "end": {"dateTime": self.end.to_rfc3339(), "timeZone": "Asia/Tokyo"},
        })
    }
}

/// Naive `date time` input, interpreted in JST.
pub(crate) fn parse_local_datetime(date: &str, time: &str) -> Option<DateTime<FixedOffset>> {
    let joined = format!("{date} {time}");
    let naive = ["%Y-%m-%d %H:%M", "%Y-%m-%d %H:%M:%S", "%Y/%m/%d %H:%M", "%Y/%m/%d %H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(&joined, fmt).ok())?;
    jst().from_local_datetime(&naive).single()
}

/// `YYYY-MM-DD HH:MM title`; one-hour event, title defaults to `(無題)`.
pub(crate) fn parse_event_input(input: &str) -> Result<NewEvent, String> {
    let parts: Vec<&str> = input.trim().splitn(3, ' ').collect();
    if parts.len() < 2 {
        return Err("❌ 入力解析エラー: 日時とタイトルの両方を指定してください。".to_string());
    }
    let start = parse_local_datetime(parts[0], parts[1]).ok_or_else(|| {
        format!(
            "❌ 入力解析エラー: 日時を解釈できませんでした: {} {}",
            parts[0], parts[1]
        )
    })?;
    let summary = parts
        .get(2)
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .unwrap_or(UNTITLED);
    Ok(NewEvent {
        start,
        end: start + Duration::hours(1),
        summary: summary.to_string(),
    })
}

pub(crate) fn format_created_event(created: &Value) -> String {
    let summary = created.get("summary").and_then(|s| s.as_str()).unwrap_or(UNTITLED);
    let start = created.get("start").unwrap_or(&Value::Null);
    let when = start
        .get("dateTime")
        .or_else(|| start.get("date"))
        .and_then(|v| v.as_str())
        .unwrap_or("");
    format!("✅ 予定を追加しました: {summary}（{when}）")
}

pub(crate) fn calendar_writer(ctx: &ToolContext, input: &str) -> String {
    let event = match parse_event_input(input) {
        Ok(event) => event,
        Err(err) => return format!("❌ 予定の追加中にエラー: {err}"),
    };
    let created = GoogleApi::connect(ctx, GoogleAccount::CalendarWriter)
        .and_then(|api| api.post(&format!("{CALENDAR_API}/calendars/primary/events"), &event.body()));
    match created {
        Ok(created) => format_created_event(&created),
        Err(err) => format!("❌ 予定の追加中にエラー: {err}"),
    }
}

pub(crate) fn calendar_remover(ctx: &ToolContext, event_id: &str) -> String {
    let event_id = event_id.trim();
    let deleted = GoogleApi::connect(ctx, GoogleAccount::CalendarWriter).and_then(|api| {
        api.delete(&format!(
            "{CALENDAR_API}/calendars/primary/events/{}",
            path_segment(event_id)
        ))
    });
    match deleted {
        Ok(()) => format!("🗑️ 予定（ID: {event_id}）を削除しました。"),
        Err(err) => format!("❌ 削除エラー: {err}"),
    }
}
