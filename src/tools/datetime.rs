use chrono::{DateTime, Datelike, FixedOffset};

use crate::now_jst;

const WEEKDAYS: [&str; 7] = [
    "月曜日", "火曜日", "水曜日", "木曜日", "金曜日", "土曜日", "日曜日",
];

pub(crate) fn format_current_datetime(now: DateTime<FixedOffset>) -> String {
    let weekday = WEEKDAYS[now.weekday().num_days_from_monday() as usize];
    format!(
        "現在の日時は {}（{weekday}）{} です。",
        now.format("%Y年%m月%d日"),
        now.format("%H時%M分%S秒")
    )
}

pub(crate) fn get_today_date(_input: &str) -> String {
    format_current_datetime(now_jst())
}
