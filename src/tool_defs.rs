use crate::FunctionDeclaration;

/// Name and LLM-facing description of every adapter, in registration order.
pub(crate) const TOOL_SPECS: &[(&str, &str)] = &[
    (
        "WebSearch",
        "Perplexityを使って、ニュースや政治などの**事実ベースの最新情報**を検索するためのツールです。\n\
**天気、日付、時刻、感情や主観的な話題、個人的な会話には使わないでください。**\n\
**検索は1つの話題につき1回までにしてください。特に事実確認の再検索は禁止です。**\n\
以前の会話履歴によって事実関係が明らかになっている内容を再度検索することは避けてください。\
ほかのAPI が失敗した場合に補完的に検索を用いることは許可されます",
    ),
    (
        "BrowserAgentSearch",
        "実ブラウザ操作を使って、任意のWebページを検索・調査するツールです。\n\n\
- UI操作を含むような場面（ページ遷移、検索フォームの入力など）ではこのツールを優先してください。\n\
- WebSearch Tool（Perplexity API）は英語圏ニュース・Wikipedia・簡易な要約向けなので、内容や精度が不十分な場合はこちらを使ってください。\n\
- 実行には数十秒かかることがあります。",
    ),
    (
        "GetTodayDate",
        "現在の曜日と日付と時刻をJSTで返します。\
指示に「今日」「明日」「今から」「一週間後に」などの、時刻にかかわる言葉が含まれる場合はかならず確認してください。",
    ),
    (
        "GetLatLon",
        "都市名を緯度経度に変換します。例: '東京' → '35.75,139.73'",
    ),
    (
        "WeatherForecast",
        "緯度経度（lat,lon）を受け取り5日分3時間ごとの天気予報を返します。\
天気予報は5日分のみなのでそれより先の天気や過去の天気は検索を使ってください",
    ),
    (
        "GetExchangeRate",
        "為替レートを取得します。形式: 'USD→JPY'返答には変換レートと日付が含まれます。",
    ),
    (
        "GetMasterInfo",
        "マスターの本名、所属、居住地、趣味などが書かれた `master_profile.txt` の内容を取得します。\
マスターの情報を正確に答えるために使ってください。",
    ),
    (
        "CalendarReader",
        "マスターの関連カレンダーから予定を読み取ります。引数に「今から何時間先まで」を指定してください（例: '24' や '48'）。",
    ),
    (
        "CalendarWriter",
        "Googleカレンダーに予定を追加します。\n入力形式の例: '2025-05-13 14:00 あかりちゃんとおでかけ'\n開始時刻とタイトルを含めてください。",
    ),
    (
        "CalendarRemover",
        "予定のイベントID（例: 'xxxxxxxabcd123'）を指定して、Googleカレンダーから削除します。",
    ),
    (
        "TasksReader",
        "Google Tasks の全タスク一覧を表示します。\n期限・完了状態・IDも一緒に表示されるので、削除や確認に使ってください。\n",
    ),
    (
        "TasksWriter",
        "Google Tasks に新しいタスクを追加します。\n【入力形式】\n\
・期限＋時刻あり: '2025-05-15 18:00 レポート提出'\n\
・期限のみ（終日）: '2025-05-15 買い物リスト作成'\n\
❌ '木曜の17時' や '明日の夜' のような曖昧な表現はサポートしていません。\n\
⚠️ 日付・時刻は明示的に入力してください。",
    ),
    (
        "TasksRemover",
        "Google Tasks からタスクを削除します。\n引数には TasksReader で表示されたタスクID（例: 'xxxxxx123456abcd'）を指定してください。\n",
    ),
];

/// Every tool takes a single free-form string argument named `input`.
pub(crate) fn tool_declarations() -> Vec<FunctionDeclaration> {
    TOOL_SPECS
        .iter()
        .map(|(name, description)| FunctionDeclaration {
            name: name.to_string(),
            description: description.to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "input": { "type": "string", "description": "ツールへの入力文字列" }
                },
                "required": ["input"]
            }),
        })
        .collect()
}

pub(crate) fn is_known_tool(name: &str) -> bool {
    TOOL_SPECS.iter().any(|(n, _)| *n == name)
}
