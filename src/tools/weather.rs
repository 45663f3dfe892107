use serde_json::Value;

use crate::ToolContext;

const GEO_URL: &str = "http://api.openweathermap.org/geo/1.0/direct";
const FORECAST_URL: &str = "https://api.openweathermap.org/data/2.5/forecast";

pub(crate) const LATLON_NOT_FOUND: &str = "❌ 都市名から座標が見つかりませんでした。";

pub(crate) fn format_geocode(data: &Value) -> String {
    let Some(first) = data.as_array().and_then(|items| items.first()) else {
        return LATLON_NOT_FOUND.to_string();
    };
    match (first.get("lat"), first.get("lon")) {
        (Some(lat), Some(lon)) if lat.is_number() && lon.is_number() => format!("{lat},{lon}"),
        _ => LATLON_NOT_FOUND.to_string(),
    }
}

pub(crate) fn get_lat_lon(ctx: &ToolContext, city: &str) -> String {
    let api_key = ctx.config.openweather_api_key.clone().unwrap_or_default();
    let url = format!(
        "{GEO_URL}?q={}&limit=1&appid={}",
        urlencoding::encode(city.trim()),
        urlencoding::encode(&api_key)
    );
    match ctx.get_json(&url) {
        Ok(data) => format_geocode(&data),
        Err(err) => {
            tracing::warn!(error = %err, "geocoding failed");
            LATLON_NOT_FOUND.to_string()
        }
    }
}

fn forecast_succeeded(data: &Value) -> bool {
    match data.get("cod") {
        Some(Value::String(code)) => code == "200",
        Some(Value::Number(code)) => code.as_u64() == Some(200),
        _ => false,
    }
}

/// Renders an OpenWeather 5-day/3-hour payload.
pub(crate) fn format_forecast(data: &Value) -> String {
    if !forecast_succeeded(data) {
        let message = match data.get("message") {
            Some(Value::String(m)) => m.clone(),
            Some(other) if !other.is_null() => other.to_string(),
            _ => "エラー内容不明".to_string(),
        };
        return format!("❌ 天気情報の取得に失敗しました: {message}");
    }
    let city = data
        .get("city")
        .and_then(|c| c.get("name"))
        .and_then(|n| n.as_str())
        .unwrap_or("指定地");
    let mut lines = Vec::new();
    for entry in data.get("list").and_then(|l| l.as_array()).into_iter().flatten() {
        let dt_txt = entry.get("dt_txt").and_then(|v| v.as_str()).unwrap_or("");
        let temp = entry
            .get("main")
            .and_then(|m| m.get("temp"))
            .and_then(|t| t.as_f64())
            .unwrap_or_default();
        let desc = entry
            .get("weather")
            .and_then(|w| w.get(0))
            .and_then(|w| w.get("description"))
            .and_then(|d| d.as_str())
            .unwrap_or("");
        let pop = (entry.get("pop").and_then(|p| p.as_f64()).unwrap_or(0.0) * 100.0) as i64;
        lines.push(format!("{dt_txt}: {desc}, {temp:.1}℃, 降水確率{pop}%"));
    }
    format!("{city}の天気予報（直近）:\n{}", lines.join("\n"))
}

pub(crate) fn parse_latlon(input: &str) -> Result<(String, String), String> {
    let mut parts = input.split(',');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(lat), Some(lon), None) if !lat.trim().is_empty() && !lon.trim().is_empty() => {
            Ok((lat.trim().to_string(), lon.trim().to_string()))
        }
        _ => Err(format!("緯度経度を 'lat,lon' の形式で指定してください（入力: {input}）")),
    }
}

pub(crate) fn weather_forecast(ctx: &ToolContext, latlon: &str) -> String {
    let (lat, lon) = match parse_latlon(latlon) {
        Ok(pair) => pair,
        Err(err) => return format!("❌ API呼び出し中にエラーが発生しました: {err}"),
    };
    let api_key = ctx.config.openweather_api_key.clone().unwrap_or_default();
    let url = format!(
        "{FORECAST_URL}?lat={}&lon={}&appid={}&units=metric&lang=ja",
        urlencoding::encode(&lat),
        urlencoding::encode(&lon),
        urlencoding::encode(&api_key)
    );
    match ctx.get_json(&url) {
        Ok(data) => format_forecast(&data),
        Err(err) => format!("❌ API呼び出し中にエラーが発生しました: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn non_200_cod_reports_upstream_message() {
        let data = json!({"cod": "401", "message": "Invalid API key"});
        assert_eq!(
            format_forecast(&data),
            "❌ 天気情報の取得に失敗しました: Invalid API key"
        );
    }

    #[test]
    fn numeric_error_cod_without_message_is_unknown() {
        let data = json!({"cod": 500});
        assert_eq!(format_forecast(&data), "❌ 天気情報の取得に失敗しました: エラー内容不明");
    }

    #[test]
    fn forecast_lines_match_expected_layout() {
        let data = json!({
            "cod": "200",
            "city": {"name": "東京都"},
            "list": [
                {"dt_txt": "2025-05-13 12:00:00", "main": {"temp": 21.46},
                 "weather": [{"description": "曇りがち"}], "pop": 0.29},
                {"dt_txt": "2025-05-13 15:00:00", "main": {"temp": 19.0},
                 "weather": [{"description": "小雨"}]}
            ]
        });
        assert_eq!(
            format_forecast(&data),
            "東京都の天気予報（直近）:\n2025-05-13 12:00:00: 曇りがち, 21.5℃, 降水確率28%\n2025-05-13 15:00:00: 小雨, 19.0℃, 降水確率0%"
        );
    }

    #[test]
    fn geocode_returns_lat_lon_or_not_found() {
        assert_eq!(format_geocode(&json!([{"lat": 35.6828387, "lon": 139.7594549}])), "35.6828387,139.7594549");
        assert_eq!(format_geocode(&json!([])), LATLON_NOT_FOUND);
        assert_eq!(format_geocode(&json!({"cod": 401})), LATLON_NOT_FOUND);
    }

    #[test]
    fn latlon_requires_two_parts() {
        assert_eq!(parse_latlon("35.7, 139.7").unwrap(), ("35.7".to_string(), "139.7".to_string()));
        assert!(parse_latlon("東京").is_err());
    }
}
