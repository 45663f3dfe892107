use serde_json::Value;

use crate::ToolContext;

const FRANKFURTER_URL: &str = "https://api.frankfurter.app/latest";

pub(crate) const EXCHANGE_FORMAT_GUIDANCE: &str =
    "❌ 'USD→JPY' のように2通貨コードを '→' でつなげてください。";

pub(crate) fn parse_currency_pair(query: &str) -> Option<(String, String)> {
    let (base, target) = query.split_once('→')?;
    Some((base.trim().to_string(), target.trim().to_string()))
}

pub(crate) fn format_rate(base: &str, target: &str, data: &Value) -> String {
    let rate = data
        .get("rates")
        .and_then(|rates| rates.get(target))
        .and_then(|r| r.as_f64());
    let Some(rate) = rate else {
        return format!("❌ {base}から{target}へのレートが取得できませんでした。");
    };
    let date = data.get("date").and_then(|d| d.as_str()).unwrap_or("");
    format!("【{date}】1 {base} = {rate:.3} {target}")
}

pub(crate) fn get_exchange_rate(ctx: &ToolContext, query: &str) -> String {
    let Some((base, target)) = parse_currency_pair(query) else {
        return EXCHANGE_FORMAT_GUIDANCE.to_string();
    };
    let url = format!(
        "{FRANKFURTER_URL}?from={}&to={}",
        urlencoding::encode(&base),
        urlencoding::encode(&target)
    );
    match ctx.get_json(&url) {
        Ok(data) => format_rate(&base, &target, &data),
        Err(err) => format!("❌ 為替API呼び出しエラー: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{AkariConfig, FileConfig};

    #[test]
    fn missing_arrow_returns_guidance_without_network() {
        let ctx = ToolContext::new(AkariConfig::from_file_config(FileConfig::default()).unwrap());
        assert_eq!(get_exchange_rate(&ctx, "USD to JPY"), EXCHANGE_FORMAT_GUIDANCE);
        assert_eq!(
            EXCHANGE_FORMAT_GUIDANCE,
            "❌ 'USD→JPY' のように2通貨コードを '→' でつなげてください。"
        );
    }

    #[test]
    fn pair_is_trimmed() {
        assert_eq!(
            parse_currency_pair(" USD → JPY "),
            Some(("USD".to_string(), "JPY".to_string()))
        );
    }

    #[test]
    fn rate_is_rendered_with_three_decimals() {
        let data = json!({"amount": 1.0, "base": "USD", "date": "2025-05-13", "rates": {"JPY": 147.52}});
        assert_eq!(format_rate("USD", "JPY", &data), "【2025-05-13】1 USD = 147.520 JPY");
    }

    #[test]
    fn missing_rate_is_reported() {
        let data = json!({"message": "not found"});
        assert_eq!(
            format_rate("USD", "XXX", &data),
            "❌ USDからXXXへのレートが取得できませんでした。"
        );
    }
}
