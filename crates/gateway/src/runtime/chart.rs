//! Chart intent detection and chart payload parsing.
//!
//! Intent is derived from the user text only. English keywords must match
//! as whole words (case-insensitive); non-Latin keywords match as
//! substrings, since word boundaries don't apply to Japanese text.
//!
//! When intent is present the model's final content is expected to be a
//! chart payload; the parser distinguishes malformed JSON (the model tried
//! and failed) from content that simply isn't a chart.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use fm_domain::chart::{ChartPayload, ChartSet};

static ENGLISH_KEYWORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(chart|graph|visualize|plot)\b").expect("static pattern compiles")
});

const NON_LATIN_KEYWORDS: &[&str] = &[
    "グラフ",
    "チャート",
    "可視化",
    "図",
    "棒グラフ",
    "円グラフ",
    "折れ線",
    "折れ線グラフ",
];

/// Whether the user text asks for a chart.
pub fn chart_intent(user_text: &str) -> bool {
    if ENGLISH_KEYWORDS.is_match(user_text) {
        return true;
    }
    NON_LATIN_KEYWORDS.iter().any(|kw| user_text.contains(kw))
}

/// Why the final content could not be shaped into a chart response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChartParseError {
    /// The trailing content was not parseable JSON at all — the model
    /// emitted a broken payload.
    Malformed,
    /// The content parsed but carries neither `type`/`chartType` nor
    /// `data` — there is no chart in it.
    Missing,
}

impl ChartParseError {
    /// The single user-facing message for both failure classes.
    pub fn user_message(&self) -> &'static str {
        "chart cannot be generated, please try again"
    }
}

/// Interpret the model's final content as a chart response.
///
/// Accepted shapes, after unwrapping an optional `{"answer": …}` envelope:
/// a single payload, or `{"charts": [payload, …]}`. The returned value is
/// ready for the wire (`{"object": …}` framing happens in the encoder).
pub fn parse_chart_response(content: &str) -> Result<Value, ChartParseError> {
    let raw = strip_fences(content.trim());

    let parsed: Value = serde_json::from_str(raw)
        .or_else(|_| {
            // The answer may carry prose around the object; take the outermost
            // braces span.
            match (raw.find('{'), raw.rfind('}')) {
                (Some(start), Some(end)) if start < end => {
                    serde_json::from_str(&raw[start..=end])
                }
                _ => serde_json::from_str(raw),
            }
        })
        .map_err(|_| ChartParseError::Malformed)?;

    let candidate = match parsed.get("answer") {
        Some(inner) => inner.clone(),
        None => parsed,
    };

    if let Some(charts) = candidate.get("charts").and_then(|c| c.as_array()) {
        let valid: Vec<ChartPayload> = charts
            .iter()
            .filter_map(|c| serde_json::from_value(c.clone()).ok())
            .collect();
        if valid.is_empty() {
            return Err(ChartParseError::Missing);
        }
        return Ok(serde_json::to_value(ChartSet { charts: valid })
            .map_err(|_| ChartParseError::Malformed)?);
    }

    match serde_json::from_value::<ChartPayload>(candidate.clone()) {
        Ok(chart) => Ok(serde_json::to_value(chart).map_err(|_| ChartParseError::Malformed)?),
        Err(_) => Err(ChartParseError::Missing),
    }
}

fn strip_fences(raw: &str) -> &str {
    let raw = raw.trim();
    let Some(body) = raw.strip_prefix("```") else {
        return raw;
    };
    let body = body.strip_prefix("json").unwrap_or(body);
    body.trim_start_matches('\n')
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── Intent detection ───────────────────────────────────────────

    #[test]
    fn english_keyword_whole_word_matches() {
        assert!(chart_intent("show me a chart of monthly sales"));
        assert!(chart_intent("PLOT revenue by region"));
        assert!(chart_intent("Can you graph this?"));
    }

    #[test]
    fn english_keyword_substring_does_not_match() {
        assert!(!chart_intent("the cartography department"));
        assert!(!chart_intent("photograph of the product"));
        assert!(!chart_intent("a subplot in the story"));
    }

    #[test]
    fn japanese_keyword_substring_matches() {
        assert!(chart_intent("月別売上を折れ線グラフで"));
        assert!(chart_intent("売上をチャートにして"));
        assert!(chart_intent("可視化してください"));
    }

    #[test]
    fn no_keyword_no_intent() {
        assert!(!chart_intent("Top 3 products this month"));
    }

    // ── Payload parsing ────────────────────────────────────────────

    fn line_chart_json() -> String {
        serde_json::json!({
            "chartType": "line",
            "data": {
                "labels": ["Jan", "Feb"],
                "datasets": [{"label": "sales", "values": [1.0, 2.0]}]
            }
        })
        .to_string()
    }

    #[test]
    fn single_payload_accepted() {
        let value = parse_chart_response(&line_chart_json()).unwrap();
        assert_eq!(value["chartType"], "line");
    }

    #[test]
    fn charts_wrapper_accepted() {
        let raw = format!(r#"{{"charts":[{}]}}"#, line_chart_json());
        let value = parse_chart_response(&raw).unwrap();
        assert_eq!(value["charts"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn answer_envelope_unwrapped() {
        let raw = format!(r#"{{"answer":{}}}"#, line_chart_json());
        let value = parse_chart_response(&raw).unwrap();
        assert_eq!(value["chartType"], "line");
    }

    #[test]
    fn fenced_json_accepted() {
        let raw = format!("```json\n{}\n```", line_chart_json());
        let value = parse_chart_response(&raw).unwrap();
        assert_eq!(value["chartType"], "line");
    }

    #[test]
    fn prose_around_object_accepted() {
        let raw = format!("Here is your chart: {}", line_chart_json());
        let value = parse_chart_response(&raw).unwrap();
        assert_eq!(value["chartType"], "line");
    }

    #[test]
    fn broken_json_is_malformed() {
        let err = parse_chart_response("{\"chartType\": \"line\",").unwrap_err();
        assert_eq!(err, ChartParseError::Malformed);
    }

    #[test]
    fn plain_text_is_malformed() {
        let err = parse_chart_response("Sales went up in March.").unwrap_err();
        assert_eq!(err, ChartParseError::Malformed);
    }

    #[test]
    fn json_without_chart_fields_is_missing() {
        let err = parse_chart_response(r#"{"message": "no chart here"}"#).unwrap_err();
        assert_eq!(err, ChartParseError::Missing);
    }

    #[test]
    fn type_alias_accepted() {
        let raw = r#"{"type":"bar","data":{"labels":["a"],"datasets":[{"values":[1.0]}]}}"#;
        let value = parse_chart_response(raw).unwrap();
        assert_eq!(value["chartType"], "bar");
    }

    #[test]
    fn both_classes_share_user_message() {
        assert_eq!(
            ChartParseError::Malformed.user_message(),
            ChartParseError::Missing.user_message()
        );
        assert_eq!(
            ChartParseError::Malformed.user_message(),
            "chart cannot be generated, please try again"
        );
    }
}
