//! Wire encoding for the turn stream.
//!
//! The turn endpoint responds with newline-separated UTF-8 units:
//!
//! - `{"choices":[{"messages":[{"role","content","citations"?}]}]}` — a
//!   text/citations unit; `content` is the ACCUMULATED assistant text, so
//!   consumers may replace their local buffer.
//! - `{"object": …}` — the chart payload for a chart-intent turn.
//! - `{"error": "…"}` — terminal error.
//! - `__KEEPALIVE__` — idle marker, stripped by consumers.
//! - `__TOOL_EVENT__<json>__END_TOOL_EVENT__` — tool lifecycle event.
//! - `__REASONING_REPLACE__<text>__END_REASONING_REPLACE__` — cumulative
//!   reasoning; REPLACES the consumer's reasoning display, never appended.
//!
//! `done` produces no unit: the server closing the connection after a
//! successful terminal frame is the success signal.

use serde_json::Value;

use fm_domain::tool::Citation;

use super::turn::TurnFrame;

pub const KEEPALIVE: &str = "__KEEPALIVE__";
pub const TOOL_EVENT_OPEN: &str = "__TOOL_EVENT__";
pub const TOOL_EVENT_CLOSE: &str = "__END_TOOL_EVENT__";
pub const REASONING_OPEN: &str = "__REASONING_REPLACE__";
pub const REASONING_CLOSE: &str = "__END_REASONING_REPLACE__";

/// Encode one frame into its wire unit (newline-terminated). `Done` closes
/// the connection instead of producing a unit.
pub fn encode(frame: &TurnFrame) -> Option<String> {
    match frame {
        TurnFrame::Text { accumulated } => Some(format!(
            "{}\n",
            choices_unit(accumulated, None)
        )),
        TurnFrame::Citations {
            accumulated,
            citations,
        } => Some(format!(
            "{}\n",
            choices_unit(accumulated, Some(citations))
        )),
        TurnFrame::Reasoning { text } => {
            Some(format!("{REASONING_OPEN}{text}{REASONING_CLOSE}\n"))
        }
        TurnFrame::Tool(event) => {
            let json = serde_json::to_string(event).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "failed to serialize tool event");
                String::from("{}")
            });
            Some(format!("{TOOL_EVENT_OPEN}{json}{TOOL_EVENT_CLOSE}\n"))
        }
        TurnFrame::Chart(payload) => Some(format!(
            "{}\n",
            serde_json::json!({ "object": payload })
        )),
        TurnFrame::Error { message } => Some(format!(
            "{}\n",
            serde_json::json!({ "error": message })
        )),
        TurnFrame::Done => None,
    }
}

/// The idle keepalive unit.
pub fn keepalive_unit() -> String {
    format!("{KEEPALIVE}\n")
}

fn choices_unit(accumulated: &str, citations: Option<&[Citation]>) -> String {
    let mut message = serde_json::json!({
        "role": "assistant",
        "content": accumulated,
    });
    if let Some(citations) = citations {
        message["citations"] = serde_json::to_value(citations).unwrap_or(Value::Null);
    }
    serde_json::json!({
        "choices": [{ "messages": [message] }]
    })
    .to_string()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Decoding (consumer side, used by tests)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// What a consumer recovers from a raw stream after stripping keepalives
/// and envelope markers.
#[derive(Debug, Default, Clone)]
pub struct DecodedStream {
    /// Final accumulated assistant text (last text unit wins).
    pub text: String,
    /// Final citations, when a citations unit arrived.
    pub citations: Vec<Citation>,
    /// Final cumulative reasoning (REPLACE semantics).
    pub reasoning: String,
    /// Extracted tool events in stream order.
    pub tool_events: Vec<Value>,
    /// Chart payloads (`{"object": …}` contents).
    pub charts: Vec<Value>,
    /// Terminal errors.
    pub errors: Vec<String>,
    /// Number of keepalive units stripped.
    pub keepalives: usize,
}

/// Decode a raw wire stream the way a consumer must: strip keepalives,
/// extract marker envelopes (which may be inlined anywhere, and whose
/// payload may span lines), and track the accumulated text/citations.
pub fn decode_stream(raw: &str) -> DecodedStream {
    let mut decoded = DecodedStream::default();

    // Envelope extraction runs over the whole stream first: reasoning text
    // is free-form and may contain newlines.
    let mut rest = raw.to_string();
    while let Some(start) = rest.find(TOOL_EVENT_OPEN) {
        let Some(end) = rest.find(TOOL_EVENT_CLOSE) else {
            break;
        };
        let inner = &rest[start + TOOL_EVENT_OPEN.len()..end];
        if let Ok(value) = serde_json::from_str(inner) {
            decoded.tool_events.push(value);
        }
        rest.replace_range(start..end + TOOL_EVENT_CLOSE.len(), "");
    }
    while let Some(start) = rest.find(REASONING_OPEN) {
        let Some(end) = rest.find(REASONING_CLOSE) else {
            break;
        };
        decoded.reasoning = rest[start + REASONING_OPEN.len()..end].to_string();
        rest.replace_range(start..end + REASONING_CLOSE.len(), "");
    }

    decoded.keepalives = rest.matches(KEEPALIVE).count();
    let rest = rest.replace(KEEPALIVE, "");

    for line in rest.lines() {
        let rest = line.trim();
        if rest.is_empty() {
            continue;
        }

        let Ok(value) = serde_json::from_str::<Value>(rest) else {
            continue;
        };

        if let Some(error) = value.get("error").and_then(|e| e.as_str()) {
            decoded.errors.push(error.to_string());
        } else if let Some(object) = value.get("object") {
            decoded.charts.push(object.clone());
        } else if let Some(message) = value
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("messages"))
            .and_then(|m| m.get(0))
        {
            if let Some(content) = message.get("content").and_then(|c| c.as_str()) {
                decoded.text = content.to_string();
            }
            if let Some(citations) = message.get("citations") {
                if let Ok(parsed) = serde_json::from_value(citations.clone()) {
                    decoded.citations = parsed;
                }
            }
        }
    }

    decoded
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use fm_domain::tool::ToolEventRecord;

    #[test]
    fn text_unit_carries_accumulated_content() {
        let frame = TurnFrame::Text {
            accumulated: "The top 3".into(),
        };
        let unit = encode(&frame).unwrap();
        let value: Value = serde_json::from_str(unit.trim()).unwrap();
        assert_eq!(
            value["choices"][0]["messages"][0]["content"],
            "The top 3"
        );
        assert_eq!(value["choices"][0]["messages"][0]["role"], "assistant");
    }

    #[test]
    fn done_produces_no_unit() {
        assert!(encode(&TurnFrame::Done).is_none());
    }

    #[test]
    fn reasoning_wrapped_in_replace_envelope() {
        let frame = TurnFrame::Reasoning {
            text: "thinking about sales".into(),
        };
        let unit = encode(&frame).unwrap();
        assert!(unit.starts_with(REASONING_OPEN));
        assert!(unit.trim_end().ends_with(REASONING_CLOSE));
    }

    #[test]
    fn tool_event_wrapped_in_envelope() {
        let frame = TurnFrame::Tool(ToolEventRecord::start("sql_query", 1, None));
        let unit = encode(&frame).unwrap();
        assert!(unit.starts_with(TOOL_EVENT_OPEN));
        assert!(unit.contains("\"phase\":\"start\""));
    }

    #[test]
    fn chart_unit_uses_object_key() {
        let frame = TurnFrame::Chart(serde_json::json!({"chartType": "line"}));
        let unit = encode(&frame).unwrap();
        let value: Value = serde_json::from_str(unit.trim()).unwrap();
        assert_eq!(value["object"]["chartType"], "line");
    }

    #[test]
    fn decode_round_trip_recovers_message() {
        let frames = vec![
            TurnFrame::Reasoning {
                text: "checking the warehouse".into(),
            },
            TurnFrame::Tool(ToolEventRecord::start("sql_query", 1, None)),
            TurnFrame::Text {
                accumulated: "The top".into(),
            },
            TurnFrame::Tool(ToolEventRecord::success("sql_query", 1, 120, "3 rows")),
            TurnFrame::Text {
                accumulated: "The top 3 products".into(),
            },
            TurnFrame::Citations {
                accumulated: "The top 3 products".into(),
                citations: vec![Citation {
                    index: 1,
                    title: Some("warehouse".into()),
                    url: None,
                    snippet: None,
                    relevance: None,
                }],
            },
            TurnFrame::Done,
        ];

        let mut raw = String::new();
        raw.push_str(&keepalive_unit());
        for frame in &frames {
            if let Some(unit) = encode(frame) {
                raw.push_str(&unit);
            }
        }

        let decoded = decode_stream(&raw);
        assert_eq!(decoded.text, "The top 3 products");
        assert_eq!(decoded.citations.len(), 1);
        assert_eq!(decoded.reasoning, "checking the warehouse");
        assert_eq!(decoded.tool_events.len(), 2);
        assert_eq!(decoded.keepalives, 1);
        assert!(decoded.errors.is_empty());
    }

    #[test]
    fn decode_with_and_without_keepalives_is_identical() {
        let frames = vec![
            TurnFrame::Text {
                accumulated: "hello".into(),
            },
            TurnFrame::Text {
                accumulated: "hello world".into(),
            },
        ];

        let mut plain = String::new();
        let mut noisy = String::new();
        for frame in &frames {
            let unit = encode(frame).unwrap();
            plain.push_str(&unit);
            noisy.push_str(&keepalive_unit());
            noisy.push_str(&unit);
        }

        let a = decode_stream(&plain);
        let b = decode_stream(&noisy);
        assert_eq!(a.text, b.text);
        assert_eq!(a.citations, b.citations);
    }

    #[test]
    fn decode_error_unit() {
        let unit = encode(&TurnFrame::Error {
            message: "request rate limit exceeded, please retry".into(),
        })
        .unwrap();
        let decoded = decode_stream(&unit);
        assert_eq!(decoded.errors.len(), 1);
        assert!(decoded.errors[0].contains("rate limit"));
    }

    #[test]
    fn reasoning_replaces_not_appends() {
        let mut raw = String::new();
        raw.push_str(&encode(&TurnFrame::Reasoning { text: "step 1".into() }).unwrap());
        raw.push_str(
            &encode(&TurnFrame::Reasoning {
                text: "step 1 then step 2".into(),
            })
            .unwrap(),
        );
        let decoded = decode_stream(&raw);
        assert_eq!(decoded.reasoning, "step 1 then step 2");
    }
}
