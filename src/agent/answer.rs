//! Typing of the agent's final answer.
//!
//! The licensing agent normally answers with a JSON object carrying three
//! markdown sections and optional chart rows; anything else is shown as
//! plain markdown.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One bar group of the license usage chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartRow {
    pub product: String,
    pub current_usage: f64,
    pub proposed_licenses: f64,
}

/// The three-section answer layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredAnswer {
    pub usage: String,
    pub proposal: String,
    pub suggestions: String,
    #[serde(rename = "chartData", default, skip_serializing_if = "Option::is_none")]
    pub chart_rows: Option<Vec<ChartRow>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AgentAnswer {
    Structured(StructuredAnswer),
    Plain { text: String },
}

impl AgentAnswer {
    /// Structured when `text` is a JSON object whose `usage`, `proposal`
    /// and `suggestions` are all present and non-empty; plain otherwise.
    pub fn from_answer(text: &str) -> Self {
        let plain = || AgentAnswer::Plain {
            text: text.to_string(),
        };

        let map = match serde_json::from_str::<Value>(text.trim()) {
            Ok(Value::Object(map)) => map,
            _ => return plain(),
        };

        let (Some(usage), Some(proposal), Some(suggestions)) = (
            section(&map, "usage"),
            section(&map, "proposal"),
            section(&map, "suggestions"),
        ) else {
            tracing::debug!("Response missing required fields, treating as markdown");
            return plain();
        };

        AgentAnswer::Structured(StructuredAnswer {
            usage,
            proposal,
            suggestions,
            chart_rows: chart_rows(&map),
        })
    }

    pub fn is_structured(&self) -> bool {
        matches!(self, AgentAnswer::Structured(_))
    }
}

/// Section text, or `None` when the field is absent or empty.
///
/// Non-string sections are kept as compact JSON.
fn section(map: &Map<String, Value>, key: &str) -> Option<String> {
    match map.get(key)? {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        other => Some(other.to_string()),
    }
}

fn chart_rows(map: &Map<String, Value>) -> Option<Vec<ChartRow>> {
    let raw = map.get("chartData")?;
    match serde_json::from_value::<Vec<ChartRow>>(raw.clone()) {
        Ok(rows) if !rows.is_empty() => Some(rows),
        Ok(_) => None,
        Err(e) => {
            tracing::debug!("Ignoring malformed chartData: {}", e);
            None
        }
    }
}
