//! Trimming token-heavy tool calls out of history before it is resent.
//!
//! A generated report is large and rarely useful as context once the user
//! has it. Its title is kept so follow-ups like "update the report" still
//! resolve.

use relay_ai::{WireContent, WireMessage, WirePart};
use serde_json::{Map, Value};

/// Name of the report generation tool
pub const REPORT_TOOL_NAME: &str = "generate_report";

/// Stands in for a truncated report body
pub const REPORT_PLACEHOLDER: &str =
    "[Report content omitted from history. It was already delivered to the user.]";

/// Replace the input of every heavy tool call with a placeholder.
///
/// Returns a new history; the input is left untouched.
pub fn truncate_heavy_tool_calls(messages: &[WireMessage], heavy_tools: &[String]) -> Vec<WireMessage> {
    messages
        .iter()
        .map(|message| match message {
            WireMessage::Assistant {
                content: WireContent::Parts(parts),
            } => WireMessage::Assistant {
                content: WireContent::Parts(
                    parts.iter().map(|part| truncate_part(part, heavy_tools)).collect(),
                ),
            },
            other => other.clone(),
        })
        .collect()
}

fn truncate_part(part: &WirePart, heavy_tools: &[String]) -> WirePart {
    match part {
        WirePart::ToolCall {
            tool_call_id,
            tool_name,
            input,
        } if heavy_tools.iter().any(|h| h == tool_name) => WirePart::ToolCall {
            tool_call_id: tool_call_id.clone(),
            tool_name: tool_name.clone(),
            input: placeholder_input(input),
        },
        other => other.clone(),
    }
}

fn placeholder_input(input: &Value) -> Value {
    let mut placeholder = Map::new();
    if let Some(title) = input.get("title") {
        placeholder.insert("title".to_string(), title.clone());
    }
    placeholder.insert(
        "content".to_string(),
        Value::String(REPORT_PLACEHOLDER.to_string()),
    );
    Value::Object(placeholder)
}
