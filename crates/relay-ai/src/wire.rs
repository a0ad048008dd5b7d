//! Provider-facing message format and conversion to and from [`Message`].
//!
//! The wire format follows what model backends accept: string-or-array
//! content, `input` instead of `args` on tool calls, and tagged tool outputs.
//! It changes more often than the internal model, so parsing is lenient:
//! anything a backend sends can be decoded, and conversion never fails.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{AssistantContent, Content, Message, ToolResultPart};

/// Prefix marking content that arrived under a role the internal model lacks
pub const SYSTEM_MARKER: &str = "[system]";

/// A message in the backend's format.
///
/// Roles other than user, assistant and tool decode as `System`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum WireMessage {
    System { content: WireContent },
    User { content: WireContent },
    Assistant { content: WireContent },
    Tool { content: WireContent },
}

#[derive(Deserialize)]
struct RawWireMessage {
    role: String,
    #[serde(default = "missing_content")]
    content: WireContent,
}

fn missing_content() -> WireContent {
    WireContent::Other(Value::Null)
}

impl<'de> Deserialize<'de> for WireMessage {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let RawWireMessage { role, content } = RawWireMessage::deserialize(deserializer)?;
        Ok(match role.as_str() {
            "user" => Self::User { content },
            "assistant" => Self::Assistant { content },
            "tool" => Self::Tool { content },
            "system" => Self::System { content },
            other => {
                tracing::debug!(role = other, "treating unrecognized wire role as system");
                Self::System { content }
            }
        })
    }
}

/// Message content: a plain string or an ordered list of parts.
///
/// `Other` captures malformed content so decoding stays total; converters
/// treat it as empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireContent {
    Text(String),
    Parts(Vec<WirePart>),
    Other(Value),
}

impl WireContent {
    /// Whether the content holds nothing
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(text) => text.is_empty(),
            Self::Parts(parts) => parts.is_empty(),
            Self::Other(_) => true,
        }
    }
}

/// A content part in the backend's format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum WirePart {
    Text {
        text: String,
    },
    /// Model reasoning; the internal model does not keep it
    Reasoning {
        text: String,
    },
    ToolCall {
        tool_call_id: String,
        tool_name: String,
        input: Value,
    },
    ToolResult {
        tool_call_id: String,
        tool_name: String,
        output: ToolOutput,
    },
    /// Any part kind this crate does not know about
    #[serde(other)]
    Unknown,
}

/// Tool output as the backend represents it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolOutput {
    Tagged(TaggedOutput),
    /// A bare value with no output tag; never an error
    Plain(Value),
}

/// Tagged tool output variants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "kebab-case")]
pub enum TaggedOutput {
    Json(Value),
    ErrorJson(Value),
    Text(String),
    ErrorText(String),
}

impl ToolOutput {
    /// Wrap an internal result, tagging it as an error when requested
    pub fn from_result(result: Value, is_error: bool) -> Self {
        if is_error {
            Self::Tagged(TaggedOutput::ErrorJson(result))
        } else {
            Self::Tagged(TaggedOutput::Json(result))
        }
    }

    /// Whether the output carries an error tag
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Self::Tagged(TaggedOutput::ErrorJson(_) | TaggedOutput::ErrorText(_))
        )
    }

    /// The output's payload as JSON
    pub fn value(&self) -> Value {
        match self {
            Self::Tagged(TaggedOutput::Json(v) | TaggedOutput::ErrorJson(v)) => v.clone(),
            Self::Tagged(TaggedOutput::Text(s) | TaggedOutput::ErrorText(s)) => {
                Value::String(s.clone())
            }
            Self::Plain(v) => v.clone(),
        }
    }
}

impl WireMessage {
    /// Create a user message with string content
    pub fn user(text: impl Into<String>) -> Self {
        Self::User {
            content: WireContent::Text(text.into()),
        }
    }

    /// Borrow the content regardless of role
    pub fn content(&self) -> &WireContent {
        match self {
            Self::System { content }
            | Self::User { content }
            | Self::Assistant { content }
            | Self::Tool { content } => content,
        }
    }

    /// Rebuild the message with the same role and new content
    pub fn with_content(&self, content: WireContent) -> Self {
        match self {
            Self::System { .. } => Self::System { content },
            Self::User { .. } => Self::User { content },
            Self::Assistant { .. } => Self::Assistant { content },
            Self::Tool { .. } => Self::Tool { content },
        }
    }
}

// ============================================================================
// Internal -> wire
// ============================================================================

/// Convert a history into the backend's message format
pub fn to_wire(messages: &[Message]) -> Vec<WireMessage> {
    messages.iter().map(message_to_wire).collect()
}

fn message_to_wire(message: &Message) -> WireMessage {
    match message {
        Message::User { content } => WireMessage::User {
            content: WireContent::Text(content.clone()),
        },
        Message::Assistant {
            content: AssistantContent::Text(text),
        } => WireMessage::Assistant {
            content: WireContent::Text(text.clone()),
        },
        Message::Assistant {
            content: AssistantContent::Parts(parts),
        } => WireMessage::Assistant {
            content: WireContent::Parts(parts.iter().map(content_to_wire).collect()),
        },
        Message::Tool { content } => WireMessage::Tool {
            content: WireContent::Parts(
                content
                    .iter()
                    .map(|r| WirePart::ToolResult {
                        tool_call_id: r.tool_call_id.clone(),
                        tool_name: r.tool_name.clone(),
                        output: ToolOutput::from_result(r.result.clone(), r.is_error),
                    })
                    .collect(),
            ),
        },
    }
}

fn content_to_wire(content: &Content) -> WirePart {
    match content {
        Content::Text { text } => WirePart::Text { text: text.clone() },
        Content::ToolCall {
            tool_call_id,
            tool_name,
            args,
        } => WirePart::ToolCall {
            tool_call_id: tool_call_id.clone(),
            tool_name: tool_name.clone(),
            input: args.clone(),
        },
    }
}

// ============================================================================
// Wire -> internal
// ============================================================================

/// Convert backend messages back into the internal model
pub fn from_wire(messages: &[WireMessage]) -> Vec<Message> {
    messages.iter().map(message_from_wire).collect()
}

fn message_from_wire(message: &WireMessage) -> Message {
    match message {
        WireMessage::System { content } => {
            Message::user(format!("{} {}", SYSTEM_MARKER, flatten_text(content)))
        }
        WireMessage::User { content } => Message::user(flatten_text(content)),
        WireMessage::Assistant { content } => Message::Assistant {
            content: assistant_from_wire(content),
        },
        WireMessage::Tool { content } => Message::Tool {
            content: tool_results_from_wire(content),
        },
    }
}

fn flatten_text(content: &WireContent) -> String {
    match content {
        WireContent::Text(text) => text.clone(),
        WireContent::Parts(parts) => parts
            .iter()
            .filter_map(|p| match p {
                WirePart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join(""),
        WireContent::Other(_) => String::new(),
    }
}

fn assistant_from_wire(content: &WireContent) -> AssistantContent {
    let parts = match content {
        WireContent::Text(text) => return AssistantContent::Text(text.clone()),
        WireContent::Parts(parts) => parts,
        WireContent::Other(_) => return AssistantContent::default(),
    };

    let kept: Vec<Content> = parts
        .iter()
        .filter_map(|p| match p {
            WirePart::Text { text } => Some(Content::text(text.clone())),
            WirePart::ToolCall {
                tool_call_id,
                tool_name,
                input,
            } => Some(Content::tool_call(
                tool_call_id.clone(),
                tool_name.clone(),
                input.clone(),
            )),
            WirePart::Reasoning { .. } | WirePart::ToolResult { .. } | WirePart::Unknown => None,
        })
        .collect();

    match kept.as_slice() {
        [] => AssistantContent::default(),
        [Content::Text { text }] => AssistantContent::Text(text.clone()),
        _ => AssistantContent::Parts(kept),
    }
}

fn tool_results_from_wire(content: &WireContent) -> Vec<ToolResultPart> {
    let WireContent::Parts(parts) = content else {
        return vec![];
    };
    parts
        .iter()
        .filter_map(|p| match p {
            WirePart::ToolResult {
                tool_call_id,
                tool_name,
                output,
            } => Some(ToolResultPart {
                tool_call_id: tool_call_id.clone(),
                tool_name: tool_name.clone(),
                result: output.value(),
                is_error: output.is_error(),
            }),
            _ => None,
        })
        .collect()
}
