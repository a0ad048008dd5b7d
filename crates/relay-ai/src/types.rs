//! Core conversation types

use serde::{Deserialize, Serialize};

/// Content segments of an assistant message, in emission order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum Content {
    /// Text the model produced
    Text { text: String },
    /// Tool call the model decided to make
    ToolCall {
        tool_call_id: String,
        tool_name: String,
        args: serde_json::Value,
    },
}

impl Content {
    /// Create text content
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Create a tool call
    pub fn tool_call(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        args: serde_json::Value,
    ) -> Self {
        Self::ToolCall {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            args,
        }
    }

    /// Get text if this is text content
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// Assistant message content.
///
/// `Text` is the collapsed form of a single text segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AssistantContent {
    Text(String),
    Parts(Vec<Content>),
}

impl AssistantContent {
    /// View the content as segments, expanding the collapsed string form.
    pub fn to_parts(&self) -> Vec<Content> {
        match self {
            Self::Text(text) => vec![Content::text(text.clone())],
            Self::Parts(parts) => parts.clone(),
        }
    }

    /// Whether there is nothing in this content at all
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(text) => text.is_empty(),
            Self::Parts(parts) => parts.is_empty(),
        }
    }
}

impl Default for AssistantContent {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

/// Result of a tool call fed back to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "tool-result", rename_all = "camelCase")]
pub struct ToolResultPart {
    pub tool_call_id: String,
    pub tool_name: String,
    pub result: serde_json::Value,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_error: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl ToolResultPart {
    /// Create a successful tool result
    pub fn new(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        result: serde_json::Value,
    ) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            result,
            is_error: false,
        }
    }

    /// Create a failed tool result
    pub fn error(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        result: serde_json::Value,
    ) -> Self {
        Self {
            is_error: true,
            ..Self::new(tool_call_id, tool_name, result)
        }
    }
}

/// Message roles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    /// User input
    User { content: String },
    /// Model output: text and tool calls
    Assistant { content: AssistantContent },
    /// Tool results for calls of a preceding assistant message
    Tool { content: Vec<ToolResultPart> },
}

impl Message {
    /// Create a user message
    pub fn user(text: impl Into<String>) -> Self {
        Self::User {
            content: text.into(),
        }
    }

    /// Create an assistant message with plain text content
    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self::Assistant {
            content: AssistantContent::Text(text.into()),
        }
    }

    /// Create an assistant message from content segments
    pub fn assistant_parts(parts: Vec<Content>) -> Self {
        Self::Assistant {
            content: AssistantContent::Parts(parts),
        }
    }

    /// Create a tool message
    pub fn tool_results(results: Vec<ToolResultPart>) -> Self {
        Self::Tool { content: results }
    }

    /// Extract all tool calls from an assistant message as (id, name, args)
    pub fn tool_calls(&self) -> Vec<(&str, &str, &serde_json::Value)> {
        match self {
            Self::Assistant {
                content: AssistantContent::Parts(parts),
            } => parts
                .iter()
                .filter_map(|c| match c {
                    Content::ToolCall {
                        tool_call_id,
                        tool_name,
                        args,
                    } => Some((tool_call_id.as_str(), tool_name.as_str(), args)),
                    _ => None,
                })
                .collect(),
            _ => vec![],
        }
    }

    /// Tool results carried by a tool message
    pub fn tool_result_parts(&self) -> &[ToolResultPart] {
        match self {
            Self::Tool { content } => content,
            _ => &[],
        }
    }

    /// Get combined text content
    pub fn text(&self) -> String {
        match self {
            Self::User { content } => content.clone(),
            Self::Assistant {
                content: AssistantContent::Text(text),
            } => text.clone(),
            Self::Assistant {
                content: AssistantContent::Parts(parts),
            } => parts
                .iter()
                .filter_map(|c| c.as_text())
                .collect::<Vec<_>>()
                .join(""),
            Self::Tool { .. } => String::new(),
        }
    }

    /// Whether the message carries no content
    pub fn is_empty(&self) -> bool {
        match self {
            Self::User { content } => content.is_empty(),
            Self::Assistant { content } => content.is_empty(),
            Self::Tool { content } => content.is_empty(),
        }
    }
}

/// Tool definition handed to the model backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name (used in API calls)
    pub name: String,
    /// Human-readable description
    pub description: String,
    /// JSON Schema for parameters
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    /// Create a new tool definition
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// The set of tools available to a query
pub type ToolSet = Vec<ToolDefinition>;
