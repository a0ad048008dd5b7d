//! Client-facing event and input types

use serde::{Deserialize, Serialize};

/// A notification sent to the client, tagged with the session it belongs to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientEvent {
    pub session_id: String,
    #[serde(flatten)]
    pub kind: EventKind,
}

/// Kinds of client notifications
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    /// A chunk of streamed assistant text
    Text { content: String },

    /// The model is about to run a tool
    ToolCall {
        tool_call_id: String,
        tool_name: String,
        args: serde_json::Value,
    },

    /// A tool finished; `result` is passed through untouched
    ToolResult {
        tool_call_id: String,
        tool_name: String,
        result: serde_json::Value,
        is_error: bool,
    },

    /// A report was produced by a report tool
    Report {
        tool_call_id: String,
        report: serde_json::Value,
    },

    /// The query failed or was rejected
    Error { message: String },

    /// The query finished (successfully or by cancellation)
    Done,

    /// History was compacted after a token-limit failure
    ContextCompacted {
        message: String,
        messages_before: usize,
        messages_after: usize,
    },
}

impl ClientEvent {
    /// Create an event for a session
    pub fn new(session_id: impl Into<String>, kind: EventKind) -> Self {
        Self {
            session_id: session_id.into(),
            kind,
        }
    }

    /// Check if this event ends a query
    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, EventKind::Done | EventKind::Error { .. })
    }
}

/// Requests a client can make
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientInput {
    /// Run a query, optionally against caller-supplied history
    Query {
        content: String,
        #[serde(default)]
        session_id: Option<String>,
        #[serde(default)]
        history: Option<Vec<serde_json::Value>>,
    },
    /// Cancel the running query
    Cancel {
        #[serde(default)]
        session_id: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_serializes_flat() {
        let event = ClientEvent::new(
            "s1",
            EventKind::ToolCall {
                tool_call_id: "c1".into(),
                tool_name: "bash".into(),
                args: json!({"command": "ls"}),
            },
        );
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({
                "session_id": "s1",
                "type": "tool_call",
                "tool_call_id": "c1",
                "tool_name": "bash",
                "args": {"command": "ls"}
            })
        );
    }

    #[test]
    fn test_done_round_trips() {
        let event = ClientEvent::new("s1", EventKind::Done);
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value, json!({"session_id": "s1", "type": "done"}));
        let back: ClientEvent = serde_json::from_value(value).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_terminal_events() {
        assert!(ClientEvent::new("s", EventKind::Done).is_terminal());
        assert!(ClientEvent::new("s", EventKind::Error { message: "x".into() }).is_terminal());
        assert!(!ClientEvent::new("s", EventKind::Text { content: "x".into() }).is_terminal());
    }

    #[test]
    fn test_client_input_parses() {
        let query: ClientInput =
            serde_json::from_str(r#"{"type": "query", "content": "hi"}"#).unwrap();
        assert_eq!(
            query,
            ClientInput::Query {
                content: "hi".into(),
                session_id: None,
                history: None,
            }
        );

        let with_history: ClientInput = serde_json::from_value(json!({
            "type": "query",
            "content": "again",
            "session_id": "abc",
            "history": [{"role": "user", "content": "before"}]
        }))
        .unwrap();
        match with_history {
            ClientInput::Query { history, session_id, .. } => {
                assert_eq!(session_id.as_deref(), Some("abc"));
                assert_eq!(history.unwrap().len(), 1);
            }
            other => panic!("expected query, got {:?}", other),
        }

        let cancel: ClientInput = serde_json::from_str(r#"{"type": "cancel"}"#).unwrap();
        assert_eq!(cancel, ClientInput::Cancel { session_id: None });
    }
}
