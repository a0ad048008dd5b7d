//! Validation of client-supplied conversation history
//!
//! Clients may send the history a query should continue from. It arrives as
//! untyped JSON, so each entry's `role` is checked against the roles the
//! message model knows before the entry is decoded. Entries that fail either
//! check are skipped.

use relay_ai::Message;
use serde_json::Value;

const KNOWN_ROLES: &[&str] = &["user", "assistant", "tool"];

/// Decode external history, keeping only well-formed messages
pub fn parse_external_history(entries: &[Value]) -> Vec<Message> {
    entries
        .iter()
        .enumerate()
        .filter_map(|(index, entry)| parse_entry(index, entry))
        .collect()
}

fn parse_entry(index: usize, entry: &Value) -> Option<Message> {
    let role = entry.get("role").and_then(Value::as_str);
    match role {
        Some(role) if KNOWN_ROLES.contains(&role) => {}
        _ => {
            tracing::warn!(index, ?role, "skipping history entry with unknown role");
            return None;
        }
    }

    match serde_json::from_value(entry.clone()) {
        Ok(message) => Some(message),
        Err(e) => {
            tracing::warn!(index, error = %e, "skipping malformed history entry");
            None
        }
    }
}
