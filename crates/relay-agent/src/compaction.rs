//! Context compaction for long conversations
//!
//! When a conversation grows too large for the model's context window, the
//! middle of it is stripped down to its text and messages left with nothing
//! are dropped. The first and last messages are kept exactly as they were.

use relay_ai::{Content, Message, WireContent, WireMessage, WirePart, from_wire, to_wire};
use serde::{Deserialize, Serialize};

/// How much of a conversation survives compaction untouched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompactionOptions {
    /// Messages kept verbatim at the start
    pub keep_first: usize,
    /// Messages kept verbatim at the end
    pub keep_last: usize,
}

impl Default for CompactionOptions {
    fn default() -> Self {
        Self {
            keep_first: 2,
            keep_last: 6,
        }
    }
}

impl CompactionOptions {
    /// Histories at or below this length are never compacted
    pub fn threshold(&self) -> usize {
        self.keep_first.saturating_add(self.keep_last)
    }
}

// --- Token Estimation ---

/// Estimate token count for a single message (chars/4 heuristic)
pub fn estimate_tokens(message: &Message) -> u32 {
    let char_count: usize = match message {
        Message::User { content } => content.len(),
        Message::Assistant { content } => content
            .to_parts()
            .iter()
            .map(|c| match c {
                Content::Text { text } => text.len(),
                Content::ToolCall { tool_name, args, .. } => {
                    tool_name.len() + serde_json::to_string(args).unwrap_or_default().len()
                }
            })
            .sum(),
        Message::Tool { content } => content
            .iter()
            .map(|r| serde_json::to_string(&r.result).unwrap_or_default().len())
            .sum(),
    };
    (char_count / 4) as u32
}

/// Estimate total tokens for a slice of messages
pub fn estimate_total_tokens(messages: &[Message]) -> u32 {
    messages.iter().map(estimate_tokens).sum()
}

// --- Compaction ---

/// Shrink a history by pruning everything between its head and tail.
///
/// Boundaries move so that tool results are never separated from their
/// calls: tool messages right after the head join the head, and a tail that
/// starts with tool messages reaches back to the message that made the calls.
pub fn compact(messages: &[Message], options: &CompactionOptions) -> Vec<Message> {
    if messages.len() <= options.threshold() {
        return messages.to_vec();
    }

    let Some((head_end, tail_start)) = boundaries(messages, options) else {
        return messages.to_vec();
    };

    let middle = prune(&to_wire(&messages[head_end..tail_start]));

    let mut compacted = Vec::with_capacity(head_end + middle.len() + messages.len() - tail_start);
    compacted.extend_from_slice(&messages[..head_end]);
    compacted.extend(from_wire(&middle));
    compacted.extend_from_slice(&messages[tail_start..]);
    compacted
}

/// Head end and tail start, or `None` when nothing lies between them
fn boundaries(messages: &[Message], options: &CompactionOptions) -> Option<(usize, usize)> {
    let len = messages.len();

    let mut head_end = options.keep_first.min(len);
    while head_end < len && matches!(messages[head_end], Message::Tool { .. }) {
        head_end += 1;
    }

    let mut tail_start = len.saturating_sub(options.keep_last);
    while tail_start > head_end
        && tail_start < len
        && matches!(messages[tail_start], Message::Tool { .. })
    {
        tail_start -= 1;
    }

    (tail_start > head_end).then_some((head_end, tail_start))
}

/// Keep only the text of each message and drop messages left empty
fn prune(messages: &[WireMessage]) -> Vec<WireMessage> {
    messages
        .iter()
        .filter_map(|message| {
            let content = match message.content() {
                WireContent::Parts(parts) => WireContent::Parts(
                    parts
                        .iter()
                        .filter(|p| matches!(p, WirePart::Text { text } if !text.is_empty()))
                        .cloned()
                        .collect(),
                ),
                other => other.clone(),
            };
            (!content.is_empty()).then(|| message.with_content(content))
        })
        .collect()
}

/// What a compaction did, for the client notice and logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactionReport {
    pub messages_before: usize,
    pub messages_after: usize,
    pub tokens_before: u32,
    pub tokens_after: u32,
}

impl CompactionReport {
    pub fn new(before: &[Message], after: &[Message]) -> Self {
        Self {
            messages_before: before.len(),
            messages_after: after.len(),
            tokens_before: estimate_total_tokens(before),
            tokens_after: estimate_total_tokens(after),
        }
    }

    /// Whether the history actually got shorter
    pub fn shrank(&self) -> bool {
        self.messages_after < self.messages_before
    }

    /// Notice shown to the user
    pub fn describe(&self) -> String {
        format!(
            "Context limit reached. Compacted conversation from {} to {} messages and retrying.",
            self.messages_before, self.messages_after
        )
    }
}
