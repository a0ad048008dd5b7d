//! Turning finished backend steps into conversation messages

use relay_ai::{Content, Message, Step, Steps, ToolResultPart};

use crate::error::Result;

/// Convert a run's steps into the messages to append to history.
///
/// Pending steps are awaited first; absent steps yield no messages.
pub async fn extract_messages(steps: Option<Steps>) -> Result<Vec<Message>> {
    let steps = match steps {
        Some(steps) => steps.resolve().await?,
        None => vec![],
    };
    Ok(messages_from_steps(&steps))
}

/// Convert steps into messages: per step, at most one assistant message
/// followed by at most one tool message.
pub fn messages_from_steps(steps: &[Step]) -> Vec<Message> {
    let mut messages = vec![];

    for step in steps {
        if !step.tool_calls.is_empty() {
            let mut parts = Vec::with_capacity(step.tool_calls.len() + 1);
            if !step.text.is_empty() {
                parts.push(Content::text(step.text.clone()));
            }
            parts.extend(step.tool_calls.iter().map(|call| {
                Content::tool_call(
                    call.tool_call_id.clone(),
                    call.tool_name.clone(),
                    call.input.clone(),
                )
            }));
            messages.push(Message::assistant_parts(parts));
        } else if !step.text.is_empty() {
            messages.push(Message::assistant_text(step.text.clone()));
        }

        if !step.tool_results.is_empty() {
            messages.push(Message::tool_results(
                step.tool_results
                    .iter()
                    .map(|r| {
                        ToolResultPart::new(
                            r.tool_call_id.clone(),
                            r.tool_name.clone(),
                            r.output.clone(),
                        )
                    })
                    .collect(),
            ));
        }
    }

    messages
}
