//! Forwarding backend events to the client as they arrive

use futures::StreamExt;
use relay_ai::{BackendEvent, BackendEventStream};
use tokio_util::sync::CancellationToken;

use crate::channel::ClientChannel;
use crate::error::Result;
use crate::events::{ClientEvent, EventKind};

/// Chunk sent between text blocks of different steps
pub const PARAGRAPH_SEPARATOR: &str = "\n\n";

/// How a relayed stream ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayEnd {
    /// The backend finished streaming
    Finished,
    /// Cancellation was observed; remaining events were not read
    Cancelled,
}

/// Translates backend events into client notifications for one session
pub struct EventRelay<'a> {
    session_id: &'a str,
    channel: &'a dyn ClientChannel,
    report_tools: &'a [String],
    /// The last text block ended; the next non-blank text needs a separator
    text_ended: bool,
}

impl<'a> EventRelay<'a> {
    pub fn new(session_id: &'a str, channel: &'a dyn ClientChannel, report_tools: &'a [String]) -> Self {
        Self {
            session_id,
            channel,
            report_tools,
            text_ended: false,
        }
    }

    /// Relay every event until the stream ends or `cancel` fires.
    ///
    /// A stream error ends the relay and is returned.
    pub async fn run(&mut self, mut events: BackendEventStream, cancel: &CancellationToken) -> Result<RelayEnd> {
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                event = events.next() => Some(event),
            };

            match next {
                None => {
                    tracing::debug!(session_id = %self.session_id, "cancellation observed, stopping relay");
                    return Ok(RelayEnd::Cancelled);
                }
                Some(None) => return Ok(RelayEnd::Finished),
                Some(Some(Ok(event))) => self.dispatch(event),
                Some(Some(Err(e))) => return Err(e.into()),
            }
        }
    }

    /// Handle a single backend event
    pub fn dispatch(&mut self, event: BackendEvent) {
        match event {
            BackendEvent::TextDelta { text } => {
                if self.text_ended && !text.trim().is_empty() {
                    self.emit(EventKind::Text {
                        content: PARAGRAPH_SEPARATOR.to_string(),
                    });
                    self.text_ended = false;
                }
                self.emit(EventKind::Text { content: text });
            }
            BackendEvent::TextEnd => {
                self.text_ended = true;
            }
            BackendEvent::ToolCall {
                tool_call_id,
                tool_name,
                input,
            } => {
                tracing::debug!(session_id = %self.session_id, %tool_name, %tool_call_id, "tool call");
                self.emit(EventKind::ToolCall {
                    tool_call_id,
                    tool_name,
                    args: input,
                });
            }
            BackendEvent::ToolResult {
                tool_call_id,
                tool_name,
                output,
            } => {
                let report = self
                    .report_tools
                    .contains(&tool_name)
                    .then(|| (tool_call_id.clone(), output.clone()));
                self.emit(EventKind::ToolResult {
                    tool_call_id,
                    tool_name,
                    result: output,
                    is_error: false,
                });
                if let Some((tool_call_id, report)) = report {
                    self.emit(EventKind::Report { tool_call_id, report });
                }
            }
            BackendEvent::ToolError {
                tool_call_id,
                tool_name,
                error,
            } => {
                tracing::debug!(session_id = %self.session_id, %tool_name, %tool_call_id, "tool failed");
                self.emit(EventKind::ToolResult {
                    tool_call_id,
                    tool_name,
                    result: error,
                    is_error: true,
                });
            }
            BackendEvent::ReasoningDelta { .. } | BackendEvent::StepFinish | BackendEvent::Unknown => {}
        }
    }

    fn emit(&self, kind: EventKind) {
        self.channel.send(ClientEvent::new(self.session_id, kind));
    }
}
