//! Backend streaming event types and utilities

use crate::backend::{Step, StepToolCall, StepToolResult};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tokio_stream::Stream;

/// Incremental events emitted by a model backend while it works
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum BackendEvent {
    /// Text content delta
    TextDelta { text: String },
    /// The current text block ended
    TextEnd,
    /// Reasoning content delta
    ReasoningDelta { text: String },
    /// The model decided to call a tool; emitted before the tool runs
    ToolCall {
        tool_call_id: String,
        tool_name: String,
        input: serde_json::Value,
    },
    /// A tool finished
    ToolResult {
        tool_call_id: String,
        tool_name: String,
        output: serde_json::Value,
    },
    /// A tool failed
    ToolError {
        tool_call_id: String,
        tool_name: String,
        error: serde_json::Value,
    },
    /// A step (one model call plus its tool executions) completed
    StepFinish,
    /// Any event kind this crate does not know about
    #[serde(other)]
    Unknown,
}

/// A stream of backend events. An `Err` item ends the run.
pub type BackendEventStream = Pin<Box<dyn Stream<Item = Result<BackendEvent>> + Send>>;

/// Expand steps into the event sequence a backend would have streamed
pub fn step_events(steps: &[Step]) -> Vec<BackendEvent> {
    let mut events = vec![];
    for step in steps {
        if !step.text.is_empty() {
            events.push(BackendEvent::TextDelta {
                text: step.text.clone(),
            });
            events.push(BackendEvent::TextEnd);
        }
        for call in &step.tool_calls {
            events.push(BackendEvent::ToolCall {
                tool_call_id: call.tool_call_id.clone(),
                tool_name: call.tool_name.clone(),
                input: call.input.clone(),
            });
        }
        for result in &step.tool_results {
            events.push(BackendEvent::ToolResult {
                tool_call_id: result.tool_call_id.clone(),
                tool_name: result.tool_name.clone(),
                output: result.output.clone(),
            });
        }
        events.push(BackendEvent::StepFinish);
    }
    events
}

/// Builder for reconstructing steps from streamed events
#[derive(Debug, Default)]
pub struct StepBuilder {
    steps: Vec<Step>,
    current: Step,
}

impl StepBuilder {
    /// Create a new step builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Process a streaming event and update the step state
    pub fn process_event(&mut self, event: &BackendEvent) {
        match event {
            BackendEvent::TextDelta { text } => {
                self.current.text.push_str(text);
            }
            BackendEvent::ToolCall {
                tool_call_id,
                tool_name,
                input,
            } => {
                self.current.tool_calls.push(StepToolCall {
                    tool_call_id: tool_call_id.clone(),
                    tool_name: tool_name.clone(),
                    input: input.clone(),
                });
            }
            BackendEvent::ToolResult {
                tool_call_id,
                tool_name,
                output,
            } => {
                self.current.tool_results.push(StepToolResult {
                    tool_call_id: tool_call_id.clone(),
                    tool_name: tool_name.clone(),
                    output: output.clone(),
                });
            }
            BackendEvent::ToolError {
                tool_call_id,
                tool_name,
                error,
            } => {
                self.current.tool_results.push(StepToolResult {
                    tool_call_id: tool_call_id.clone(),
                    tool_name: tool_name.clone(),
                    output: error.clone(),
                });
            }
            BackendEvent::StepFinish => {
                let step = std::mem::take(&mut self.current);
                self.steps.push(step);
            }
            _ => {}
        }
    }

    /// Build the final step list; a trailing unfinished step is kept if it has content
    pub fn build(mut self) -> Vec<Step> {
        if !self.current.is_empty() {
            self.steps.push(self.current);
        }
        self.steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unknown_event_kind_deserializes() {
        let event: BackendEvent =
            serde_json::from_value(json!({"type": "source", "url": "https://x"})).unwrap();
        assert_eq!(event, BackendEvent::Unknown);
    }

    #[test]
    fn test_event_wire_shape() {
        let event = BackendEvent::ToolCall {
            tool_call_id: "c1".into(),
            tool_name: "bash".into(),
            input: json!({"command": "ls"}),
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"type": "tool-call", "toolCallId": "c1", "toolName": "bash", "input": {"command": "ls"}})
        );
    }

    #[test]
    fn test_builder_reassembles_steps() {
        let steps = vec![
            Step {
                text: "looking".into(),
                tool_calls: vec![StepToolCall {
                    tool_call_id: "c1".into(),
                    tool_name: "bash".into(),
                    input: json!({}),
                }],
                tool_results: vec![StepToolResult {
                    tool_call_id: "c1".into(),
                    tool_name: "bash".into(),
                    output: json!("ok"),
                }],
            },
            Step::text("done"),
        ];

        let mut builder = StepBuilder::new();
        for event in step_events(&steps) {
            builder.process_event(&event);
        }
        assert_eq!(builder.build(), steps);
    }

    #[test]
    fn test_builder_keeps_unfinished_step() {
        let mut builder = StepBuilder::new();
        builder.process_event(&BackendEvent::TextDelta { text: "par".into() });
        builder.process_event(&BackendEvent::TextDelta { text: "tial".into() });
        assert_eq!(builder.build(), vec![Step::text("partial")]);
    }

    #[test]
    fn test_builder_records_tool_errors_as_results() {
        let mut builder = StepBuilder::new();
        builder.process_event(&BackendEvent::ToolError {
            tool_call_id: "c9".into(),
            tool_name: "fetch".into(),
            error: json!("404"),
        });
        let steps = builder.build();
        assert_eq!(steps[0].tool_results[0].output, json!("404"));
    }
}
