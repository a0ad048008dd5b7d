//! Model backend contract

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::stream::BackendEventStream;
use crate::types::ToolSet;
use crate::wire::WireMessage;

/// What the backend is asked to continue from
#[derive(Debug, Clone, PartialEq)]
pub enum BackendInput {
    /// Prior conversation, already ending with the new user message
    History(Vec<WireMessage>),
    /// A single user prompt with no prior conversation
    Prompt(String),
}

impl BackendInput {
    /// The full message list this input stands for
    pub fn into_messages(self) -> Vec<WireMessage> {
        match self {
            Self::History(messages) => messages,
            Self::Prompt(prompt) => vec![WireMessage::user(prompt)],
        }
    }
}

/// A single backend invocation
#[derive(Debug, Clone)]
pub struct BackendRequest {
    pub input: BackendInput,
    pub tools: ToolSet,
    /// Upper bound on model/tool round trips within this invocation
    pub max_steps: u32,
    pub cancel: CancellationToken,
}

/// A tool call made during a step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepToolCall {
    pub tool_call_id: String,
    pub tool_name: String,
    pub input: serde_json::Value,
}

/// A tool result produced during a step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepToolResult {
    pub tool_call_id: String,
    pub tool_name: String,
    pub output: serde_json::Value,
}

/// One model call and the tool executions it triggered
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Step {
    pub text: String,
    pub tool_calls: Vec<StepToolCall>,
    pub tool_results: Vec<StepToolResult>,
}

impl Step {
    /// A step that only produced text
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    /// Whether the step produced nothing
    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.tool_calls.is_empty() && self.tool_results.is_empty()
    }
}

/// Steps of a finished run, available now or computed asynchronously
pub enum Steps {
    Ready(Vec<Step>),
    Pending(BoxFuture<'static, Result<Vec<Step>>>),
}

impl Steps {
    /// Wait for the steps if they are still being computed
    pub async fn resolve(self) -> Result<Vec<Step>> {
        match self {
            Self::Ready(steps) => Ok(steps),
            Self::Pending(fut) => fut.await,
        }
    }
}

impl std::fmt::Debug for Steps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ready(steps) => f.debug_tuple("Ready").field(steps).finish(),
            Self::Pending(_) => f.write_str("Pending"),
        }
    }
}

/// Final result of a run
#[derive(Debug, Default)]
pub struct BackendOutput {
    /// Absent when the backend reports no step data
    pub steps: Option<Steps>,
}

/// A started backend run: live events plus the eventual completion
pub struct BackendRun {
    pub events: BackendEventStream,
    pub completion: BoxFuture<'static, Result<BackendOutput>>,
}

impl BackendRun {
    /// A run whose completion is immediately available
    pub fn ready(events: BackendEventStream, steps: Vec<Step>) -> Self {
        Self {
            events,
            completion: Box::pin(async move {
                Ok(BackendOutput {
                    steps: Some(Steps::Ready(steps)),
                })
            }),
        }
    }
}

/// A language model backend that can run a multi-step tool loop
#[async_trait]
pub trait Backend: Send + Sync {
    /// Start a run. Errors returned here mean the run never started.
    async fn invoke(&self, request: BackendRequest) -> Result<BackendRun>;
}
