//! A backend that replays scripted turns.
//!
//! Each invocation consumes the next turn of the script. Turns either stream
//! a list of steps (as the events a live backend would emit), stream raw
//! events, or fail. Every request is recorded so callers can inspect exactly
//! what was sent.

use std::collections::VecDeque;
use std::time::Duration;

use async_stream::stream;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::backend::{Backend, BackendRequest, BackendRun, Step};
use crate::error::{Error, Result};
use crate::stream::{BackendEvent, BackendEventStream, StepBuilder, step_events};
use crate::types::ToolDefinition;

/// Reply used once the script runs out
const EXHAUSTED_REPLY: &str = "(no scripted reply)";

/// How a scripted failure should surface
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    #[default]
    Api,
    ContextOverflow,
    RateLimit,
    Auth,
    Timeout,
}

/// One scripted backend invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScriptedTurn {
    /// Stream these steps, then complete with them
    Steps { steps: Vec<Step> },
    /// Stream these events verbatim; steps are rebuilt from them
    Events { events: Vec<BackendEvent> },
    /// Fail with the given message
    Fail {
        message: String,
        #[serde(default)]
        failure: FailureKind,
        /// Fail from inside the event stream rather than when invoked
        #[serde(default)]
        during_stream: bool,
    },
}

impl ScriptedTurn {
    /// A turn replying with plain text
    pub fn text(text: impl Into<String>) -> Self {
        Self::Steps {
            steps: vec![Step::text(text)],
        }
    }

    /// A turn failing when invoked
    pub fn fail(failure: FailureKind, message: impl Into<String>) -> Self {
        Self::Fail {
            message: message.into(),
            failure,
            during_stream: false,
        }
    }
}

fn failure_error(failure: FailureKind, message: String) -> Error {
    match failure {
        FailureKind::Api => Error::api("api_error", message),
        FailureKind::ContextOverflow => Error::ContextOverflow(message),
        FailureKind::RateLimit => Error::RateLimited { retry_after: None },
        FailureKind::Auth => Error::Auth(message),
        FailureKind::Timeout => Error::Timeout(message),
    }
}

/// A script file: the tools to advertise and the turns to replay
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Script {
    pub tools: Vec<ToolDefinition>,
    pub turns: Vec<ScriptedTurn>,
    /// Delay between streamed events, in milliseconds
    pub event_delay_ms: Option<u64>,
}

impl Script {
    /// Parse a script from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Backend replaying a fixed script
pub struct ScriptedBackend {
    turns: Mutex<VecDeque<ScriptedTurn>>,
    requests: Mutex<Vec<BackendRequest>>,
    event_delay: Option<Duration>,
}

impl ScriptedBackend {
    /// Create a backend replaying the given turns in order
    pub fn new(turns: impl IntoIterator<Item = ScriptedTurn>) -> Self {
        Self {
            turns: Mutex::new(turns.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
            event_delay: None,
        }
    }

    /// Create a backend from a parsed script
    pub fn from_script(script: &Script) -> Self {
        let backend = Self::new(script.turns.iter().cloned());
        match script.event_delay_ms {
            Some(ms) => backend.with_event_delay(Duration::from_millis(ms)),
            None => backend,
        }
    }

    /// Sleep this long before each streamed event
    pub fn with_event_delay(mut self, delay: Duration) -> Self {
        self.event_delay = Some(delay);
        self
    }

    /// Append a turn to the end of the script
    pub fn push_turn(&self, turn: ScriptedTurn) {
        self.turns.lock().push_back(turn);
    }

    /// Number of turns not yet consumed
    pub fn remaining(&self) -> usize {
        self.turns.lock().len()
    }

    /// Every request received so far
    pub fn requests(&self) -> Vec<BackendRequest> {
        self.requests.lock().clone()
    }

    fn event_stream(
        &self,
        events: Vec<BackendEvent>,
        failure: Option<Error>,
        request: &BackendRequest,
    ) -> BackendEventStream {
        let delay = self.event_delay;
        let cancel = request.cancel.clone();
        Box::pin(stream! {
            for event in events {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                if cancel.is_cancelled() {
                    return;
                }
                yield Ok(event);
            }
            if let Some(error) = failure {
                yield Err(error);
            }
        })
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    async fn invoke(&self, request: BackendRequest) -> Result<BackendRun> {
        self.requests.lock().push(request.clone());
        let turn = self
            .turns
            .lock()
            .pop_front()
            .unwrap_or_else(|| ScriptedTurn::text(EXHAUSTED_REPLY));

        tracing::debug!(remaining = self.remaining(), "replaying scripted turn");

        match turn {
            ScriptedTurn::Steps { steps } => {
                let events = self.event_stream(step_events(&steps), None, &request);
                Ok(BackendRun::ready(events, steps))
            }
            ScriptedTurn::Events { events } => {
                let mut builder = StepBuilder::new();
                for event in &events {
                    builder.process_event(event);
                }
                let events = self.event_stream(events, None, &request);
                Ok(BackendRun::ready(events, builder.build()))
            }
            ScriptedTurn::Fail {
                message,
                failure,
                during_stream,
            } => {
                let error = failure_error(failure, message);
                if !during_stream {
                    return Err(error);
                }
                let events = self.event_stream(vec![], Some(error), &request);
                Ok(BackendRun::ready(events, vec![]))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendInput;
    use futures::StreamExt;
    use tokio_util::sync::CancellationToken;

    fn request() -> BackendRequest {
        BackendRequest {
            input: BackendInput::Prompt("hi".into()),
            tools: vec![],
            max_steps: 5,
            cancel: CancellationToken::new(),
        }
    }

    async fn collect(run: BackendRun) -> Vec<Result<BackendEvent>> {
        run.events.collect().await
    }

    #[tokio::test]
    async fn test_replays_turns_in_order() {
        let backend = ScriptedBackend::new([ScriptedTurn::text("one"), ScriptedTurn::text("two")]);

        let first = collect(backend.invoke(request()).await.unwrap()).await;
        assert!(matches!(&first[0], Ok(BackendEvent::TextDelta { text }) if text == "one"));

        let second = collect(backend.invoke(request()).await.unwrap()).await;
        assert!(matches!(&second[0], Ok(BackendEvent::TextDelta { text }) if text == "two"));

        assert_eq!(backend.requests().len(), 2);
        assert_eq!(backend.remaining(), 0);
    }

    #[tokio::test]
    async fn test_pushed_turn_is_replayed() {
        let backend = ScriptedBackend::new([]);
        backend.push_turn(ScriptedTurn::text("queued"));
        assert_eq!(backend.remaining(), 1);

        let events = collect(backend.invoke(request()).await.unwrap()).await;
        assert!(matches!(&events[0], Ok(BackendEvent::TextDelta { text }) if text == "queued"));
        assert_eq!(backend.remaining(), 0);
    }

    #[tokio::test]
    async fn test_exhausted_script_replies_with_text() {
        let backend = ScriptedBackend::new([]);
        let run = backend.invoke(request()).await.unwrap();
        let output = run.completion.await.unwrap();
        let steps = output.steps.unwrap().resolve().await.unwrap();
        assert_eq!(steps, vec![Step::text(EXHAUSTED_REPLY)]);
    }

    #[tokio::test]
    async fn test_fail_at_invoke() {
        let backend =
            ScriptedBackend::new([ScriptedTurn::fail(FailureKind::ContextOverflow, "prompt is too long")]);
        let err = backend.invoke(request()).await.err().unwrap();
        assert!(err.is_context_overflow());
    }

    #[tokio::test]
    async fn test_fail_during_stream() {
        let backend = ScriptedBackend::new([ScriptedTurn::Fail {
            message: "boom".into(),
            failure: FailureKind::Api,
            during_stream: true,
        }]);
        let events = collect(backend.invoke(request()).await.unwrap()).await;
        assert_eq!(events.len(), 1);
        assert!(events[0].is_err());
    }

    #[tokio::test]
    async fn test_stream_stops_when_cancelled() {
        let backend = ScriptedBackend::new([ScriptedTurn::text("ignored")]);
        let req = request();
        req.cancel.cancel();
        let events = collect(backend.invoke(req).await.unwrap()).await;
        assert!(events.is_empty());
    }

    #[test]
    fn test_script_from_json() {
        let script = Script::from_json(
            r#"{
                "tools": [{"name": "bash", "description": "Run a command", "parameters": {"type": "object"}}],
                "turns": [
                    {"kind": "steps", "steps": [{"text": "hello"}]},
                    {"kind": "fail", "message": "prompt is too long", "failure": "context_overflow"}
                ],
                "event_delay_ms": 5
            }"#,
        )
        .unwrap();
        assert_eq!(script.tools[0].name, "bash");
        assert_eq!(script.turns.len(), 2);
        assert_eq!(script.event_delay_ms, Some(5));
        assert_eq!(ScriptedBackend::from_script(&script).remaining(), 2);
    }
}
