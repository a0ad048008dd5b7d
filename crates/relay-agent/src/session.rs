//! Per-session query execution
//!
//! A session runs at most one query at a time. Each query streams backend
//! events to the client as they arrive, appends the finished exchange to the
//! session's history, and recovers once from a token-limit failure by
//! compacting the history and retrying.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use relay_ai::{Backend, BackendInput, BackendRequest, Message, ToolSet, WireMessage, to_wire};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::{
    channel::ClientChannel,
    classify::{FailureClassifier, FailureKind},
    compaction::{CompactionOptions, CompactionReport, compact},
    error::{Error, Result},
    events::{ClientEvent, EventKind},
    extract::extract_messages,
    handle::SessionHandle,
    history::parse_external_history,
    relay::{EventRelay, RelayEnd},
    tools::ToolSource,
    truncation::{REPORT_TOOL_NAME, truncate_heavy_tool_calls},
};

/// Message sent when a query arrives while another is running
pub const ALREADY_RUNNING: &str = "A query is already running";

/// Session configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Upper bound on model/tool round trips per backend invocation
    pub max_steps: u32,
    /// What survives compaction after a token-limit failure
    pub compaction: CompactionOptions,
    /// Tools whose call payloads are trimmed from history and whose results
    /// are also delivered as reports
    pub heavy_tools: Vec<String>,
    /// Extra regexes identifying token-limit failures
    pub token_limit_patterns: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_steps: 20,
            compaction: CompactionOptions::default(),
            heavy_tools: vec![REPORT_TOOL_NAME.to_string()],
            token_limit_patterns: vec![],
        }
    }
}

/// A query to run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryRequest {
    pub content: String,
    /// Session id to tag client events with; defaults to the session's own id
    pub session_id: Option<String>,
    /// Caller-owned history to continue from instead of the session's own
    pub history: Option<Vec<serde_json::Value>>,
}

impl QueryRequest {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    /// Continue from caller-supplied history; the session's own history is left alone
    pub fn with_history(mut self, history: Vec<serde_json::Value>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

/// How a query ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOutcome {
    /// Finished normally; `Done` was sent
    Completed,
    /// Stopped by `cancel()`; `Done` was sent
    Cancelled,
    /// Failed; `Error` was sent
    Failed,
    /// Another query was running; nothing was executed
    Rejected,
}

/// Execution state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Executing,
    /// Compacting after a token-limit failure, before the retry starts
    Retrying,
}

enum AttemptEnd {
    Completed(Vec<Message>),
    Cancelled,
}

/// A conversation with the backend on behalf of one client
pub struct Session {
    id: String,
    created_at: DateTime<Utc>,
    config: SessionConfig,
    backend: Arc<dyn Backend>,
    tools: Arc<dyn ToolSource>,
    channel: Arc<dyn ClientChannel>,
    classifier: FailureClassifier,
    history: Mutex<Vec<Message>>,
    handle: SessionHandle,
}

impl Session {
    /// Create a session with a fresh id
    pub fn new(
        config: SessionConfig,
        backend: Arc<dyn Backend>,
        tools: Arc<dyn ToolSource>,
        channel: Arc<dyn ClientChannel>,
    ) -> Self {
        let classifier = FailureClassifier::with_patterns(&config.token_limit_patterns);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            config,
            backend,
            tools,
            channel,
            classifier,
            history: Mutex::new(Vec::new()),
            handle: SessionHandle::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Snapshot of the session-owned history
    pub fn history(&self) -> Vec<Message> {
        self.history.lock().clone()
    }

    /// Replace the session-owned history
    pub fn set_history(&self, messages: Vec<Message>) {
        *self.history.lock() = messages;
    }

    pub fn clear_history(&self) {
        self.history.lock().clear();
    }

    /// Get a cloneable handle for cancelling or waiting on this session
    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    pub fn state(&self) -> SessionState {
        if !self.handle.is_running() {
            SessionState::Idle
        } else if self.handle.is_retrying() {
            SessionState::Retrying
        } else {
            SessionState::Executing
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_running()
    }

    /// Cancel the running query, if any. The client still receives `Done`.
    pub fn cancel(&self) {
        self.handle.abort();
    }

    /// Wait until no query is running
    pub async fn wait_for_idle(&self) {
        self.handle.wait_for_idle().await;
    }

    /// Run a query to completion, streaming its events to the client.
    ///
    /// Every call that is not rejected ends with exactly one `Done` or one
    /// `Error` event.
    pub async fn execute_query(&self, request: QueryRequest) -> QueryOutcome {
        let event_session = request.session_id.clone().unwrap_or_else(|| self.id.clone());

        let Some(guard) = self.handle.try_begin() else {
            tracing::warn!(session_id = %self.id, "rejecting query, another is running");
            self.emit(
                &event_session,
                EventKind::Error {
                    message: ALREADY_RUNNING.to_string(),
                },
            );
            return QueryOutcome::Rejected;
        };
        let cancel = guard.token();

        let (mut history, owned) = match &request.history {
            Some(entries) => (parse_external_history(entries), false),
            None => (self.history(), true),
        };

        tracing::debug!(
            session_id = %self.id,
            history_len = history.len(),
            external_history = !owned,
            "executing query"
        );

        let tools = match self.tools.tool_set().await {
            Ok(tools) => tools,
            Err(e) => {
                let error = match e {
                    Error::ToolInit(_) => e,
                    other => Error::ToolInit(other.to_string()),
                };
                return self.fail(&event_session, FailureKind::ToolInit, &error);
            }
        };

        let mut retried = false;
        loop {
            let result = self
                .attempt(&event_session, &history, &request.content, &tools, &cancel)
                .await;

            let error = match result {
                Ok(AttemptEnd::Completed(messages)) => {
                    if owned {
                        let mut stored = self.history.lock();
                        stored.push(Message::user(request.content.clone()));
                        stored.extend(messages);
                    }
                    tracing::debug!(session_id = %self.id, "query completed");
                    self.emit(&event_session, EventKind::Done);
                    return QueryOutcome::Completed;
                }
                Ok(AttemptEnd::Cancelled) => return self.cancelled(&event_session),
                Err(error) => error,
            };

            let kind = self.classifier.classify(&error);
            if kind == FailureKind::Cancelled || cancel.is_cancelled() {
                return self.cancelled(&event_session);
            }

            if kind.is_retryable() && !retried {
                retried = true;
                self.handle.set_retrying(true);

                let compacted = compact(&history, &self.config.compaction);
                let report = CompactionReport::new(&history, &compacted);
                tracing::info!(
                    session_id = %self.id,
                    messages_before = report.messages_before,
                    messages_after = report.messages_after,
                    tokens_before = report.tokens_before,
                    tokens_after = report.tokens_after,
                    "token limit hit, compacted history and retrying"
                );
                if !report.shrank() {
                    tracing::warn!(session_id = %self.id, "compaction did not shrink the history");
                }

                if owned {
                    self.set_history(compacted.clone());
                }
                history = compacted;

                self.emit(
                    &event_session,
                    EventKind::ContextCompacted {
                        message: report.describe(),
                        messages_before: report.messages_before,
                        messages_after: report.messages_after,
                    },
                );
                continue;
            }

            return self.fail(&event_session, kind, &error);
        }
    }

    /// One backend invocation with its events relayed to the client
    async fn attempt(
        &self,
        event_session: &str,
        history: &[Message],
        content: &str,
        tools: &ToolSet,
        cancel: &CancellationToken,
    ) -> Result<AttemptEnd> {
        if cancel.is_cancelled() {
            return Ok(AttemptEnd::Cancelled);
        }

        let request = BackendRequest {
            input: self.build_input(history, content),
            tools: tools.clone(),
            max_steps: self.config.max_steps,
            cancel: cancel.clone(),
        };
        let run = self.backend.invoke(request).await?;
        self.handle.set_retrying(false);

        let mut relay = EventRelay::new(event_session, self.channel.as_ref(), &self.config.heavy_tools);
        if relay.run(run.events, cancel).await? == RelayEnd::Cancelled {
            return Ok(AttemptEnd::Cancelled);
        }

        let output = run.completion.await?;
        let messages = extract_messages(output.steps).await?;
        Ok(AttemptEnd::Completed(messages))
    }

    fn build_input(&self, history: &[Message], content: &str) -> BackendInput {
        if history.is_empty() {
            return BackendInput::Prompt(content.to_string());
        }
        let mut messages = truncate_heavy_tool_calls(&to_wire(history), &self.config.heavy_tools);
        messages.push(WireMessage::user(content));
        BackendInput::History(messages)
    }

    fn cancelled(&self, event_session: &str) -> QueryOutcome {
        tracing::debug!(session_id = %self.id, "query cancelled");
        self.emit(event_session, EventKind::Done);
        QueryOutcome::Cancelled
    }

    fn fail(&self, event_session: &str, kind: FailureKind, error: &Error) -> QueryOutcome {
        tracing::warn!(session_id = %self.id, ?kind, error = %error, "query failed");
        self.emit(
            event_session,
            EventKind::Error {
                message: kind.describe(error),
            },
        );
        QueryOutcome::Failed
    }

    fn emit(&self, event_session: &str, kind: EventKind) {
        self.channel.send(ClientEvent::new(event_session, kind));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::StaticTools;
    use crate::truncation::REPORT_PLACEHOLDER;
    use async_trait::async_trait;
    use relay_ai::scripted::FailureKind as ScriptedFailure;
    use relay_ai::{
        Content, ScriptedBackend, ScriptedTurn, Step, StepToolCall, StepToolResult, ToolDefinition,
        ToolResultPart, WireContent, WirePart,
    };
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct Harness {
        session: Arc<Session>,
        backend: Arc<ScriptedBackend>,
        rx: mpsc::UnboundedReceiver<ClientEvent>,
    }

    impl Harness {
        fn new(backend: ScriptedBackend) -> Self {
            Self::with_tools(backend, Arc::new(StaticTools::default()))
        }

        fn with_tools(backend: ScriptedBackend, tools: Arc<dyn ToolSource>) -> Self {
            let backend = Arc::new(backend);
            let (tx, rx) = mpsc::unbounded_channel();
            let session = Arc::new(Session::new(
                SessionConfig::default(),
                backend.clone(),
                tools,
                Arc::new(tx),
            ));
            Self { session, backend, rx }
        }

        fn events(&mut self) -> Vec<EventKind> {
            let mut kinds = vec![];
            while let Ok(event) = self.rx.try_recv() {
                kinds.push(event.kind);
            }
            kinds
        }
    }

    fn terminal_count(events: &[EventKind]) -> usize {
        events
            .iter()
            .filter(|k| matches!(k, EventKind::Done | EventKind::Error { .. }))
            .count()
    }

    fn overflow() -> ScriptedTurn {
        ScriptedTurn::fail(ScriptedFailure::ContextOverflow, "prompt is too long: 210000 tokens > 200000")
    }

    fn tool_heavy_history(pairs: usize) -> Vec<Message> {
        let mut messages = vec![Message::user("analyze"), Message::assistant_text("on it")];
        for i in 0..pairs {
            let id = format!("c{}", i);
            messages.push(Message::assistant_parts(vec![Content::tool_call(
                &id,
                "bash",
                json!({"command": "cat spans.json"}),
            )]));
            messages.push(Message::tool_results(vec![ToolResultPart::new(&id, "bash", json!("...."))]));
        }
        messages.push(Message::user("summarize"));
        messages.push(Message::assistant_text("summary"));
        messages
    }

    struct FailingTools;

    #[async_trait]
    impl ToolSource for FailingTools {
        async fn tool_set(&self) -> Result<ToolSet> {
            Err(Error::ToolInit("data source unreachable".into()))
        }
    }

    #[tokio::test]
    async fn test_simple_query_streams_and_records_history() {
        let mut h = Harness::new(ScriptedBackend::new([ScriptedTurn::text("Hello there")]));

        let outcome = h.session.execute_query(QueryRequest::new("hi")).await;

        assert_eq!(outcome, QueryOutcome::Completed);
        assert_eq!(
            h.events(),
            vec![
                EventKind::Text {
                    content: "Hello there".into()
                },
                EventKind::Done
            ]
        );
        assert_eq!(
            h.session.history(),
            vec![Message::user("hi"), Message::assistant_text("Hello there")]
        );
        assert_eq!(h.session.state(), SessionState::Idle);

        let requests = h.backend.requests();
        assert_eq!(requests[0].input, BackendInput::Prompt("hi".into()));
        assert_eq!(requests[0].max_steps, 20);
    }

    #[tokio::test]
    async fn test_second_query_sends_history() {
        let mut h = Harness::new(ScriptedBackend::new([
            ScriptedTurn::text("first"),
            ScriptedTurn::text("second"),
        ]));

        h.session.execute_query(QueryRequest::new("one")).await;
        h.session.execute_query(QueryRequest::new("two")).await;

        let requests = h.backend.requests();
        assert_eq!(
            requests[1].input.clone().into_messages(),
            vec![
                WireMessage::user("one"),
                WireMessage::Assistant {
                    content: WireContent::Text("first".into())
                },
                WireMessage::user("two"),
            ]
        );
        assert_eq!(h.session.history().len(), 4);
        assert_eq!(terminal_count(&h.events()), 2);
    }

    #[tokio::test]
    async fn test_tool_call_precedes_result() {
        let step = Step {
            text: "Checking".into(),
            tool_calls: vec![StepToolCall {
                tool_call_id: "c1".into(),
                tool_name: "bash".into(),
                input: json!({"command": "uptime"}),
            }],
            tool_results: vec![StepToolResult {
                tool_call_id: "c1".into(),
                tool_name: "bash".into(),
                output: json!("up 3 days"),
            }],
        };
        let mut h = Harness::new(ScriptedBackend::new([ScriptedTurn::Steps {
            steps: vec![step, Step::text("Up three days.")],
        }]));

        h.session.execute_query(QueryRequest::new("uptime?")).await;
        let events = h.events();

        let call = events
            .iter()
            .position(|k| matches!(k, EventKind::ToolCall { tool_call_id, .. } if tool_call_id == "c1"))
            .unwrap();
        let result = events
            .iter()
            .position(|k| matches!(k, EventKind::ToolResult { tool_call_id, .. } if tool_call_id == "c1"))
            .unwrap();
        assert!(call < result);

        // second step's text is separated from the first
        assert!(events.contains(&EventKind::Text {
            content: "\n\n".into()
        }));

        let history = h.session.history();
        assert_eq!(history.len(), 4);
        assert_eq!(history[2].tool_result_parts()[0].tool_call_id, "c1");
    }

    #[tokio::test]
    async fn test_token_limit_compacts_and_retries_once() {
        let mut h = Harness::new(ScriptedBackend::new([overflow(), ScriptedTurn::text("recovered")]));
        h.session.set_history(tool_heavy_history(10));

        let outcome = h.session.execute_query(QueryRequest::new("and now?")).await;
        assert_eq!(outcome, QueryOutcome::Completed);

        let events = h.events();
        let compacted: Vec<_> = events
            .iter()
            .filter(|k| matches!(k, EventKind::ContextCompacted { .. }))
            .collect();
        assert_eq!(compacted.len(), 1);
        assert!(matches!(
            compacted[0],
            EventKind::ContextCompacted { messages_before: 24, messages_after, .. } if *messages_after < 24
        ));
        assert_eq!(events.last(), Some(&EventKind::Done));
        assert!(!events.iter().any(|k| matches!(k, EventKind::Error { .. })));
        assert_eq!(h.backend.requests().len(), 2);

        // compacted history was stored, then extended by the exchange
        let history = h.session.history();
        assert!(history.len() < 24);
        assert_eq!(history[history.len() - 1], Message::assistant_text("recovered"));
    }

    #[tokio::test]
    async fn test_second_token_limit_failure_is_reported() {
        let mut h = Harness::new(ScriptedBackend::new([overflow(), overflow()]));

        let outcome = h.session.execute_query(QueryRequest::new("big")).await;
        assert_eq!(outcome, QueryOutcome::Failed);

        let events = h.events();
        assert!(matches!(events[0], EventKind::ContextCompacted { .. }));
        assert!(matches!(&events[1], EventKind::Error { message } if message.contains("prompt is too long")));
        assert_eq!(events.len(), 2);
        assert_eq!(h.backend.requests().len(), 2);
        assert!(h.session.history().is_empty());
    }

    #[tokio::test]
    async fn test_other_failures_are_not_retried() {
        let mut h = Harness::new(ScriptedBackend::new([
            ScriptedTurn::fail(ScriptedFailure::RateLimit, "slow down"),
            ScriptedTurn::text("unused"),
        ]));

        let outcome = h.session.execute_query(QueryRequest::new("hi")).await;
        assert_eq!(outcome, QueryOutcome::Failed);

        let events = h.events();
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], EventKind::Error { message } if message.contains("rate limiting")));
        assert_eq!(h.backend.remaining(), 1);
    }

    #[tokio::test]
    async fn test_stream_failure_is_reported() {
        let mut h = Harness::new(ScriptedBackend::new([ScriptedTurn::Fail {
            message: "upstream reset".into(),
            failure: ScriptedFailure::Api,
            during_stream: true,
        }]));

        let outcome = h.session.execute_query(QueryRequest::new("hi")).await;
        assert_eq!(outcome, QueryOutcome::Failed);
        assert_eq!(terminal_count(&h.events()), 1);
        assert!(h.session.history().is_empty());
    }

    #[tokio::test]
    async fn test_tool_init_failure_skips_backend() {
        let mut h = Harness::with_tools(
            ScriptedBackend::new([ScriptedTurn::text("unused")]),
            Arc::new(FailingTools),
        );

        let outcome = h.session.execute_query(QueryRequest::new("hi")).await;
        assert_eq!(outcome, QueryOutcome::Failed);
        assert_eq!(
            h.events(),
            vec![EventKind::Error {
                message: "Tool initialization failed: data source unreachable".into()
            }]
        );
        assert!(h.backend.requests().is_empty());
        assert!(!h.session.is_running());
    }

    #[tokio::test]
    async fn test_concurrent_query_is_rejected() {
        let backend = ScriptedBackend::new([ScriptedTurn::text("slow answer")])
            .with_event_delay(Duration::from_millis(20));
        let mut h = Harness::new(backend);

        let (first, second) = tokio::join!(
            h.session.execute_query(QueryRequest::new("one")),
            h.session.execute_query(QueryRequest::new("two")),
        );

        assert_eq!(first, QueryOutcome::Completed);
        assert_eq!(second, QueryOutcome::Rejected);

        let events = h.events();
        assert_eq!(
            events[0],
            EventKind::Error {
                message: ALREADY_RUNNING.into()
            }
        );
        assert_eq!(events.last(), Some(&EventKind::Done));
        assert_eq!(h.backend.requests().len(), 1);
        assert_eq!(h.session.history()[0], Message::user("one"));
    }

    #[tokio::test]
    async fn test_cancel_stops_relay_and_still_sends_done() {
        let backend = ScriptedBackend::new([ScriptedTurn::Events {
            events: vec![
                relay_ai::BackendEvent::TextDelta { text: "one ".into() },
                relay_ai::BackendEvent::TextDelta { text: "two ".into() },
                relay_ai::BackendEvent::TextDelta { text: "three".into() },
            ],
        }])
        .with_event_delay(Duration::from_millis(50));
        let mut h = Harness::new(backend);

        let session = h.session.clone();
        let task = tokio::spawn(async move { session.execute_query(QueryRequest::new("count")).await });

        let first = h.rx.recv().await.unwrap();
        assert_eq!(first.kind, EventKind::Text { content: "one ".into() });
        h.session.cancel();

        assert_eq!(task.await.unwrap(), QueryOutcome::Cancelled);
        assert_eq!(h.events(), vec![EventKind::Done]);
        assert!(h.session.history().is_empty());
        assert_eq!(h.session.state(), SessionState::Idle);
        assert_eq!(h.backend.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_external_history_is_not_stored() {
        let mut h = Harness::new(ScriptedBackend::new([ScriptedTurn::text("from external")]));
        h.session.set_history(vec![Message::user("own")]);

        let request = QueryRequest::new("next").with_history(vec![
            json!({"role": "user", "content": "earlier"}),
            json!({"role": "system", "content": "dropped"}),
            json!({"role": "assistant", "content": "reply"}),
        ]);
        let outcome = h.session.execute_query(request).await;
        assert_eq!(outcome, QueryOutcome::Completed);

        assert_eq!(
            h.backend.requests()[0].input.clone().into_messages(),
            vec![
                WireMessage::user("earlier"),
                WireMessage::Assistant {
                    content: WireContent::Text("reply".into())
                },
                WireMessage::user("next"),
            ]
        );
        assert_eq!(h.session.history(), vec![Message::user("own")]);
        assert_eq!(terminal_count(&h.events()), 1);
    }

    #[tokio::test]
    async fn test_heavy_tool_payloads_are_not_resent() {
        let mut h = Harness::new(ScriptedBackend::new([ScriptedTurn::text("updated")]));
        h.session.set_history(vec![
            Message::user("make a report"),
            Message::assistant_parts(vec![Content::tool_call(
                "r1",
                REPORT_TOOL_NAME,
                json!({"title": "Span Analysis", "content": "x".repeat(10_000)}),
            )]),
            Message::tool_results(vec![ToolResultPart::new("r1", REPORT_TOOL_NAME, json!({"id": "rep-1"}))]),
        ]);

        h.session.execute_query(QueryRequest::new("update the report")).await;

        let sent = h.backend.requests()[0].input.clone().into_messages();
        let WireMessage::Assistant {
            content: WireContent::Parts(parts),
        } = &sent[1]
        else {
            panic!("expected assistant parts");
        };
        assert!(matches!(
            &parts[0],
            WirePart::ToolCall { input, .. }
                if *input == json!({"title": "Span Analysis", "content": REPORT_PLACEHOLDER})
        ));

        // stored history keeps the full payload
        assert_eq!(h.session.history()[1].tool_calls()[0].2["content"].as_str().unwrap().len(), 10_000);
        h.events();
    }

    #[tokio::test]
    async fn test_events_carry_requested_session_id() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let session = Session::new(
            SessionConfig::default(),
            Arc::new(ScriptedBackend::new([ScriptedTurn::text("ok")])),
            Arc::new(StaticTools::default().with_tool(ToolDefinition::new(
                "bash",
                "Run a command",
                json!({"type": "object"}),
            ))),
            Arc::new(tx),
        );

        session
            .execute_query(QueryRequest::new("hi").with_session_id("client-7"))
            .await;
        while let Ok(event) = rx.try_recv() {
            assert_eq!(event.session_id, "client-7");
        }

        session.execute_query(QueryRequest::new("again")).await;
        while let Ok(event) = rx.try_recv() {
            assert_eq!(event.session_id, session.id());
        }
    }

    #[tokio::test]
    async fn test_wait_for_idle_after_query() {
        let backend = ScriptedBackend::new([ScriptedTurn::text("done")]).with_event_delay(Duration::from_millis(10));
        let h = Harness::new(backend);

        let session = h.session.clone();
        let task = tokio::spawn(async move { session.execute_query(QueryRequest::new("go")).await });
        while !h.session.is_running() && !task.is_finished() {
            tokio::task::yield_now().await;
        }
        h.session.wait_for_idle().await;
        assert!(!h.session.is_running());
        assert_eq!(task.await.unwrap(), QueryOutcome::Completed);
    }

    /// Streams text, then reports its steps only after the stream drains
    struct DeferredBackend {
        steps: Option<Vec<Step>>,
    }

    #[async_trait]
    impl Backend for DeferredBackend {
        async fn invoke(&self, _request: BackendRequest) -> relay_ai::Result<relay_ai::BackendRun> {
            let events: relay_ai::BackendEventStream = Box::pin(async_stream::stream! {
                yield Ok::<_, relay_ai::Error>(relay_ai::BackendEvent::TextDelta { text: "deferred".into() });
                yield Ok(relay_ai::BackendEvent::TextEnd);
            });
            let steps = self.steps.clone().map(|steps| {
                relay_ai::Steps::Pending(Box::pin(async move { Ok::<_, relay_ai::Error>(steps) }))
            });
            Ok(relay_ai::BackendRun {
                events,
                completion: Box::pin(async move { Ok::<_, relay_ai::Error>(relay_ai::BackendOutput { steps }) }),
            })
        }
    }

    fn deferred_session(steps: Option<Vec<Step>>) -> Session {
        let (tx, _rx) = mpsc::unbounded_channel();
        Session::new(
            SessionConfig::default(),
            Arc::new(DeferredBackend { steps }),
            Arc::new(StaticTools::default()),
            Arc::new(tx),
        )
    }

    #[tokio::test]
    async fn test_pending_steps_are_awaited() {
        let session = deferred_session(Some(vec![Step::text("deferred")]));
        let outcome = session.execute_query(QueryRequest::new("q")).await;
        assert_eq!(outcome, QueryOutcome::Completed);
        assert_eq!(
            session.history(),
            vec![Message::user("q"), Message::assistant_text("deferred")]
        );
    }

    #[tokio::test]
    async fn test_absent_steps_record_only_the_query() {
        let session = deferred_session(None);
        let outcome = session.execute_query(QueryRequest::new("q")).await;
        assert_eq!(outcome, QueryOutcome::Completed);
        assert_eq!(session.history(), vec![Message::user("q")]);
    }

    #[test]
    fn test_config_defaults() {
        let config: SessionConfig = serde_json::from_value(json!({"max_steps": 5})).unwrap();
        assert_eq!(config.max_steps, 5);
        assert_eq!(config.heavy_tools, vec![REPORT_TOOL_NAME.to_string()]);
        assert_eq!(config.compaction, CompactionOptions::default());
    }
}
