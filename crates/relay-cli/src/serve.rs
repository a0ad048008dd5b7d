//! JSON-lines transport over stdio
//!
//! Each input line is a `ClientInput`; each output line is a `ClientEvent`.
//! The whole stream is a single connection with a single session.

use std::sync::Arc;

use anyhow::Context;
use relay_agent::{ClientChannel, ClientEvent, ClientInput, EventKind, QueryRequest, SessionRegistry};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

/// Connection id of the stdio client
pub const CONNECTION_ID: &str = "stdio";

/// Read client inputs until EOF, running each query on the connection's session.
///
/// At EOF, queries still in flight are allowed to finish before the session
/// is torn down.
pub async fn serve<R>(registry: Arc<SessionRegistry>, channel: Arc<dyn ClientChannel>, input: R) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    let mut queries = JoinSet::new();

    while let Some(line) = lines.next_line().await.context("failed to read input")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let input: ClientInput = match serde_json::from_str(line) {
            Ok(input) => input,
            Err(e) => {
                tracing::warn!(error = %e, "ignoring malformed input line");
                channel.send(ClientEvent::new(
                    CONNECTION_ID,
                    EventKind::Error {
                        message: format!("Invalid input: {}", e),
                    },
                ));
                continue;
            }
        };

        match input {
            ClientInput::Query {
                content,
                session_id,
                history,
            } => {
                let session = registry.get_or_create(CONNECTION_ID, channel.clone());
                let request = QueryRequest {
                    content,
                    session_id,
                    history,
                };
                queries.spawn(async move { session.execute_query(request).await });
            }
            ClientInput::Cancel { .. } => {
                if let Some(session) = registry.get(CONNECTION_ID) {
                    session.cancel();
                }
            }
        }

        // reap finished queries so the set doesn't grow unbounded
        while let Some(result) = queries.try_join_next() {
            log_query_result(result);
        }
    }

    tracing::debug!("input closed, waiting for running queries");
    while let Some(result) = queries.join_next().await {
        log_query_result(result);
    }
    registry.remove(CONNECTION_ID);
    Ok(())
}

fn log_query_result(result: Result<relay_agent::QueryOutcome, tokio::task::JoinError>) {
    match result {
        Ok(outcome) => tracing::debug!(?outcome, "query finished"),
        Err(e) => tracing::warn!(error = %e, "query task failed"),
    }
}

/// Write every event as a JSON line until all senders are gone
pub async fn write_events<W>(mut rx: mpsc::UnboundedReceiver<ClientEvent>, mut output: W) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(event) = rx.recv().await {
        let mut line = serde_json::to_string(&event)?;
        line.push('\n');
        output.write_all(line.as_bytes()).await?;
        output.flush().await?;
    }
    Ok(())
}
