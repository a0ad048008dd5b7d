//! Connection-to-session bookkeeping

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use relay_ai::Backend;
use serde::Serialize;

use crate::channel::ClientChannel;
use crate::session::{Session, SessionConfig, SessionState};
use crate::tools::ToolSource;

/// Summary of a registered session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionInfo {
    pub connection_id: String,
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub state: SessionState,
    pub history_len: usize,
}

/// Owns the sessions of every live connection.
///
/// Constructed once and handed to whatever manages connection lifecycles.
/// Each connection gets at most one session, created on first use.
pub struct SessionRegistry {
    config: SessionConfig,
    backend: Arc<dyn Backend>,
    tools: Arc<dyn ToolSource>,
    sessions: Mutex<HashMap<String, Arc<Session>>>,
}

impl SessionRegistry {
    /// Create a registry whose sessions share this backend and tool source
    pub fn new(config: SessionConfig, backend: Arc<dyn Backend>, tools: Arc<dyn ToolSource>) -> Self {
        Self {
            config,
            backend,
            tools,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Get the connection's session, creating it if needed.
    ///
    /// `channel` is only used when the session is created.
    pub fn get_or_create(&self, connection_id: &str, channel: Arc<dyn ClientChannel>) -> Arc<Session> {
        let mut sessions = self.sessions.lock();
        sessions
            .entry(connection_id.to_string())
            .or_insert_with(|| {
                let session = Session::new(
                    self.config.clone(),
                    self.backend.clone(),
                    self.tools.clone(),
                    channel,
                );
                tracing::debug!(%connection_id, session_id = %session.id(), "created session");
                Arc::new(session)
            })
            .clone()
    }

    pub fn get(&self, connection_id: &str) -> Option<Arc<Session>> {
        self.sessions.lock().get(connection_id).cloned()
    }

    /// Tear down the connection's session, cancelling any running query.
    ///
    /// Returns `false` if there was no session, so teardown happens at most
    /// once per connection.
    pub fn remove(&self, connection_id: &str) -> bool {
        let Some(session) = self.sessions.lock().remove(connection_id) else {
            return false;
        };
        session.cancel();
        tracing::debug!(%connection_id, session_id = %session.id(), "removed session");
        true
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    /// Describe every registered session, ordered by connection id
    pub fn list(&self) -> Vec<SessionInfo> {
        let mut infos: Vec<SessionInfo> = self
            .sessions
            .lock()
            .iter()
            .map(|(connection_id, session)| SessionInfo {
                connection_id: connection_id.clone(),
                session_id: session.id().to_string(),
                created_at: session.created_at(),
                state: session.state(),
                history_len: session.history().len(),
            })
            .collect();
        infos.sort_by(|a, b| a.connection_id.cmp(&b.connection_id));
        infos
    }
}
