//! relay-agent: session runtime for tool-using conversations
//!
//! This crate drives one query at a time per session: it streams backend
//! events to the client, keeps the conversation history, trims and compacts
//! that history under token pressure, and maps client connections to
//! sessions.

pub mod channel;
pub mod classify;
pub mod compaction;
pub mod error;
pub mod events;
pub mod extract;
pub mod handle;
pub mod history;
pub mod registry;
pub mod relay;
pub mod session;
pub mod tools;
pub mod truncation;

pub use channel::ClientChannel;
pub use classify::{FailureClassifier, FailureKind};
pub use compaction::{CompactionOptions, CompactionReport, compact};
pub use error::{Error, Result};
pub use events::{ClientEvent, ClientInput, EventKind};
pub use extract::extract_messages;
pub use handle::SessionHandle;
pub use history::parse_external_history;
pub use registry::{SessionInfo, SessionRegistry};
pub use session::{QueryOutcome, QueryRequest, Session, SessionConfig, SessionState};
pub use tools::{StaticTools, ToolSource};
pub use truncation::{REPORT_PLACEHOLDER, REPORT_TOOL_NAME, truncate_heavy_tool_calls};
