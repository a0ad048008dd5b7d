//! Error types for relay-agent

use thiserror::Error;

/// Result type alias using relay-agent Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while running a session
#[derive(Error, Debug)]
pub enum Error {
    /// An error from the model backend layer
    #[error(transparent)]
    Ai(#[from] relay_ai::Error),

    /// The tool set could not be built before the query ran
    #[error("Tool initialization failed: {0}")]
    ToolInit(String),

    /// A generic session error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Check if this error indicates a context overflow
    pub fn is_context_overflow(&self) -> bool {
        match self {
            Error::Ai(e) => e.is_context_overflow(),
            _ => false,
        }
    }
}
