//! relay-ai: conversation model and model backend contract
//!
//! This crate defines the internal message model, the provider-facing wire
//! format with lossless conversion between the two, and the streaming
//! contract a model backend implements.

pub mod backend;
pub mod error;
pub mod scripted;
pub mod stream;
pub mod types;
pub mod wire;

pub use backend::{
    Backend, BackendInput, BackendOutput, BackendRequest, BackendRun, Step, StepToolCall,
    StepToolResult, Steps,
};
pub use error::{Error, Result};
pub use scripted::{Script, ScriptedBackend, ScriptedTurn};
pub use stream::{BackendEvent, BackendEventStream, StepBuilder};
pub use types::*;
pub use wire::{WireContent, WireMessage, WirePart, from_wire, to_wire};
