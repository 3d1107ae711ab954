//! Shared data model for mnemo: conversation messages, transport envelopes,
//! configuration, the common error type, and structured trace events.

pub mod config;
pub mod envelope;
pub mod error;
pub mod tool;
pub mod trace;

pub use envelope::{InboundMessage, OutboundMessage};
pub use error::{Error, Result};
