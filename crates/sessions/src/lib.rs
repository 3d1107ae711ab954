//! Session state for mnemo.
//!
//! A session is the durable conversational state behind one
//! `channel:chat_id` key: its message history, the rolling compaction
//! summary, and the per-cycle memory flush gate. Sessions are created on
//! first reference and persisted through a [`SessionStore`].

pub mod session;
pub mod session_key;
pub mod store;

pub use session::{FlushState, Session};
pub use session_key::{resolve_route, SessionKey};
pub use store::{FileSessionStore, SessionStore};
