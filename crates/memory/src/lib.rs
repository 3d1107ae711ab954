//! `mn-memory` — durable agent memory for mnemo.
//!
//! Two layers:
//!
//! | Layer | Type | Contents |
//! |-------|------|----------|
//! | Files | [`MemoryStore`] | `memory/MEMORY.md` (core facts) and `memory/YYYY-MM-DD.md` (dated notes) |
//! | Recall | [`RecallIndex`] | Semantic search over chunks of those files |
//!
//! The bundled [`LocalRecallIndex`] embeds chunks through the process-wide
//! [`EmbeddingService`] and keeps its snapshot on disk. All embedding work
//! runs on the blocking pool so callers on the async runtime never stall.

pub mod chunk;
pub mod embedding;
pub mod index;
pub mod organize;
pub mod store;

pub use embedding::{Embedder, EmbeddingService, HashingEmbedder};
pub use index::{format_recall, LocalRecallIndex, RecallHit, RecallIndex, MAX_TOP_K};
pub use store::MemoryStore;
