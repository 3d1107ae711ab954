use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Memory files & recall index
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Workspace root. Memory files live under `<workspace>/memory/`.
    #[serde(default = "d_workspace")]
    pub workspace: PathBuf,
    /// Enable semantic recall and background reindexing.
    #[serde(default = "d_true")]
    pub search_enabled: bool,
    /// Directory holding the persisted recall index.
    #[serde(default = "d_index_path")]
    pub index_path: PathBuf,
    /// Width of the hashed embedding vectors.
    #[serde(default = "d_384")]
    pub embedding_dimensions: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            workspace: d_workspace(),
            search_enabled: true,
            index_path: d_index_path(),
            embedding_dimensions: 384,
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_workspace() -> PathBuf {
    PathBuf::from("./workspace")
}
fn d_index_path() -> PathBuf {
    PathBuf::from("./data/memory-index")
}
fn d_true() -> bool {
    true
}
fn d_384() -> usize {
    384
}
