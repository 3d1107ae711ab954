use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Compaction
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Compaction collapses old session messages into a summary so history
/// stays bounded no matter how long a conversation runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactionConfig {
    #[serde(default = "d_true")]
    pub enabled: bool,
    /// Compaction fires once a session holds more messages than this.
    #[serde(default = "d_60")]
    pub threshold_messages: usize,
    /// Messages kept verbatim after compaction.
    #[serde(default = "d_20")]
    pub keep_recent: usize,
    /// Run the memory flush loop before history is discarded.
    #[serde(default = "d_true")]
    pub memory_flush: bool,
    #[serde(default = "d_1500")]
    pub summary_max_tokens: u32,
    /// Model calls allowed inside one memory flush.
    #[serde(default = "d_5")]
    pub flush_max_iterations: usize,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold_messages: 60,
            keep_recent: 20,
            memory_flush: true,
            summary_max_tokens: 1500,
            flush_max_iterations: 5,
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_true() -> bool {
    true
}
fn d_60() -> usize {
    60
}
fn d_20() -> usize {
    20
}
fn d_1500() -> u32 {
    1500
}
fn d_5() -> usize {
    5
}
