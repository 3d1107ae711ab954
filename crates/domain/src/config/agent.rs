use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Agent turn settings
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Sampling and loop limits for the main turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "d_model")]
    pub model: String,
    #[serde(default = "d_4096")]
    pub max_tokens: u32,
    #[serde(default = "d_temperature")]
    pub temperature: f32,
    /// Upper bound on model calls within one turn.
    #[serde(default = "d_20")]
    pub max_tool_iterations: usize,
    /// Most recent session messages replayed into each turn.
    #[serde(default = "d_50")]
    pub max_history_messages: usize,
    /// Snippets requested from the recall index per turn.
    #[serde(default = "d_5")]
    pub recall_top_k: usize,
    /// Publish a progress notice listing the tools the model called.
    #[serde(default = "d_true")]
    pub tool_call_notices: bool,
    /// Optional per-call deadline for model requests. `None` waits forever.
    #[serde(default)]
    pub model_timeout_secs: Option<u64>,
    /// Channel assumed when a routing string carries no channel prefix.
    #[serde(default = "d_default_channel")]
    pub default_channel: String,
    /// Extra text appended to the built-in system prompt.
    #[serde(default)]
    pub system_prompt: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: d_model(),
            max_tokens: 4096,
            temperature: d_temperature(),
            max_tool_iterations: 20,
            max_history_messages: 50,
            recall_top_k: 5,
            tool_call_notices: true,
            model_timeout_secs: None,
            default_channel: d_default_channel(),
            system_prompt: None,
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_model() -> String {
    "gpt-4o-mini".into()
}
fn d_4096() -> u32 {
    4096
}
fn d_temperature() -> f32 {
    0.7
}
fn d_20() -> usize {
    20
}
fn d_50() -> usize {
    50
}
fn d_5() -> usize {
    5
}
fn d_true() -> bool {
    true
}
fn d_default_channel() -> String {
    "cli".into()
}
