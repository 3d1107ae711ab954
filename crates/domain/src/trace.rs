use serde::Serialize;

/// Structured trace events emitted across all mnemo crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    SessionResolved {
        session_key: String,
        is_new: bool,
    },
    LlmRequest {
        provider: String,
        model: String,
        duration_ms: u64,
        prompt_tokens: Option<u32>,
        completion_tokens: Option<u32>,
    },
    CompactionCompleted {
        session_key: String,
        messages_before: usize,
        messages_after: usize,
        compaction_count: u64,
        summary_updated: bool,
    },
    MemoryFlushCompleted {
        session_key: String,
        compaction_count: u64,
        iterations: usize,
        daily_note_written: bool,
        fallback_written: bool,
    },
    RecallPerformed {
        query_chars: usize,
        hits: usize,
    },
    ReindexCompleted {
        chunks: usize,
        duration_ms: u64,
    },
    TurnCompleted {
        session_key: String,
        iterations: usize,
        tools_called: Vec<String>,
        memory_written: bool,
        empty_retries: usize,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "mn_event");
    }
}
