//! Session compaction: collapse old messages into a rolling summary so
//! history stays bounded however long a conversation runs.
//!
//! Order per cycle: flush (at most once) → partition → summarize → trim.
//! The trim happens even when summarization fails; the previous summary is
//! kept in that case.

use std::sync::Arc;

use mn_domain::config::{CompactionConfig, Config};
use mn_domain::error::{Error, Result};
use mn_domain::tool::Message;
use mn_domain::trace::TraceEvent;
use mn_providers::ChatRequest;
use mn_sessions::{Session, SessionStore};

use super::{MemoryFlushRunner, ModelClient};

/// Per-message text limit in the summarizer transcript.
const SUMMARY_INPUT_CHARS: usize = 2000;
const SUMMARY_TEMPERATURE: f32 = 0.3;

const SUMMARY_SYSTEM: &str = "You are a summarization assistant. Condense the conversation \
    into a compact summary that a later turn can rely on. Preserve key decisions, TODO items, \
    open questions, constraints, and facts about the user. Drop greetings and filler. \
    Output only the summary.";

pub struct CompactionScheduler {
    config: CompactionConfig,
    model: ModelClient,
    model_name: String,
    sessions: Arc<dyn SessionStore>,
    flush: MemoryFlushRunner,
}

impl CompactionScheduler {
    pub fn new(
        config: &Config,
        model: ModelClient,
        sessions: Arc<dyn SessionStore>,
        flush: MemoryFlushRunner,
    ) -> Self {
        Self {
            config: config.compaction.clone(),
            model,
            model_name: config.agent.model.clone(),
            sessions,
            flush,
        }
    }

    pub fn flush_runner(&self) -> &MemoryFlushRunner {
        &self.flush
    }

    /// Compact `session` if it has outgrown the threshold. Returns whether
    /// compaction fired. Never fails: flush and summarization errors are
    /// logged and the trim still happens.
    pub async fn maybe_compact(&self, session: &mut Session) -> bool {
        let len = session.messages.len();
        let keep = self.config.keep_recent;
        if !self.config.enabled || len <= self.config.threshold_messages || keep >= len {
            return false;
        }

        tracing::info!(
            session_key = %session.key,
            messages = len,
            keep_recent = keep,
            "compacting session"
        );

        if self.config.memory_flush && session.needs_flush() {
            if let Err(e) = self.flush.flush(session).await {
                tracing::warn!(session_key = %session.key, error = %e, "memory flush failed");
            }
        }

        let split = session.messages.len() - keep;
        let recent = session.messages[split..].to_vec();
        let mut old = Vec::with_capacity(split + 1);
        if let Some(prior) = session.compaction_summary.as_deref() {
            old.push(Message::user(format!("Prior summary: {prior}")));
        }
        old.extend_from_slice(&session.messages[..split]);

        let summary = match self.summarize(&old).await {
            Ok(s) => Some(s),
            Err(e) => {
                tracing::warn!(
                    session_key = %session.key,
                    error = %e,
                    "summarization failed; keeping previous summary"
                );
                None
            }
        };
        let summary_updated = summary.is_some();

        session.record_compaction(recent, summary);
        if let Err(e) = self.sessions.save(session).await {
            tracing::warn!(session_key = %session.key, error = %e, "compacted session not saved");
        }

        TraceEvent::CompactionCompleted {
            session_key: session.key.clone(),
            messages_before: len,
            messages_after: session.messages.len(),
            compaction_count: session.compaction_count,
            summary_updated,
        }
        .emit();
        true
    }

    async fn summarize(&self, old: &[Message]) -> Result<String> {
        let req = ChatRequest::new(vec![
            Message::system(SUMMARY_SYSTEM),
            Message::user(format!(
                "Summarize this conversation:\n\n{}",
                render_transcript(old)
            )),
        ])
        .with_model(&self.model_name)
        .with_sampling(self.config.summary_max_tokens, SUMMARY_TEMPERATURE);
        let resp = self.model.chat(&req).await?;
        let summary = resp.content.trim();
        if summary.is_empty() {
            return Err(Error::Other("summarizer returned no text".into()));
        }
        Ok(summary.to_string())
    }
}

/// `[role]: text` per message, blank-line separated.
pub fn render_transcript(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| {
            let text = if m.content.is_non_text() {
                "(non-text content)".to_string()
            } else {
                clip(&m.content.extract_all_text(), SUMMARY_INPUT_CHARS)
            };
            format!("[{}]: {text}", m.role.as_str())
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn clip(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
