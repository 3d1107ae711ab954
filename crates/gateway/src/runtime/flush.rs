//! Pre-compaction memory flush.
//!
//! Before old messages are summarized away the model gets one bounded pass
//! to write anything durable to memory. If it never writes a dated note, a
//! minimal one is written on its behalf so every compaction leaves a trace.

use std::sync::Arc;

use mn_domain::config::Config;
use mn_domain::error::Result;
use mn_domain::tool::Message;
use mn_domain::trace::TraceEvent;
use mn_memory::MemoryStore;
use mn_providers::ChatRequest;
use mn_sessions::{Session, SessionStore};
use mn_tools::memory::REMEMBER_CORE_TOOL;
use mn_tools::{ToolRegistry, DAILY_NOTE_TOOL};

use super::{ModelClient, RecallService};

/// Reply meaning "nothing worth storing". Matched as a case-insensitive prefix.
pub const NO_REPLY: &str = "NO_REPLY";

const FLUSH_TEMPERATURE: f32 = 0.3;

fn flush_system_prompt() -> String {
    format!(
        "You are running a memory flush. The conversation below is about to be \
         summarized and its older messages discarded. Save anything worth keeping now.\n\n\
         - `{REMEMBER_CORE_TOOL}`: identity details (name, contact info), stated preferences, \
         things the user explicitly asked you to remember, other long-lived facts.\n\
         - `{DAILY_NOTE_TOOL}`: session notes, decisions, TODO items, open questions, \
         progress made in this conversation.\n\n\
         Keep entries short. Do not repeat what MEMORY.md already holds."
    )
}

fn flush_user_prompt() -> String {
    format!(
        "Review the conversation above and store what should survive compaction using the \
         memory tools. If there is nothing to store, reply with {NO_REPLY}."
    )
}

/// Dated note written when the model declined to write one.
pub fn fallback_note(message_count: usize) -> String {
    format!(
        "Session notes: conversation reached compaction threshold ({message_count} messages). \
         Key points may be in prior compaction summary or MEMORY.md."
    )
}

pub fn is_no_reply(content: &str) -> bool {
    content
        .trim_start()
        .get(..NO_REPLY.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(NO_REPLY))
}

pub struct MemoryFlushRunner {
    model: ModelClient,
    model_name: String,
    max_tokens: u32,
    max_history: usize,
    max_iterations: usize,
    tools: Arc<ToolRegistry>,
    memory: MemoryStore,
    sessions: Arc<dyn SessionStore>,
    recall: RecallService,
}

impl MemoryFlushRunner {
    pub fn new(
        config: &Config,
        model: ModelClient,
        tools: Arc<ToolRegistry>,
        memory: MemoryStore,
        sessions: Arc<dyn SessionStore>,
        recall: RecallService,
    ) -> Self {
        Self {
            model,
            model_name: config.agent.model.clone(),
            max_tokens: config.agent.max_tokens,
            max_history: config.agent.max_history_messages,
            max_iterations: config.compaction.flush_max_iterations,
            tools,
            memory,
            sessions,
            recall,
        }
    }

    /// Run the flush loop for the current compaction cycle, then mark the
    /// cycle flushed and persist the session. Model errors abort the loop
    /// and are returned; the caller decides whether to continue.
    pub async fn flush(&self, session: &mut Session) -> Result<()> {
        let mut messages = Vec::with_capacity(self.max_history + 2);
        messages.push(Message::system(flush_system_prompt()));
        messages.extend(session.history(self.max_history).iter().cloned());
        messages.push(Message::user(flush_user_prompt()));

        let tool_defs = self.tools.flush_definitions();
        let mut daily_written = false;
        let mut iterations = 0;

        while iterations < self.max_iterations {
            iterations += 1;
            let req = ChatRequest::new(messages.clone())
                .with_tools(tool_defs.clone())
                .with_model(&self.model_name)
                .with_sampling(self.max_tokens, FLUSH_TEMPERATURE);
            let resp = self.model.chat(&req).await?;

            if !resp.has_tool_calls() {
                if is_no_reply(&resp.content) {
                    tracing::debug!(session_key = %session.key, "flush: nothing to store");
                }
                break;
            }

            messages.push(Message::assistant_tool_calls(
                &resp.content,
                &resp.tool_calls,
                resp.side_channel.clone(),
            ));
            for call in &resp.tool_calls {
                if call.tool_name == DAILY_NOTE_TOOL {
                    daily_written = true;
                }
                let result = self
                    .tools
                    .execute(&call.tool_name, call.arguments.clone())
                    .await;
                messages.push(Message::tool_result(&call.call_id, result));
            }
        }

        let mut fallback_written = false;
        if !daily_written && !session.messages.is_empty() {
            match self
                .memory
                .append_daily(&fallback_note(session.messages.len()))
                .await
            {
                Ok(()) => fallback_written = true,
                Err(e) => tracing::warn!(error = %e, "flush: fallback note not written"),
            }
        }

        session.mark_flushed();
        if let Err(e) = self.sessions.save(session).await {
            tracing::warn!(session_key = %session.key, error = %e, "flush: session save failed");
        }
        self.recall.trigger_reindex("memory flush");

        TraceEvent::MemoryFlushCompleted {
            session_key: session.key.clone(),
            compaction_count: session.compaction_count,
            iterations,
            daily_note_written: daily_written,
            fallback_written,
        }
        .emit();
        Ok(())
    }
}
