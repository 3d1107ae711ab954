//! One conversational turn: route, compact, recall, build context, run the
//! tool loop, persist.

use mn_domain::envelope::{InboundMessage, OutboundMessage, CRON_CHANNEL};
use mn_domain::error::Result;
use mn_domain::tool::{Message, ToolCall};
use mn_domain::trace::TraceEvent;
use mn_providers::{ChatRequest, ChatResponse};
use mn_sessions::{resolve_route, Session, SessionKey};

use super::AgentRuntime;

/// Shown to the user when the model answers with nothing.
pub const EMPTY_REPLY_NOTICE: &str =
    "The model returned an empty response. Please try again or rephrase your request.";
/// Sent to the model (never the user) after its first empty answer.
pub const CONTINUE_PROMPT: &str =
    "Your previous reply was empty. Please continue the task and give a substantive action or reply.";
pub const NO_CONTENT_REPLY: &str = "Processing complete, but there is no reply content.";
pub const BACKGROUND_DONE_REPLY: &str = "Background task completed.";

/// What the tool loop produced.
#[derive(Debug, Default)]
struct LoopOutcome {
    reply: Option<String>,
    iterations: usize,
    tools_called: Vec<String>,
    memory_written: bool,
    empty_retries: usize,
}

impl AgentRuntime {
    /// Run one inbound message to completion.
    ///
    /// Only model/transport errors are returned; everything else degrades
    /// in place. Blank messages without attachments get no reply.
    pub async fn process(&self, inbound: &InboundMessage) -> Result<Option<OutboundMessage>> {
        if inbound.content.trim().is_empty() && inbound.media.is_empty() {
            tracing::debug!(channel = %inbound.channel, "ignoring blank inbound message");
            return Ok(None);
        }

        // 1. Route and load.
        let key = resolve_route(inbound, self.default_channel());
        let session_key = key.to_string();
        // An unreadable session still gets an answer, but it is never
        // written back: saving would replace the stored history.
        let (mut session, persist) = match self.sessions.get_or_create(&session_key).await {
            Ok(s) => (s, true),
            Err(e) => {
                tracing::warn!(
                    session_key = %session_key,
                    error = %e,
                    "session load failed; answering without persisting"
                );
                (Session::new(&session_key), false)
            }
        };
        self.target.set(key.clone());

        // 2. Compaction strictly precedes context building.
        if persist {
            self.compaction.maybe_compact(&mut session).await;
        }

        // 3. Recall.
        let recall = self
            .recall
            .recall(&inbound.content, self.config.agent.recall_top_k)
            .await;

        // 4. Context.
        let mut messages = self
            .context
            .build_messages(
                session.history(self.config.agent.max_history_messages),
                &inbound.content,
                &inbound.media,
                session.compaction_summary.as_deref(),
                recall.as_deref(),
                inbound.channel == CRON_CHANNEL,
            )
            .await;

        // 5. Tool loop. Model errors propagate from here.
        let outcome = self.run_tool_loop(&mut messages, &key).await?;
        let reply = outcome.reply.clone().unwrap_or_else(|| {
            if inbound.is_system() {
                BACKGROUND_DONE_REPLY.to_string()
            } else {
                NO_CONTENT_REPLY.to_string()
            }
        });

        // 6. Post-turn.
        if outcome.memory_written {
            self.recall.trigger_reindex("memory tool");
        }
        let user_text = if inbound.is_system() {
            format!("[System: {}] {}", inbound.sender_id, inbound.content)
        } else {
            inbound.content.clone()
        };
        session.push(Message::user(user_text));
        session.push(Message::assistant(reply.clone()));
        if persist {
            if let Err(e) = self.sessions.save(&session).await {
                tracing::warn!(session_key = %session_key, error = %e, "session save failed");
            }
        }

        TraceEvent::TurnCompleted {
            session_key,
            iterations: outcome.iterations,
            tools_called: outcome.tools_called,
            memory_written: outcome.memory_written,
            empty_retries: outcome.empty_retries,
        }
        .emit();

        Ok(Some(OutboundMessage::new(key.channel, key.chat_id, reply)))
    }

    /// One-shot helper for the CLI: `session_key` is `channel:chat_id`,
    /// with the default channel when no prefix is given.
    pub async fn process_direct(&self, content: &str, session_key: &str) -> Result<String> {
        let key = SessionKey::parse(session_key, self.default_channel());
        let chat_id = if key.chat_id.is_empty() {
            "direct".to_string()
        } else {
            key.chat_id
        };
        let inbound = InboundMessage::new(&key.channel, "user", chat_id, content);
        Ok(self
            .process(&inbound)
            .await?
            .map(|reply| reply.content)
            .unwrap_or_default())
    }

    async fn run_tool_loop(&self, messages: &mut Vec<Message>, key: &SessionKey) -> Result<LoopOutcome> {
        let agent = &self.config.agent;
        let tool_defs = self.tools.model_definitions();
        let mut outcome = LoopOutcome::default();

        while outcome.iterations < agent.max_tool_iterations {
            outcome.iterations += 1;
            let req = ChatRequest::new(messages.clone())
                .with_tools(tool_defs.clone())
                .with_model(&agent.model)
                .with_sampling(agent.max_tokens, agent.temperature);
            let resp = self.model.chat(&req).await?;

            if resp.has_tool_calls() {
                if agent.tool_call_notices {
                    self.notify(OutboundMessage::new(
                        &key.channel,
                        &key.chat_id,
                        tool_notice(&resp),
                    ))
                    .await;
                }
                messages.push(Message::assistant_tool_calls(
                    &resp.content,
                    &resp.tool_calls,
                    resp.side_channel.clone(),
                ));
                for call in &resp.tool_calls {
                    let result = self.execute_tool(call).await;
                    outcome.tools_called.push(call.tool_name.clone());
                    if self.tools.is_memory_write(&call.tool_name) {
                        outcome.memory_written = true;
                    }
                    messages.push(Message::tool_result(&call.call_id, result));
                }
                continue;
            }

            if !resp.is_blank() {
                outcome.reply = Some(resp.content);
                break;
            }

            // Empty answer: one retry, then give up with the notice text.
            if outcome.empty_retries > 0 {
                tracing::warn!(session_key = %key, "model returned empty content twice");
                outcome.reply = Some(EMPTY_REPLY_NOTICE.to_string());
                break;
            }
            outcome.empty_retries += 1;
            tracing::debug!(session_key = %key, "empty model reply, asking it to continue");
            self.notify(OutboundMessage::new(&key.channel, &key.chat_id, EMPTY_REPLY_NOTICE))
                .await;
            messages.push(Message::assistant(resp.content));
            messages.push(Message::user(CONTINUE_PROMPT));
        }

        if outcome.reply.is_none() {
            tracing::warn!(
                session_key = %key,
                iterations = outcome.iterations,
                "tool loop hit the iteration cap"
            );
        }
        Ok(outcome)
    }

    async fn execute_tool(&self, call: &ToolCall) -> String {
        tracing::debug!(tool = %call.tool_name, call_id = %call.call_id, "executing tool");
        let result = self
            .tools
            .execute(&call.tool_name, call.arguments.clone())
            .await;
        if result.starts_with("Error:") {
            tracing::warn!(tool = %call.tool_name, result = %result, "tool reported an error");
        }
        result
    }
}

/// Progress line listing the requested tools, after any interim text.
fn tool_notice(resp: &ChatResponse) -> String {
    let names = resp
        .tool_calls
        .iter()
        .map(|c| c.tool_name.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let interim = resp.content.trim();
    if interim.is_empty() {
        format!("Calling tools: {names}")
    } else {
        format!("{interim}\n\nCalling tools: {names}")
    }
}
