//! End-to-end engine scenarios against a scripted model.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use tempfile::TempDir;

use mn_domain::config::Config;
use mn_domain::envelope::InboundMessage;
use mn_domain::error::{Error, Result};
use mn_domain::tool::{Message, Role, SideChannel, ToolCall};
use mn_gateway::bus::{AgentLoop, BusReceivers, MessageBus};
use mn_gateway::context::{RECALL_HEADER, SUMMARY_HEADER};
use mn_gateway::runtime::{
    AgentRuntime, BACKGROUND_DONE_REPLY, CONTINUE_PROMPT, EMPTY_REPLY_NOTICE, NO_CONTENT_REPLY,
};
use mn_memory::{EmbeddingService, LocalRecallIndex, MemoryStore, RecallHit, RecallIndex};
use mn_providers::{ChatRequest, ChatResponse, LlmProvider};
use mn_sessions::{FileSessionStore, Session, SessionStore};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scripted provider
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

enum Step {
    Reply(ChatResponse),
    Fail(&'static str),
    Hang,
}

/// Returns queued steps in order, then `fallback` forever. Records every
/// request it receives.
struct ScriptedProvider {
    steps: Mutex<VecDeque<Step>>,
    fallback: ChatResponse,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedProvider {
    fn new(steps: Vec<Step>) -> Arc<Self> {
        Self::with_fallback(steps, ChatResponse::text("ok"))
    }

    fn with_fallback(steps: Vec<Step>, fallback: ChatResponse) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into()),
            fallback,
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse> {
        self.requests.lock().push(req.clone());
        let step = self.steps.lock().pop_front();
        match step {
            Some(Step::Reply(resp)) => Ok(resp),
            Some(Step::Fail(msg)) => Err(Error::Http(msg.into())),
            Some(Step::Hang) => std::future::pending().await,
            None => Ok(self.fallback.clone()),
        }
    }

    fn provider_id(&self) -> &str {
        "scripted"
    }
}

fn text(s: &str) -> Step {
    Step::Reply(ChatResponse::text(s))
}

fn calls(content: &str, calls: &[(&str, serde_json::Value)]) -> ChatResponse {
    ChatResponse {
        content: content.into(),
        tool_calls: calls
            .iter()
            .enumerate()
            .map(|(i, (name, args))| ToolCall {
                call_id: format!("call_{i}"),
                tool_name: (*name).into(),
                arguments: args.clone(),
            })
            .collect(),
        ..Default::default()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Harness
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct Harness {
    _dir: TempDir,
    runtime: AgentRuntime,
    provider: Arc<ScriptedProvider>,
    sessions: Arc<FileSessionStore>,
    memory: MemoryStore,
    bus: MessageBus,
    receivers: BusReceivers,
}

fn base_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.memory.workspace = dir.join("workspace");
    config.memory.index_path = dir.join("index");
    config.memory.embedding_dimensions = 64;
    config.sessions.state_path = dir.join("sessions");
    config.compaction.memory_flush = false;
    config
}

fn harness(dir: TempDir, config: Config, provider: Arc<ScriptedProvider>) -> Harness {
    build(
        dir,
        config,
        provider,
        |config, memory| {
            config.memory.search_enabled.then(|| {
                Arc::new(LocalRecallIndex::new(
                    memory.clone(),
                    &config.memory.index_path,
                    Arc::new(EmbeddingService::new(config.memory.embedding_dimensions)),
                )) as Arc<dyn RecallIndex>
            })
        },
        |store| store as Arc<dyn SessionStore>,
    )
}

/// Like [`harness`], with the recall index and the runtime's view of the
/// session store supplied by the caller. `sessions` on the result is always
/// the underlying file store.
fn build(
    dir: TempDir,
    config: Config,
    provider: Arc<ScriptedProvider>,
    recall: impl FnOnce(&Config, &MemoryStore) -> Option<Arc<dyn RecallIndex>>,
    wrap: impl FnOnce(Arc<FileSessionStore>) -> Arc<dyn SessionStore>,
) -> Harness {
    std::fs::create_dir_all(&config.memory.workspace).unwrap();
    let memory = MemoryStore::new(&config.memory.workspace);
    let recall = recall(&config, &memory);
    let sessions = Arc::new(FileSessionStore::new(&config.sessions.state_path).unwrap());
    let (bus, receivers) = MessageBus::new(64);
    let runtime = AgentRuntime::new(
        Arc::new(config),
        provider.clone(),
        wrap(sessions.clone()),
        memory.clone(),
        recall,
        bus.outbox(),
    );
    Harness {
        _dir: dir,
        runtime,
        provider,
        sessions,
        memory,
        bus,
        receivers,
    }
}

fn setup(provider: Arc<ScriptedProvider>, tweak: impl FnOnce(&mut Config)) -> Harness {
    let dir = TempDir::new().unwrap();
    let mut config = base_config(dir.path());
    tweak(&mut config);
    harness(dir, config, provider)
}

fn user_msg(content: &str) -> InboundMessage {
    InboundMessage::new("cli", "user", "1", content)
}

async fn seeded_session(sessions: &FileSessionStore, key: &str, n: usize) -> Session {
    let mut session = sessions.get_or_create(key).await.unwrap();
    for i in 0..n {
        if i % 2 == 0 {
            session.push(Message::user(format!("question {i}")));
        } else {
            session.push(Message::assistant(format!("answer {i}")));
        }
    }
    sessions.save(&session).await.unwrap();
    session
}

fn system_text(req: &ChatRequest) -> String {
    req.messages[0].content.extract_all_text()
}

fn drain_outbound(receivers: &mut BusReceivers) -> Vec<String> {
    let mut out = Vec::new();
    while let Ok(msg) = receivers.outbound.try_recv() {
        out.push(msg.content);
    }
    out
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Turn loop
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn plain_reply_is_persisted() {
    let mut h = setup(ScriptedProvider::new(vec![text("Hello!")]), |_| {});
    let reply = h.runtime.process(&user_msg("hi")).await.unwrap().unwrap();
    assert_eq!((reply.channel.as_str(), reply.chat_id.as_str()), ("cli", "1"));
    assert_eq!(reply.content, "Hello!");

    let session = h.sessions.get_or_create("cli:1").await.unwrap();
    assert_eq!(session.messages.len(), 2);
    assert_eq!(session.messages[0].content.text(), Some("hi"));
    assert_eq!(session.messages[1].content.text(), Some("Hello!"));
    assert!(drain_outbound(&mut h.receivers).is_empty());
}

#[tokio::test]
async fn tool_calls_answered_in_order_before_next_call() {
    let mut first = calls(
        "Noting that.",
        &[
            ("append_daily", json!({ "content": "- user is moving to Lisbon" })),
            ("list_dir", json!({})),
        ],
    );
    let side = SideChannel {
        provider: "scripted".into(),
        payload: json!({ "reasoning_content": "should note the move" }),
    };
    first.side_channel = Some(side.clone());
    let provider = ScriptedProvider::new(vec![Step::Reply(first), text("Noted.")]);
    let mut h = setup(provider, |_| {});

    let reply = h.runtime.process(&user_msg("I'm moving to Lisbon")).await.unwrap().unwrap();
    assert_eq!(reply.content, "Noted.");

    let requests = h.provider.requests();
    assert_eq!(requests.len(), 2);

    // Catalog excludes the engine-only recall tool.
    let names: Vec<&str> = requests[0].tools.iter().map(|d| d.name.as_str()).collect();
    assert!(names.contains(&"append_daily"));
    assert!(!names.contains(&"memory_search"));

    let second = &requests[1].messages;
    let n = second.len();
    let assistant = &second[n - 3];
    assert_eq!(assistant.role, Role::Assistant);
    assert_eq!(assistant.tool_calls().len(), 2);
    assert_eq!(assistant.side_channel, Some(side));
    assert_eq!(second[n - 2].tool_result_id(), Some("call_0"));
    assert_eq!(second[n - 1].tool_result_id(), Some("call_1"));
    assert!(second[n - 2]
        .content
        .extract_all_text()
        .starts_with("Successfully appended to"));

    let notices = drain_outbound(&mut h.receivers);
    assert_eq!(
        notices,
        vec!["Noting that.\n\nCalling tools: append_daily, list_dir".to_string()]
    );

    h.runtime.recall().drain().await;
    assert!(h.memory.read_today().await.unwrap().contains("Lisbon"));
}

#[tokio::test]
async fn tool_failure_becomes_result_text() {
    let provider = ScriptedProvider::new(vec![
        Step::Reply(calls("", &[("no_such_tool", json!({}))])),
        text("Recovered."),
    ]);
    let h = setup(provider, |c| c.agent.tool_call_notices = false);
    let reply = h.runtime.process(&user_msg("go")).await.unwrap().unwrap();
    assert_eq!(reply.content, "Recovered.");

    let requests = h.provider.requests();
    let last = requests[1].messages.last().unwrap();
    assert_eq!(
        last.content.extract_all_text(),
        "Error: unknown tool 'no_such_tool'"
    );
}

#[tokio::test]
async fn empty_reply_retried_exactly_once() {
    let provider = ScriptedProvider::with_fallback(Vec::new(), ChatResponse::text("   "));
    let mut h = setup(provider, |_| {});

    let reply = h.runtime.process(&user_msg("hello?")).await.unwrap().unwrap();
    assert_eq!(reply.content, EMPTY_REPLY_NOTICE);

    let requests = h.provider.requests();
    assert_eq!(requests.len(), 2);
    let continues = requests[1]
        .messages
        .iter()
        .filter(|m| m.role == Role::User && m.content.text() == Some(CONTINUE_PROMPT))
        .count();
    assert_eq!(continues, 1);

    // The notice reaches the user; the continue prompt does not.
    assert_eq!(drain_outbound(&mut h.receivers), vec![EMPTY_REPLY_NOTICE.to_string()]);
}

#[tokio::test]
async fn iteration_cap_yields_fixed_replies() {
    let looping = calls("", &[("list_dir", json!({}))]);
    let provider = ScriptedProvider::with_fallback(Vec::new(), looping.clone());
    let h = setup(provider, |c| {
        c.agent.max_tool_iterations = 3;
        c.agent.tool_call_notices = false;
    });

    let reply = h.runtime.process(&user_msg("loop")).await.unwrap().unwrap();
    assert_eq!(reply.content, NO_CONTENT_REPLY);
    assert_eq!(h.provider.requests().len(), 3);

    let system = InboundMessage::new("system", "subagent", "cli:1", "task finished");
    let reply = h.runtime.process(&system).await.unwrap().unwrap();
    assert_eq!(reply.content, BACKGROUND_DONE_REPLY);
}

#[tokio::test]
async fn system_message_routes_to_origin_session() {
    let h = setup(ScriptedProvider::new(vec![text("Report delivered.")]), |_| {});
    let inbound = InboundMessage::new("system", "subagent", "cli:42", "scan complete");

    let reply = h.runtime.process(&inbound).await.unwrap().unwrap();
    assert_eq!(reply.channel, "cli");
    assert_eq!(reply.chat_id, "42");

    let session = h.sessions.get_or_create("cli:42").await.unwrap();
    assert_eq!(session.key, "cli:42");
    assert_eq!(
        session.messages[0].content.text(),
        Some("[System: subagent] scan complete")
    );
    assert!(!h.sessions.path_for("system:cli:42").exists());
}

#[tokio::test]
async fn blank_message_gets_no_reply() {
    let h = setup(ScriptedProvider::new(Vec::new()), |_| {});
    assert!(h.runtime.process(&user_msg("  ")).await.unwrap().is_none());
    assert!(h.provider.requests().is_empty());
}

#[tokio::test]
async fn process_direct_parses_session_key() {
    let h = setup(ScriptedProvider::new(vec![text("one"), text("two")]), |_| {});
    assert_eq!(h.runtime.process_direct("a", "telegram:5").await.unwrap(), "one");
    assert_eq!(h.runtime.process_direct("b", "solo").await.unwrap(), "two");

    assert_eq!(h.sessions.get_or_create("telegram:5").await.unwrap().messages.len(), 2);
    assert_eq!(h.sessions.get_or_create("cli:solo").await.unwrap().messages.len(), 2);
}

#[tokio::test]
async fn attached_image_is_sent_before_text() {
    let h = setup(ScriptedProvider::new(vec![text("A cat.")]), |_| {});
    let image = h._dir.path().join("cat.png");
    std::fs::write(&image, [0x89, b'P', b'N', b'G']).unwrap();

    let inbound = user_msg("what is this?").with_media(vec![image]);
    h.runtime.process(&inbound).await.unwrap();

    let requests = h.provider.requests();
    let user = requests[0].messages.last().unwrap();
    let wire = serde_json::to_string(&user.content).unwrap();
    let image_at = wire.find("data:image/png;base64,").unwrap();
    let text_at = wire.find("what is this?").unwrap();
    assert!(image_at < text_at);
}

#[tokio::test]
async fn cron_turn_carries_schedule_instruction() {
    let h = setup(ScriptedProvider::new(vec![text("Time's up!")]), |_| {});
    let inbound = InboundMessage::new("cron", "scheduler", "job-1", "Remind me to stretch");
    h.runtime.process(&inbound).await.unwrap();
    assert!(system_text(&h.provider.requests()[0]).contains("## Scheduled task"));
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Errors
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn transport_error_becomes_apology() {
    let dir = TempDir::new().unwrap();
    let config = base_config(dir.path());
    let h = harness(dir, config, ScriptedProvider::new(vec![Step::Fail("connection refused")]));

    let inbound = user_msg("hi");
    let err = h.runtime.process(&inbound).await.unwrap_err();
    assert!(err.is_transport());

    let Harness {
        runtime,
        bus,
        receivers,
        provider,
        ..
    } = h;
    provider.steps.lock().push_back(Step::Fail("connection refused"));
    let agent_loop = AgentLoop::new(Arc::new(runtime), receivers.inbound, bus.outbox());
    let reply = agent_loop.handle(&inbound).await.unwrap();
    assert_eq!(reply.chat_id, "1");
    assert_eq!(
        reply.content,
        "Sorry, I encountered an error: HTTP: connection refused"
    );
}

#[tokio::test]
async fn model_timeout_is_a_transport_error() {
    let h = setup(ScriptedProvider::new(vec![Step::Hang]), |c| {
        c.agent.model_timeout_secs = Some(1);
    });
    let err = h.runtime.process(&user_msg("hi")).await.unwrap_err();
    assert!(matches!(err, Error::Timeout(_)));
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Recall
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn recall_injected_into_system_prompt() {
    let h = setup(ScriptedProvider::new(vec![text("Oolong.")]), |_| {});
    h.memory
        .append_daily("- favourite tea is oolong, brewed at 90C")
        .await
        .unwrap();

    h.runtime.process(&user_msg("which tea do I like?")).await.unwrap();
    let system = system_text(&h.provider.requests()[0]);
    assert!(system.contains(RECALL_HEADER));
    assert!(system.contains("favourite tea is oolong"));
}

#[tokio::test]
async fn recall_absent_when_search_disabled() {
    let h = setup(ScriptedProvider::new(vec![text("Hi.")]), |c| {
        c.memory.search_enabled = false;
    });
    h.runtime.process(&user_msg("which tea do I like?")).await.unwrap();
    assert!(!system_text(&h.provider.requests()[0]).contains(RECALL_HEADER));
    assert!(h.runtime.tools().tags("memory_search").is_none());
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Compaction
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn compaction_trims_to_keep_recent_once() {
    let h = setup(ScriptedProvider::new(vec![text("S1")]), |c| {
        c.compaction.threshold_messages = 4;
        c.compaction.keep_recent = 2;
    });
    let mut session = seeded_session(&h.sessions, "cli:1", 6).await;

    assert!(h.runtime.compaction().maybe_compact(&mut session).await);
    assert_eq!(session.messages.len(), 2);
    assert_eq!(session.compaction_count, 1);
    assert_eq!(session.compaction_summary.as_deref(), Some("S1"));
    assert_eq!(session.messages[1].content.text(), Some("answer 5"));

    // Already within bounds: nothing to do.
    assert!(!h.runtime.compaction().maybe_compact(&mut session).await);
    assert_eq!(session.compaction_count, 1);
    assert_eq!(h.provider.requests().len(), 1);

    let stored = h.sessions.get_or_create("cli:1").await.unwrap();
    assert_eq!(stored.messages.len(), 2);
}

#[tokio::test]
async fn compaction_folds_prior_summary_into_input() {
    let h = setup(ScriptedProvider::new(vec![text("S2")]), |c| {
        c.compaction.threshold_messages = 2;
        c.compaction.keep_recent = 1;
    });
    let mut session = seeded_session(&h.sessions, "cli:1", 3).await;
    session.compaction_summary = Some("S1".into());

    h.runtime.compaction().maybe_compact(&mut session).await;
    let req = &h.provider.requests()[0];
    assert!(req.tools.is_empty());
    assert_eq!(req.temperature, Some(0.3));
    let input = req.messages[1].content.extract_all_text();
    assert!(input.starts_with("Summarize this conversation:\n\n[user]: Prior summary: S1"));
    assert!(input.contains("[assistant]: answer 1"));
    assert!(!input.contains("question 2"));
    assert_eq!(session.compaction_summary.as_deref(), Some("S2"));
}

#[tokio::test]
async fn failed_summary_keeps_previous_and_still_trims() {
    let h = setup(ScriptedProvider::new(vec![Step::Fail("overloaded")]), |c| {
        c.compaction.threshold_messages = 2;
        c.compaction.keep_recent = 1;
    });
    let mut session = seeded_session(&h.sessions, "cli:1", 3).await;
    session.compaction_summary = Some("old summary".into());

    assert!(h.runtime.compaction().maybe_compact(&mut session).await);
    assert_eq!(session.messages.len(), 1);
    assert_eq!(session.compaction_count, 1);
    assert_eq!(session.compaction_summary.as_deref(), Some("old summary"));
}

#[tokio::test]
async fn compaction_noop_when_keep_recent_covers_history() {
    let h = setup(ScriptedProvider::new(Vec::new()), |c| {
        c.compaction.threshold_messages = 2;
        c.compaction.keep_recent = 5;
    });
    let mut session = seeded_session(&h.sessions, "cli:1", 3).await;
    assert!(!h.runtime.compaction().maybe_compact(&mut session).await);
    assert_eq!(session.messages.len(), 3);
}

#[tokio::test]
async fn turn_compacts_before_building_context() {
    let provider = ScriptedProvider::new(vec![text("S1"), text("Sure.")]);
    let h = setup(provider, |c| {
        c.compaction.threshold_messages = 2;
        c.compaction.keep_recent = 1;
    });
    seeded_session(&h.sessions, "cli:1", 3).await;

    let reply = h.runtime.process(&user_msg("next")).await.unwrap().unwrap();
    assert_eq!(reply.content, "Sure.");

    let requests = h.provider.requests();
    assert_eq!(requests.len(), 2);
    let turn = &requests[1];
    assert!(system_text(turn).contains(&format!("{SUMMARY_HEADER}\n\nS1")));
    // system + one kept message + new user message
    assert_eq!(turn.messages.len(), 3);
    assert_eq!(turn.messages[1].content.text(), Some("question 2"));

    let session = h.sessions.get_or_create("cli:1").await.unwrap();
    assert_eq!(session.compaction_count, 1);
    assert_eq!(session.messages.len(), 3);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Memory flush
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn flush_runs_once_per_cycle() {
    let provider = ScriptedProvider::new(vec![text("NO_REPLY"), text("S1"), text("S2")]);
    let h = setup(provider, |c| {
        c.compaction.memory_flush = true;
        c.compaction.threshold_messages = 4;
        c.compaction.keep_recent = 2;
    });
    let mut session = seeded_session(&h.sessions, "cli:1", 6).await;

    assert!(h.runtime.compaction().maybe_compact(&mut session).await);
    assert!(!h.runtime.compaction().maybe_compact(&mut session).await);
    // flush + summary; the second call was a no-op.
    assert_eq!(h.provider.requests().len(), 2);
    assert!(system_text(&h.provider.requests()[0]).contains("memory flush"));
}

#[tokio::test]
async fn flushed_cycle_skips_flush() {
    let h = setup(ScriptedProvider::new(vec![text("S1")]), |c| {
        c.compaction.memory_flush = true;
        c.compaction.threshold_messages = 4;
        c.compaction.keep_recent = 2;
    });
    let mut session = seeded_session(&h.sessions, "cli:1", 6).await;
    session.mark_flushed();

    assert!(h.runtime.compaction().maybe_compact(&mut session).await);
    let requests = h.provider.requests();
    assert_eq!(requests.len(), 1);
    assert!(system_text(&requests[0]).contains("summarization assistant"));
    // A new cycle opens after compaction.
    assert!(session.needs_flush());
}

#[tokio::test]
async fn flush_writes_fallback_note_when_model_declines() {
    let h = setup(ScriptedProvider::new(vec![text("Nothing worth keeping.")]), |_| {});
    let mut session = seeded_session(&h.sessions, "cli:1", 3).await;

    h.runtime
        .compaction()
        .flush_runner()
        .flush(&mut session)
        .await
        .unwrap();

    let note = h.memory.read_today().await.unwrap();
    assert!(note.contains("conversation reached compaction threshold (3 messages)"));
    assert!(!session.needs_flush());
    assert!(!h.sessions.get_or_create("cli:1").await.unwrap().needs_flush());
}

#[tokio::test]
async fn flush_uses_memory_tools_only() {
    let provider = ScriptedProvider::new(vec![
        Step::Reply(calls(
            "",
            &[("append_daily", json!({ "content": "- decided on plan B" }))],
        )),
        text("no_reply"),
    ]);
    let h = setup(provider, |_| {});
    let mut session = seeded_session(&h.sessions, "cli:1", 2).await;

    h.runtime
        .compaction()
        .flush_runner()
        .flush(&mut session)
        .await
        .unwrap();

    let requests = h.provider.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].temperature, Some(0.3));
    let names: Vec<&str> = requests[0].tools.iter().map(|d| d.name.as_str()).collect();
    assert!(names.contains(&"remember_core"));
    assert!(names.contains(&"read_file"));
    assert!(!names.contains(&"write_file"));
    assert!(!names.contains(&"message"));

    let note = h.memory.read_today().await.unwrap();
    assert!(note.contains("decided on plan B"));
    assert!(!note.contains("compaction threshold"));
}

#[tokio::test]
async fn flush_failure_does_not_block_compaction() {
    let provider = ScriptedProvider::new(vec![Step::Fail("flush down"), text("S1")]);
    let h = setup(provider, |c| {
        c.compaction.memory_flush = true;
        c.compaction.threshold_messages = 2;
        c.compaction.keep_recent = 1;
    });
    let mut session = seeded_session(&h.sessions, "cli:1", 3).await;

    assert!(h.runtime.compaction().maybe_compact(&mut session).await);
    assert_eq!(session.messages.len(), 1);
    assert_eq!(session.compaction_summary.as_deref(), Some("S1"));
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Reindex triggers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Index that never finds anything and counts rebuild requests.
#[derive(Default)]
struct CountingIndex {
    reindexes: AtomicUsize,
}

#[async_trait]
impl RecallIndex for CountingIndex {
    async fn search(&self, _query: &str, _k: usize) -> Result<Vec<RecallHit>> {
        Ok(Vec::new())
    }

    async fn reindex(&self) -> Result<usize> {
        self.reindexes.fetch_add(1, Ordering::SeqCst);
        Ok(0)
    }
}

fn counting_setup(provider: Arc<ScriptedProvider>) -> (Harness, Arc<CountingIndex>) {
    let dir = TempDir::new().unwrap();
    let config = base_config(dir.path());
    let index = Arc::new(CountingIndex::default());
    let shared = index.clone();
    let h = build(
        dir,
        config,
        provider,
        move |_, _| Some(shared as Arc<dyn RecallIndex>),
        |store| store as Arc<dyn SessionStore>,
    );
    (h, index)
}

#[tokio::test]
async fn memory_write_turn_reindexes_once() {
    let provider = ScriptedProvider::new(vec![
        Step::Reply(calls(
            "",
            &[
                ("remember_core", json!({ "content": "- prefers green tea" })),
                ("append_daily", json!({ "content": "- asked about tea" })),
            ],
        )),
        text("Saved."),
    ]);
    let (h, index) = counting_setup(provider);

    h.runtime.process(&user_msg("remember my tea")).await.unwrap();
    h.runtime.recall().drain().await;
    assert_eq!(index.reindexes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn read_only_turn_does_not_reindex() {
    let provider = ScriptedProvider::new(vec![
        Step::Reply(calls("", &[("list_dir", json!({}))])),
        text("Here."),
    ]);
    let (h, index) = counting_setup(provider);

    h.runtime.process(&user_msg("what files are there?")).await.unwrap();
    h.runtime.recall().drain().await;
    assert_eq!(index.reindexes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn every_flush_reindexes() {
    let provider = ScriptedProvider::with_fallback(Vec::new(), ChatResponse::text("NO_REPLY"));
    let (h, index) = counting_setup(provider);
    let mut session = seeded_session(&h.sessions, "cli:1", 2).await;
    let runner = h.runtime.compaction().flush_runner();

    runner.flush(&mut session).await.unwrap();
    h.runtime.recall().drain().await;
    assert_eq!(index.reindexes.load(Ordering::SeqCst), 1);

    runner.flush(&mut session).await.unwrap();
    h.runtime.recall().drain().await;
    assert_eq!(index.reindexes.load(Ordering::SeqCst), 2);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session durability
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// File store whose first load fails with an I/O error.
struct FailFirstLoad {
    inner: Arc<FileSessionStore>,
    failed: AtomicBool,
}

#[async_trait]
impl SessionStore for FailFirstLoad {
    async fn get_or_create(&self, key: &str) -> Result<Session> {
        if !self.failed.swap(true, Ordering::SeqCst) {
            return Err(Error::Io(std::io::Error::other("EIO")));
        }
        self.inner.get_or_create(key).await
    }

    async fn save(&self, session: &Session) -> Result<()> {
        self.inner.save(session).await
    }
}

#[tokio::test]
async fn unreadable_session_is_not_overwritten() {
    let dir = TempDir::new().unwrap();
    let config = base_config(dir.path());
    let state = config.sessions.state_path.clone();
    let provider = ScriptedProvider::new(vec![text("Hi."), text("Hi again.")]);
    let h = build(
        dir,
        config,
        provider,
        |_, _| None,
        |store| {
            Arc::new(FailFirstLoad {
                inner: store,
                failed: AtomicBool::new(false),
            }) as Arc<dyn SessionStore>
        },
    );
    seeded_session(&h.sessions, "cli:1", 10).await;

    // The turn still answers.
    let reply = h.runtime.process(&user_msg("hi")).await.unwrap().unwrap();
    assert_eq!(reply.content, "Hi.");

    let on_disk = FileSessionStore::new(&state).unwrap();
    assert_eq!(on_disk.get_or_create("cli:1").await.unwrap().messages.len(), 10);

    // Once loads work again the history continues where it left off.
    h.runtime.process(&user_msg("hi")).await.unwrap();
    let on_disk = FileSessionStore::new(&state).unwrap();
    assert_eq!(on_disk.get_or_create("cli:1").await.unwrap().messages.len(), 12);
}
