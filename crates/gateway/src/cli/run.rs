//! `mnemo run` — one-shot execution command.
//!
//! Sends a single message through the full turn engine, prints the reply to
//! stdout, and exits. Progress notices go to stderr.

use std::sync::Arc;

use mn_domain::config::Config;

use crate::bootstrap;
use crate::bus::MessageBus;

pub async fn run(config: Arc<Config>, message: String, session_key: String) -> anyhow::Result<()> {
    let (bus, mut receivers) = MessageBus::new(64);
    let runtime = bootstrap::build_runtime(config, bus.outbox())?;

    let notices = tokio::spawn(async move {
        while let Some(msg) = receivers.outbound.recv().await {
            eprintln!("\x1b[2m{}\x1b[0m", msg.content);
        }
    });

    let result = runtime.process_direct(&message, &session_key).await;

    // Let any reindex started by the turn land before exiting.
    runtime.recall().drain().await;
    drop(runtime);
    drop(bus);
    let _ = notices.await;

    println!("{}", result?);
    Ok(())
}
