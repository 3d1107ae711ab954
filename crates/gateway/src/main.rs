use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use mn_domain::config::{Config, LogFormat, ObservabilityConfig};
use mn_domain::envelope::InboundMessage;
use mn_gateway::bootstrap;
use mn_gateway::bus::{AgentLoop, MessageBus};
use mn_gateway::cli::{Cli, Command, ConfigCommand, MemoryCommand};

/// Chat id used for lines read from stdin by `serve`.
const CONSOLE_CHAT_ID: &str = "console";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        // Default to serve when no subcommand is given.
        None | Some(Command::Serve) => {
            let (config, _) = mn_gateway::cli::load_config()?;
            init_tracing(&config.observability);
            serve(Arc::new(config)).await
        }
        Some(Command::Run { message, session }) => {
            init_cli_tracing();
            let (config, _) = mn_gateway::cli::load_config()?;
            mn_gateway::cli::run::run(Arc::new(config), message, session).await
        }
        Some(Command::Chat { session }) => {
            init_cli_tracing();
            let (config, _) = mn_gateway::cli::load_config()?;
            mn_gateway::cli::chat::chat(Arc::new(config), session).await
        }
        Some(Command::Memory(cmd)) => {
            init_cli_tracing();
            let (config, _) = mn_gateway::cli::load_config()?;
            match cmd {
                MemoryCommand::Search { query, top_k } => {
                    mn_gateway::cli::memory::search(&config, &query, top_k).await
                }
                MemoryCommand::Reindex => mn_gateway::cli::memory::reindex(&config).await,
                MemoryCommand::Organize => mn_gateway::cli::memory::organize(&config).await,
            }
        }
        Some(Command::Config(ConfigCommand::Validate)) => {
            let (config, config_path) = mn_gateway::cli::load_config()?;
            if !mn_gateway::cli::config::validate(&config, &config_path) {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Show)) => {
            let (config, _) = mn_gateway::cli::load_config()?;
            mn_gateway::cli::config::show(&config)
        }
        Some(Command::Version) => {
            println!("mnemo {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Structured tracing for the long-running `serve` command. `RUST_LOG`
/// overrides the configured default filter.
fn init_tracing(obs: &ObservabilityConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&obs.default_filter));

    // stdout carries replies, so logs always go to stderr.
    match obs.log_format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Compact => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().compact().with_writer(std::io::stderr))
            .init(),
    }
}

/// Compact stderr-only tracing for CLI commands. Defaults to `warn` so
/// diagnostics do not drown the conversation.
fn init_cli_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

/// Feed stdin lines into the bus as `cli:console` messages, run the serial
/// consumer, and print every outbound message.
async fn serve(config: Arc<Config>) -> anyhow::Result<()> {
    tracing::info!("mnemo starting");

    let (bus, receivers) = MessageBus::new(256);
    let runtime = Arc::new(bootstrap::build_runtime(config.clone(), bus.outbox())?);
    let recall = runtime.recall().clone();
    let shutdown = CancellationToken::new();

    // ── Reply printer ────────────────────────────────────────────────
    let mut outbound = receivers.outbound;
    let printer = tokio::spawn(async move {
        while let Some(msg) = outbound.recv().await {
            println!("[{}:{}] {}", msg.channel, msg.chat_id, msg.content);
        }
    });

    // ── Stdin reader ─────────────────────────────────────────────────
    // Owns the only inbound producer; EOF closes the queue and lets the
    // loop drain what is left.
    let reader_bus = bus.clone();
    let channel = config.agent.default_channel.clone();
    let reader = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => {
                    let msg = InboundMessage::new(&channel, "user", CONSOLE_CHAT_ID, line);
                    if reader_bus.publish_inbound(msg).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "stdin read failed");
                    break;
                }
            }
        }
    });

    // ── Ctrl-C ───────────────────────────────────────────────────────
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("received SIGINT, shutting down");
            signal_token.cancel();
        }
    });

    let agent_loop = AgentLoop::new(runtime, receivers.inbound, bus.outbox());
    drop(bus);
    agent_loop.run(shutdown).await;

    reader.abort();
    recall.drain().await;
    let _ = printer.await;
    tracing::info!("shutdown complete");
    Ok(())
}
