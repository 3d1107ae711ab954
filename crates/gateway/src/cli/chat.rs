//! `mnemo chat` — interactive REPL command.
//!
//! Readline loop that sends each line through the turn engine. Supports a
//! few slash-commands for session switching and screen handling.

use std::sync::Arc;

use mn_domain::config::Config;

use crate::bootstrap;
use crate::bus::MessageBus;
use crate::runtime::AgentRuntime;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Public entry point
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn chat(config: Arc<Config>, mut session_key: String) -> anyhow::Result<()> {
    let (bus, mut receivers) = MessageBus::new(64);
    let runtime = bootstrap::build_runtime(config, bus.outbox())?;

    // Notices and `message` tool output, dimmed on stderr.
    tokio::spawn(async move {
        while let Some(msg) = receivers.outbound.recv().await {
            eprintln!("\x1B[2m{}\x1B[0m", msg.content);
        }
    });

    let history_path = dirs::home_dir()
        .unwrap_or_default()
        .join(".mnemo")
        .join("chat_history.txt");
    if let Some(parent) = history_path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let mut rl = rustyline::DefaultEditor::new()?;
    let _ = rl.load_history(&history_path);

    eprintln!("mnemo interactive chat");
    eprintln!("Session: {session_key}  |  Type /help for commands, Ctrl+D to exit");
    eprintln!();

    loop {
        match rl.readline("you> ") {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                rl.add_history_entry(&line).ok();

                if trimmed.starts_with('/') {
                    if handle_slash_command(trimmed, &mut session_key) {
                        break;
                    }
                    continue;
                }

                send_message(&runtime, &session_key, trimmed).await;
            }
            Err(rustyline::error::ReadlineError::Interrupted) => {
                eprintln!("(Use Ctrl+D or /exit to quit)");
            }
            Err(rustyline::error::ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("\x1B[31mreadline error: {e}\x1B[0m");
                break;
            }
        }
    }

    rl.save_history(&history_path).ok();
    runtime.recall().drain().await;
    eprintln!("Goodbye!");
    Ok(())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Slash command handling
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Process a slash command. Returns `true` if the REPL should exit.
fn handle_slash_command(input: &str, session_key: &mut String) -> bool {
    let (cmd, arg) = match input.split_once(' ') {
        Some((cmd, arg)) => (cmd, Some(arg.trim())),
        None => (input, None),
    };

    match cmd {
        "/exit" | "/quit" => return true,

        "/session" => {
            if let Some(name) = arg.filter(|s| !s.is_empty()) {
                *session_key = name.to_string();
                eprintln!("Session switched to: {session_key}");
            } else {
                eprintln!("Current session: {session_key}");
                eprintln!("Usage: /session <channel:chat_id>");
            }
        }

        "/clear" => {
            eprint!("\x1B[2J\x1B[1;1H");
        }

        "/reset" => {
            let ts = chrono::Utc::now().timestamp();
            *session_key = format!("{session_key}-{ts}");
            eprintln!("Session reset. New session key: {session_key}");
        }

        "/help" => {
            eprintln!("Commands:");
            eprintln!("  /session <key>   Switch to another session (channel:chat_id)");
            eprintln!("  /clear           Clear the screen");
            eprintln!("  /reset           Start a fresh session (new key)");
            eprintln!("  /exit, /quit     Exit the chat");
            eprintln!("  /help            Show this help");
        }

        other => {
            eprintln!("Unknown command: {other}  (type /help for a list)");
        }
    }

    false
}

async fn send_message(runtime: &AgentRuntime, session_key: &str, text: &str) {
    match runtime.process_direct(text, session_key).await {
        Ok(reply) => {
            println!("{reply}");
            println!();
        }
        Err(e) => eprintln!("\x1B[31merror: {e}\x1B[0m"),
    }
}
