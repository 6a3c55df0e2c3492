//! Interactive terminal client for a streaming chatbot backend.
//!
//! # Usage
//!
//! ```bash
//! # Token for both the REST API and the streaming endpoint
//! export PARLEY_AUTH_TOKEN=...
//!
//! # Defaults to a backend on localhost:8000
//! parley-chat --chatbot support-bot
//!
//! # Point at another backend
//! parley-chat --api-base https://chat.example.com/api/ --ws-base wss://chat.example.com/ws/chat/
//! ```
//!
//! # Commands
//!
//! - `/bot <id> [name]` - Load a chatbot
//! - `/list` - List its conversations
//! - `/open <id>` - Open a conversation
//! - `/new` - Start a new conversation
//! - `/help` - Show all commands
//! - `/quit` - Exit the application

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use arrrg::CommandLine;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing_subscriber::EnvFilter;

use parley::chat::{
    ChatArgs, ChatCommand, ChatConfig, PlainTextRenderer, Renderer, help_text, parse_command,
};
use parley::{
    CollectingSink, ConversationStore, EnvCredentials, HttpSessionService, LoadedChatbot,
    StoreUpdate, WebSocketConnector,
};

/// How often the response pump checks for Ctrl+C.
const INTERRUPT_POLL: Duration = Duration::from_millis(100);

/// Main entry point for the parley-chat application.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let (args, _) = ChatArgs::from_command_line_relaxed("parley-chat [OPTIONS]");
    let config = ChatConfig::from(args);

    let credentials = Arc::new(EnvCredentials::new());
    let service = HttpSessionService::with_options(
        credentials.clone(),
        config.api_base.clone(),
        Duration::from_secs(30),
    )?;
    let sink = Arc::new(CollectingSink::new());
    let store = ConversationStore::with_config(
        Arc::new(service),
        Arc::new(WebSocketConnector::new()),
        credentials,
        sink.clone(),
        config.connection.clone(),
        config.store.clone(),
    );
    let mut renderer = PlainTextRenderer::with_color(config.use_color);
    let mut rl = DefaultEditor::new()?;

    let interrupted = Arc::new(AtomicBool::new(false));
    let interrupted_clone = interrupted.clone();
    ctrlc::set_handler(move || {
        interrupted_clone.store(true, Ordering::Relaxed);
    })?;

    println!("parley chat");
    println!("Type /help for commands, /quit to exit\n");

    if let Some(id) = config.chatbot.clone() {
        load_chatbot(&store, &mut renderer, id, None).await;
    }

    loop {
        interrupted.store(false, Ordering::Relaxed);

        let prompt = match store.chatbot() {
            Some(chatbot) => format!("{}> ", chatbot.name),
            None => "> ".to_string(),
        };
        let readline = rl.readline(&prompt);

        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(line);

                // Apply anything that arrived while we waited for input.
                let updates = store.drain_events();
                show_reports(&sink, &mut renderer);
                if updates
                    .iter()
                    .any(|u| matches!(u, StoreUpdate::Disconnected { .. }))
                {
                    renderer.print_info("Connection closed. Use /open or /new to reconnect.");
                }

                if let Some(cmd) = parse_command(line) {
                    match cmd {
                        ChatCommand::Quit => {
                            store.reset();
                            println!("Goodbye!");
                            break;
                        }
                        ChatCommand::Help => {
                            for line in help_text().lines() {
                                println!("    {}", line);
                            }
                        }
                        ChatCommand::Bot { id, name } => {
                            load_chatbot(&store, &mut renderer, id, name).await;
                        }
                        ChatCommand::List => match store.refresh_history().await {
                            Ok(history) => renderer.print_history(&history),
                            Err(err) => renderer.print_error(&err.to_string()),
                        },
                        ChatCommand::Open(id) => match store.open_conversation(&id).await {
                            Ok(session) => {
                                for message in store.messages() {
                                    renderer.print_message(&message);
                                }
                                renderer.print_info(&format!(
                                    "Opened conversation {}.",
                                    session.conversation_id
                                ));
                            }
                            Err(err) => renderer.print_error(&err.to_string()),
                        },
                        ChatCommand::New => match store.open_new_conversation().await {
                            Ok(session) => renderer.print_info(&format!(
                                "Started conversation {}.",
                                session.conversation_id
                            )),
                            Err(err) => renderer.print_error(&err.to_string()),
                        },
                        ChatCommand::Show => {
                            let messages = store.messages();
                            if messages.is_empty() {
                                renderer.print_info("No messages.");
                            }
                            for message in messages {
                                renderer.print_message(&message);
                            }
                        }
                        ChatCommand::Disconnect => {
                            store.disconnect();
                            renderer.print_info("Disconnected.");
                        }
                        ChatCommand::Reset => {
                            store.reset();
                            renderer.print_info("Reset.");
                        }
                        ChatCommand::Invalid(message) => renderer.print_error(&message),
                    }
                    continue;
                }

                if let Err(err) = store.send_message(line) {
                    renderer.print_error(&err.to_string());
                    continue;
                }
                pump_response(&store, &sink, &mut renderer, &interrupted).await;
            }
            Err(ReadlineError::Interrupted) => {
                // Ctrl+C at prompt - soft interrupt
                println!();
                continue;
            }
            Err(ReadlineError::Eof) => {
                // Ctrl+D - exit
                store.reset();
                println!("\nGoodbye!");
                break;
            }
            Err(err) => {
                renderer.print_error(&format!("Input error: {}", err));
                break;
            }
        }
    }

    Ok(())
}

async fn load_chatbot(
    store: &ConversationStore,
    renderer: &mut PlainTextRenderer,
    id: String,
    name: Option<String>,
) {
    let name = name.unwrap_or_else(|| id.clone());
    store.set_loaded_chatbot(LoadedChatbot::new(id, name.clone()));
    renderer.print_info(&format!("Loaded chatbot {name}."));
    match store.refresh_history().await {
        Ok(history) => renderer.print_history(&history),
        Err(err) => renderer.print_error(&err.to_string()),
    }
}

/// Print agent chunks until the response completes, the connection drops, or the user
/// presses Ctrl+C.
async fn pump_response(
    store: &ConversationStore,
    sink: &CollectingSink,
    renderer: &mut PlainTextRenderer,
    interrupted: &AtomicBool,
) {
    while store.is_thinking() {
        if interrupted.load(Ordering::Relaxed) {
            renderer.print_info("\n[interrupted]");
            break;
        }
        let update = match tokio::time::timeout(INTERRUPT_POLL, store.next_event()).await {
            Ok(Some(update)) => update,
            Ok(None) => break,
            Err(_) => continue,
        };
        match update {
            StoreUpdate::Chunk { text } => renderer.print_chunk(&text),
            StoreUpdate::Completed { .. } => {
                store.mark_streaming_complete();
                renderer.finish_response();
            }
            StoreUpdate::Disconnected { .. } => {
                renderer.print_info("Connection closed. Use /open or /new to reconnect.");
            }
            StoreUpdate::Reported { .. } | StoreUpdate::Ignored => {}
        }
        show_reports(sink, renderer);
    }
}

fn show_reports(sink: &CollectingSink, renderer: &mut PlainTextRenderer) {
    for (severity, message) in sink.take() {
        renderer.print_report(severity, &message);
    }
}
