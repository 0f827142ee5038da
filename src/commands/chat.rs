//! Interactive chat shell
//!
//! Loads the conversation manager, then runs a readline loop. Plain input
//! is appended to the current conversation as a user message; slash
//! commands manage conversations. Reply text is printed as it streams in by
//! a renderer task consuming the manager's [`ChatEvent`]s.

use crate::commands::special_commands::{parse_special_command, print_help, SpecialCommand};
use crate::config::Config;
use crate::conversation::{Attachment, Conversation, Role};
use crate::error::Result;
use crate::events::{ChatEvent, Notification, NotificationLevel};
use crate::generation::{HttpGenerator, ScriptedGenerator, TextGenerator};
use crate::manager::ConversationManager;
use crate::storage::open_store;
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};

/// Start interactive chat
///
/// # Arguments
///
/// * `config` - Global configuration
/// * `offline` - Answer with the built-in scripted generator
/// * `conversation` - Conversation to open (full id or prefix) instead of the saved one
///
/// # Errors
///
/// Returns an error if storage cannot be opened, the generator cannot be
/// built, or the requested conversation does not exist.
pub async fn run_chat(config: Config, offline: bool, conversation: Option<String>) -> Result<()> {
    tracing::info!(offline, "Starting interactive chat");

    let generator: Arc<dyn TextGenerator> = if offline {
        Arc::new(ScriptedGenerator::new().with_delay(Duration::from_millis(40)))
    } else {
        Arc::new(HttpGenerator::new(&config.generation)?)
    };

    let store = open_store(&config.storage)?;
    let (tx, rx) = mpsc::unbounded_channel();
    let mut manager = ConversationManager::load(store, generator, &config)?.with_events(tx);

    if let Some(requested) = conversation {
        let id = manager.resolve_id(&requested)?;
        manager.set_current_conversation(&id)?;
    }

    let reply_done = Arc::new(Notify::new());
    let renderer = tokio::spawn(render_events(rx, Arc::clone(&reply_done)));

    let mut rl = DefaultEditor::new()?;
    let mut pending: Vec<Attachment> = Vec::new();

    print_welcome_banner(&manager, offline);

    loop {
        let prompt = format_prompt(&manager, pending.len());
        match rl.readline(&prompt) {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                rl.add_history_entry(trimmed)?;

                let command = match parse_special_command(trimmed) {
                    Ok(command) => command,
                    Err(e) => {
                        eprintln!("{}", e.to_string().red());
                        continue;
                    }
                };

                match command {
                    SpecialCommand::Exit => break,
                    SpecialCommand::None => {
                        let attachments = std::mem::take(&mut pending);
                        match manager
                            .append_message(trimmed, Role::User, attachments)
                            .await
                        {
                            Ok(()) => reply_done.notified().await,
                            Err(e) => eprintln!("{}", format!("Error: {}", e).red()),
                        }
                    }
                    other => {
                        if let Err(e) = handle_command(&mut manager, other, &mut pending, &config)
                        {
                            eprintln!("{}", format!("Error: {}", e).red());
                        }
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("CTRL-C");
                break;
            }
            Err(ReadlineError::Eof) => {
                println!("CTRL-D");
                break;
            }
            Err(err) => {
                eprintln!("Error: {:?}", err);
                break;
            }
        }
    }

    // Closing the manager drops the event sender, which ends the renderer.
    manager.close()?;
    if let Err(e) = renderer.await {
        tracing::warn!("Renderer task failed: {}", e);
    }

    println!("Goodbye!");
    Ok(())
}

fn handle_command(
    manager: &mut ConversationManager,
    command: SpecialCommand,
    pending: &mut Vec<Attachment>,
    config: &Config,
) -> Result<()> {
    match command {
        SpecialCommand::New => {
            manager.create_conversation()?;
            println!("{}", "Started a new conversation".green());
        }
        SpecialCommand::List => print_conversation_list(manager),
        SpecialCommand::Switch(prefix) => {
            let id = manager.resolve_id(&prefix)?;
            manager.set_current_conversation(&id)?;
            if let Some(conversation) = manager.current_conversation() {
                print_transcript(conversation);
            }
        }
        SpecialCommand::Delete(prefix) => {
            let id = manager.resolve_id(&prefix)?;
            manager.delete_conversation(&id)?;
            println!("{}", format!("Deleted conversation {}", short_id(&id)).green());
        }
        SpecialCommand::Search(query) => {
            let results = manager.search_conversations(&query);
            if results.is_empty() {
                println!("{}", format!("No conversations match \"{}\"", query).yellow());
            }
            for conversation in results {
                println!(
                    "  {}  {}",
                    short_id(conversation.id()).cyan(),
                    conversation.title()
                );
            }
        }
        SpecialCommand::Attach(path) => {
            let attachment = Attachment::from_path(&path, config.chat.max_attachment_bytes)?;
            println!(
                "{}",
                format!(
                    "Attached {} ({}, {} bytes) to your next message",
                    attachment.name, attachment.mime_type, attachment.size
                )
                .green()
            );
            pending.push(attachment);
        }
        SpecialCommand::Show => {
            if let Some(conversation) = manager.current_conversation() {
                print_transcript(conversation);
            }
        }
        SpecialCommand::Help => print_help(),
        SpecialCommand::Exit | SpecialCommand::None => {}
    }
    Ok(())
}

/// Prints streamed text and notifications as they arrive
///
/// `reply_done` is signalled once per finished (or failed) reply so the
/// prompt is not redrawn in the middle of the output.
async fn render_events(mut rx: mpsc::UnboundedReceiver<ChatEvent>, reply_done: Arc<Notify>) {
    while let Some(event) = rx.recv().await {
        match event {
            ChatEvent::GenerationStarted { .. } => {
                print!("{} ", "assistant>".magenta().bold());
                let _ = std::io::stdout().flush();
            }
            ChatEvent::StreamDelta { delta, .. } => {
                print!("{}", delta);
                let _ = std::io::stdout().flush();
            }
            ChatEvent::GenerationFinished { .. } => {
                println!("\n");
                reply_done.notify_one();
            }
            ChatEvent::GenerationFailed { .. } => {
                println!();
                reply_done.notify_one();
            }
            ChatEvent::Notified(notification) => print_notification(&notification),
            _ => {}
        }
    }
}

fn print_notification(notification: &Notification) {
    let text = notification.to_string();
    match notification.level {
        NotificationLevel::Error => eprintln!("{}", text.red()),
        NotificationLevel::Warning => eprintln!("{}", text.yellow()),
        NotificationLevel::Info => eprintln!("{}", text.cyan()),
    }
}

fn print_welcome_banner(manager: &ConversationManager, offline: bool) {
    println!("\n{}", "Parley interactive chat".bold());
    if offline {
        println!("{}", "Offline mode: replies are echoed locally".yellow());
    }
    if let Some(conversation) = manager.current_conversation() {
        println!(
            "Conversation: {} ({})",
            conversation.title().cyan(),
            short_id(conversation.id())
        );
        if !conversation.messages().is_empty() {
            print_transcript(conversation);
        }
    }
    println!("Type '/help' for available commands, '/exit' to quit\n");
}

fn print_conversation_list(manager: &ConversationManager) {
    let current = manager.current_id();
    for conversation in manager.conversations() {
        let marker = if Some(conversation.id()) == current {
            "*"
        } else {
            " "
        };
        println!(
            "{} {}  {}  ({} messages)",
            marker.green(),
            short_id(conversation.id()).cyan(),
            conversation.title(),
            conversation.messages().len()
        );
    }
}

fn print_transcript(conversation: &Conversation) {
    println!("\n{}", format!("== {} ==", conversation.title()).bold());
    for message in conversation.messages() {
        let label = match message.role {
            Role::User => "you>".green().bold(),
            Role::Assistant => "assistant>".magenta().bold(),
            Role::System => "system>".dimmed(),
        };
        println!("{} {}", label, message.content);
        for attachment in &message.attachments {
            println!("    {} {}", "attached:".dimmed(), attachment.name);
        }
    }
    println!();
}

fn format_prompt(manager: &ConversationManager, pending: usize) -> String {
    let title = manager
        .current_conversation()
        .map(|c| c.title().to_string())
        .unwrap_or_default();
    if pending > 0 {
        format!("[{}] (+{} file) you> ", title, pending)
    } else {
        format!("[{}] you> ", title)
    }
}

/// First eight characters of an id
pub(crate) fn short_id(id: &str) -> &str {
    id.char_indices().nth(8).map(|(i, _)| &id[..i]).unwrap_or(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn offline_manager() -> ConversationManager {
        ConversationManager::load(
            Box::new(MemoryStore::new()),
            Arc::new(ScriptedGenerator::new()),
            &Config::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_short_id() {
        assert_eq!(short_id("0123456789abcdef"), "01234567");
        assert_eq!(short_id("abc"), "abc");
    }

    #[test]
    fn test_format_prompt_shows_title_and_pending_files() {
        let manager = offline_manager();
        assert_eq!(format_prompt(&manager, 0), "[New Conversation] you> ");
        assert_eq!(format_prompt(&manager, 2), "[New Conversation] (+2 file) you> ");
    }

    #[test]
    fn test_handle_command_new_and_delete() {
        let mut manager = offline_manager();
        let config = Config::default();
        let mut pending = Vec::new();

        handle_command(&mut manager, SpecialCommand::New, &mut pending, &config).unwrap();
        assert_eq!(manager.conversations().len(), 2);

        let id = manager.current_id().unwrap().to_string();
        handle_command(
            &mut manager,
            SpecialCommand::Delete(id[..8].to_string()),
            &mut pending,
            &config,
        )
        .unwrap();
        assert_eq!(manager.conversations().len(), 1);
    }

    #[test]
    fn test_handle_command_attach_queues_file() {
        let mut manager = offline_manager();
        let config = Config::default();
        let mut pending = Vec::new();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "hello").unwrap();

        handle_command(
            &mut manager,
            SpecialCommand::Attach(path),
            &mut pending,
            &config,
        )
        .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].name, "notes.txt");
    }

    #[test]
    fn test_handle_command_switch_unknown_fails() {
        let mut manager = offline_manager();
        let config = Config::default();
        let mut pending = Vec::new();
        assert!(handle_command(
            &mut manager,
            SpecialCommand::Switch("nope".to_string()),
            &mut pending,
            &config
        )
        .is_err());
    }

    #[tokio::test]
    async fn test_renderer_signals_reply_completion() {
        let (tx, rx) = mpsc::unbounded_channel();
        let done = Arc::new(Notify::new());
        let handle = tokio::spawn(render_events(rx, Arc::clone(&done)));

        tx.send(ChatEvent::GenerationFinished {
            conversation_id: "c".to_string(),
            message_id: "m".to_string(),
            content: "hi".to_string(),
        })
        .unwrap();
        done.notified().await;

        drop(tx);
        handle.await.unwrap();
    }
}
