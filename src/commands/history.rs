//! Conversation history commands
//!
//! These work on the store directly rather than through the manager, so
//! listing an empty history does not create a conversation.

use crate::cli::HistoryCommand;
use crate::commands::chat::short_id;
use crate::config::Config;
use crate::conversation::{find_by_prefix, group_by_month, search, Conversation};
use crate::error::{ParleyError, Result};
use crate::storage::{open_store, ConversationStore};
use colored::Colorize;
use prettytable::{format, Table};

const TITLE_WIDTH: usize = 40;

/// Handle history commands
pub fn handle_history(command: HistoryCommand, config: &Config) -> Result<()> {
    let store = open_store(&config.storage)?;

    match command {
        HistoryCommand::List => list_history(store.as_ref())?,
        HistoryCommand::Delete { id } => {
            let deleted = delete_history(store.as_ref(), &id)?;
            println!(
                "{}",
                format!("Deleted conversation {}", short_id(&deleted)).green()
            );
        }
        HistoryCommand::Search { query } => search_history(store.as_ref(), &query)?,
    }

    Ok(())
}

fn list_history(store: &dyn ConversationStore) -> Result<()> {
    let conversations = store.load_all()?;
    if conversations.is_empty() {
        println!("{}", "No conversation history found.".yellow());
        return Ok(());
    }

    let current = store.load_current_id()?;
    println!("\nConversation History:");
    for group in group_by_month(&conversations) {
        println!("\n{}", group.label().bold());
        let table = history_table(group.conversations.into_iter(), current.as_deref());
        table.printstd();
    }
    println!();
    println!(
        "Use {} to resume a conversation.",
        "parley chat --conversation <ID>".cyan()
    );
    println!();
    Ok(())
}

fn search_history(store: &dyn ConversationStore, query: &str) -> Result<()> {
    let conversations = store.load_all()?;
    let results = search(&conversations, query);
    if results.is_empty() {
        println!(
            "{}",
            format!("No conversations match \"{}\"", query).yellow()
        );
        return Ok(());
    }

    let current = store.load_current_id()?;
    println!("\nConversations matching \"{}\":", query);
    history_table(results.into_iter(), current.as_deref()).printstd();
    println!();
    Ok(())
}

/// Deletes the conversation matching `id_or_prefix` and returns its full id
///
/// When the deleted conversation was the saved selection, the selection
/// moves to the first remaining conversation (or is cleared).
fn delete_history(store: &dyn ConversationStore, id_or_prefix: &str) -> Result<String> {
    let conversations = store.load_all()?;
    let id = find_by_prefix(&conversations, id_or_prefix)
        .map(|c| c.id().to_string())
        .ok_or_else(|| ParleyError::ConversationNotFound(id_or_prefix.to_string()))?;

    store.delete_conversation(&id)?;
    tracing::info!(conversation_id = %id, "Deleted conversation from history");

    if store.load_current_id()?.as_deref() == Some(id.as_str()) {
        let next = conversations
            .iter()
            .map(|c| c.id())
            .find(|other| *other != id);
        store.save_current_id(next)?;
    }

    Ok(id)
}

fn history_table<'a>(
    conversations: impl Iterator<Item = &'a Conversation>,
    current: Option<&str>,
) -> Table {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);

    table.add_row(prettytable::row![
        "ID".bold(),
        "Title".bold(),
        "Messages".bold(),
        "Last Updated".bold()
    ]);

    for conversation in conversations {
        let id_short = if current == Some(conversation.id()) {
            format!("{}*", short_id(conversation.id()))
        } else {
            short_id(conversation.id()).to_string()
        };
        let updated = conversation
            .updated_at()
            .format("%Y-%m-%d %H:%M")
            .to_string();

        table.add_row(prettytable::row![
            id_short.cyan(),
            truncate_title(conversation.title(), TITLE_WIDTH),
            conversation.messages().len(),
            updated
        ]);
    }

    table
}

fn truncate_title(title: &str, width: usize) -> String {
    if title.chars().count() > width {
        let kept: String = title.chars().take(width.saturating_sub(3)).collect();
        format!("{}...", kept)
    } else {
        title.to_string()
    }
}
