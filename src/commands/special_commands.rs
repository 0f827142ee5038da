//! Slash commands for the interactive chat shell
//!
//! Input starting with `/` manages conversations instead of being sent as a
//! message. Command names are case-insensitive; arguments keep their case.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur when parsing special commands
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Unknown command was entered
    #[error("Unknown command: {0}\n\nType '/help' to see available commands")]
    UnknownCommand(String),

    /// Command requires an argument but none was provided
    #[error("Command {command} requires an argument\n\nUsage: {usage}")]
    MissingArgument { command: String, usage: String },
}

/// Commands understood by the chat shell
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecialCommand {
    /// Start a new conversation
    New,
    /// List conversations, marking the current one
    List,
    /// Switch to a conversation by id or id prefix
    Switch(String),
    /// Delete a conversation by id or id prefix
    Delete(String),
    /// Search titles and message content
    Search(String),
    /// Attach a file to the next message
    Attach(PathBuf),
    /// Show the messages of the current conversation
    Show,
    /// Display help information
    Help,
    /// Leave the shell
    Exit,
    /// Not a command; send the input as a message
    None,
}

/// Parse a line of user input
///
/// # Errors
///
/// Returns `CommandError::UnknownCommand` for an unrecognised `/` command
/// and `CommandError::MissingArgument` when a required argument is absent.
///
/// # Examples
///
/// ```
/// use parley::commands::special_commands::{parse_special_command, SpecialCommand};
///
/// assert_eq!(parse_special_command("/NEW").unwrap(), SpecialCommand::New);
/// assert_eq!(
///     parse_special_command("/search Trip").unwrap(),
///     SpecialCommand::Search("Trip".to_string())
/// );
/// assert_eq!(parse_special_command("hello").unwrap(), SpecialCommand::None);
/// assert!(parse_special_command("/foo").is_err());
/// ```
pub fn parse_special_command(input: &str) -> Result<SpecialCommand, CommandError> {
    let trimmed = input.trim();
    let lower = trimmed.to_lowercase();

    if !trimmed.starts_with('/') {
        return Ok(if lower == "exit" || lower == "quit" {
            SpecialCommand::Exit
        } else {
            SpecialCommand::None
        });
    }

    let (name, arg) = match trimmed.split_once(char::is_whitespace) {
        Some((name, rest)) => (name.to_lowercase(), rest.trim()),
        None => (lower.clone(), ""),
    };

    let required = |usage: &str| -> Result<String, CommandError> {
        if arg.is_empty() {
            Err(CommandError::MissingArgument {
                command: name.clone(),
                usage: usage.to_string(),
            })
        } else {
            Ok(arg.to_string())
        }
    };

    match name.as_str() {
        "/new" => Ok(SpecialCommand::New),
        "/list" | "/ls" => Ok(SpecialCommand::List),
        "/switch" => required("/switch <id>").map(SpecialCommand::Switch),
        "/delete" | "/rm" => required("/delete <id>").map(SpecialCommand::Delete),
        "/search" => required("/search <text>").map(SpecialCommand::Search),
        "/attach" => required("/attach <path>").map(|p| SpecialCommand::Attach(PathBuf::from(p))),
        "/show" => Ok(SpecialCommand::Show),
        "/help" | "/?" => Ok(SpecialCommand::Help),
        "/exit" | "/quit" => Ok(SpecialCommand::Exit),
        _ => Err(CommandError::UnknownCommand(trimmed.to_string())),
    }
}

/// Print the command reference
pub fn print_help() {
    println!(
        r#"
Chat Commands
=============

CONVERSATIONS:
  /new             - Start a new conversation
  /list            - List conversations (current marked with *)
  /switch <id>     - Switch to a conversation (full id or prefix)
  /delete <id>     - Delete a conversation (full id or prefix)
  /search <text>   - Find conversations by title or content
  /show            - Print the current conversation

MESSAGES:
  /attach <path>   - Attach a file to your next message

SESSION:
  /help            - Show this help message
  /exit            - Leave the chat (also: exit, quit, Ctrl-D)

Anything else is sent as a message to the current conversation.
"#
    );
}
