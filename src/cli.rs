//! Command-line interface definition for Parley
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for interactive chat and conversation history.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Parley - terminal chat client for streaming text-generation endpoints
#[derive(Parser, Debug, Clone)]
#[command(name = "parley")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Override the conversation database path
    #[arg(long, env = "PARLEY_STORAGE_PATH")]
    pub storage_path: Option<PathBuf>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for Parley
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start an interactive chat session
    Chat {
        /// Answer from a built-in scripted generator instead of the endpoint
        #[arg(long)]
        offline: bool,

        /// Open this conversation (full id or 8-char prefix) instead of the last one
        #[arg(long)]
        conversation: Option<String>,
    },

    /// Inspect and manage stored conversations
    History {
        /// History subcommand
        #[command(subcommand)]
        command: HistoryCommand,
    },
}

/// Conversation history subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum HistoryCommand {
    /// List stored conversations grouped by month
    List,

    /// Delete a stored conversation
    Delete {
        /// Conversation id (full id or 8-char prefix)
        id: String,
    },

    /// Search titles and message content
    Search {
        /// Case-insensitive text to look for
        query: String,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: Some("config/config.yaml".to_string()),
            verbose: false,
            storage_path: None,
            command: Commands::History {
                command: HistoryCommand::List,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_default() {
        let cli = Cli::default();
        assert_eq!(cli.config, Some("config/config.yaml".to_string()));
        assert!(!cli.verbose);
        assert!(matches!(
            cli.command,
            Commands::History {
                command: HistoryCommand::List
            }
        ));
    }

    #[test]
    fn test_cli_parse_chat_command() {
        let cli = Cli::try_parse_from(["parley", "chat"]).unwrap();
        if let Commands::Chat {
            offline,
            conversation,
        } = cli.command
        {
            assert!(!offline);
            assert!(conversation.is_none());
        } else {
            panic!("Expected Chat command");
        }
    }

    #[test]
    fn test_cli_parse_chat_offline_with_conversation() {
        let cli =
            Cli::try_parse_from(["parley", "chat", "--offline", "--conversation", "abcd1234"])
                .unwrap();
        if let Commands::Chat {
            offline,
            conversation,
        } = cli.command
        {
            assert!(offline);
            assert_eq!(conversation.as_deref(), Some("abcd1234"));
        } else {
            panic!("Expected Chat command");
        }
    }

    #[test]
    fn test_cli_parse_history_delete() {
        let cli = Cli::try_parse_from(["parley", "history", "delete", "abcd1234"]).unwrap();
        match cli.command {
            Commands::History {
                command: HistoryCommand::Delete { id },
            } => assert_eq!(id, "abcd1234"),
            other => panic!("Expected history delete, got {:?}", other),
        }
    }

    #[test]
    fn test_cli_parse_history_search() {
        let cli = Cli::try_parse_from(["parley", "history", "search", "trip"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::History {
                command: HistoryCommand::Search { ref query }
            } if query == "trip"
        ));
    }

    #[test]
    fn test_cli_parse_storage_path_and_verbose() {
        let cli = Cli::try_parse_from([
            "parley",
            "--verbose",
            "--storage-path",
            "/tmp/h.db",
            "history",
            "list",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.storage_path, Some(PathBuf::from("/tmp/h.db")));
    }

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["parley"]).is_err());
    }
}
