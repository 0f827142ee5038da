//! Parley - conversation state manager and terminal chat client
//!
//! This library keeps an ordered collection of chat conversations, tracks
//! which one is current, persists every change, and streams replies from a
//! text-generation endpoint into the conversation as they arrive.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `conversation`: Conversation, message and attachment data model
//! - `manager`: The conversation state manager and reply streaming
//! - `generation`: Text-generation collaborator, chunk parsing and decoding
//! - `storage`: Persistence collaborator (SQLite, sled, in-memory)
//! - `events`: Notifications and the events a front end renders
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use parley::conversation::Role;
//! use parley::generation::ScriptedGenerator;
//! use parley::storage::MemoryStore;
//! use parley::{Config, ConversationManager};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     let mut manager = ConversationManager::load(
//!         Box::new(MemoryStore::new()),
//!         Arc::new(ScriptedGenerator::new().with_chunks(["{\"text\":\"Hello!\"}"])),
//!         &config,
//!     )?;
//!
//!     manager.append_message("Hi", Role::User, Vec::new()).await?;
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod commands;
pub mod config;
pub mod conversation;
pub mod error;
pub mod events;
pub mod generation;
pub mod manager;
pub mod storage;

// Re-export commonly used types
pub use config::Config;
pub use conversation::{Attachment, Conversation, Message, Role};
pub use error::{ParleyError, Result};
pub use events::{ChatEvent, Notification, NotificationLevel};
pub use manager::ConversationManager;
