//! Conversation persistence
//!
//! The manager treats persistence as an external collaborator behind
//! [`ConversationStore`]. Three backends are provided:
//!
//! - [`SqliteStorage`]: relational tables for conversations, messages and
//!   attachments
//! - [`KeyValueStore`]: an embedded key/value database holding the whole
//!   collection as one JSON document
//! - [`MemoryStore`]: in-process, optionally failing, for tests

use crate::config::{StorageBackend, StorageConfig};
use crate::conversation::Conversation;
use crate::error::{ParleyError, Result};
use anyhow::Context;
use directories::ProjectDirs;
use std::path::PathBuf;

pub mod kv;
pub mod memory;
pub mod sqlite;

pub use kv::KeyValueStore;
pub use memory::MemoryStore;
pub use sqlite::SqliteStorage;

/// Persistence contract used by the conversation manager
///
/// Collection order is most-recent-first: a conversation saved for the
/// first time goes to the front, later saves keep its position.
pub trait ConversationStore: Send {
    /// Loads every stored conversation in collection order
    fn load_all(&self) -> Result<Vec<Conversation>>;

    /// Inserts or replaces a conversation
    fn save_conversation(&self, conversation: &Conversation) -> Result<()>;

    /// Removes a conversation; removing an unknown id is not an error
    fn delete_conversation(&self, id: &str) -> Result<()>;

    /// Loads the saved current-conversation selection
    fn load_current_id(&self) -> Result<Option<String>>;

    /// Saves (or clears) the current-conversation selection
    fn save_current_id(&self, id: Option<&str>) -> Result<()>;
}

/// Opens the backend selected in the configuration
///
/// # Errors
///
/// Returns `ParleyError::Storage` if the data directory cannot be
/// determined or the database cannot be opened.
pub fn open_store(config: &StorageConfig) -> Result<Box<dyn ConversationStore>> {
    let store: Box<dyn ConversationStore> = match config.backend {
        StorageBackend::Sqlite => {
            let path = resolve_path(config, "conversations.db")?;
            tracing::debug!(path = %path.display(), "Opening SQLite conversation store");
            Box::new(SqliteStorage::new_with_path(path)?)
        }
        StorageBackend::Sled => {
            let path = resolve_path(config, "conversations.sled")?;
            tracing::debug!(path = %path.display(), "Opening key/value conversation store");
            Box::new(KeyValueStore::new(path)?)
        }
        StorageBackend::Memory => {
            tracing::debug!("Using in-memory conversation store");
            Box::new(MemoryStore::new())
        }
    };
    Ok(store)
}

fn resolve_path(config: &StorageConfig, file_name: &str) -> Result<PathBuf> {
    if let Some(path) = &config.path {
        return Ok(path.clone());
    }

    let proj_dirs = ProjectDirs::from("com", "parley", "parley")
        .ok_or_else(|| ParleyError::Storage("Could not determine data directory".into()))?;

    let data_dir = proj_dirs.data_dir();
    std::fs::create_dir_all(data_dir)
        .context("Failed to create data directory")
        .map_err(|e| ParleyError::Storage(e.to_string()))?;

    Ok(data_dir.join(file_name))
}
