//! Key/value conversation store backed by `sled`
//!
//! The whole collection is kept under a single key as a JSON array, and the
//! current selection under another. Timestamps are serialized as RFC 3339
//! strings and turned back into `DateTime<Utc>` on load.

use super::ConversationStore;
use crate::conversation::Conversation;
use crate::error::{ParleyError, Result};
use sled::Db;
use std::path::Path;

const CONVERSATIONS_KEY: &[u8] = b"conversations";
const CURRENT_ID_KEY: &[u8] = b"currentConversationId";

/// Embedded key/value conversation store
pub struct KeyValueStore {
    db: Db,
}

impl KeyValueStore {
    /// Open or create a store at `path`
    ///
    /// # Errors
    ///
    /// Returns `ParleyError::Storage` if the database cannot be opened
    ///
    /// # Examples
    ///
    /// ```
    /// use parley::storage::{ConversationStore, KeyValueStore};
    ///
    /// # fn main() -> parley::error::Result<()> {
    /// let dir = tempfile::tempdir()?;
    /// let store = KeyValueStore::new(dir.path().join("kv"))?;
    /// assert!(store.load_all()?.is_empty());
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(path)
            .map_err(|e| ParleyError::Storage(format!("Failed to open database: {}", e)))?;
        Ok(Self { db })
    }

    fn write_all(&self, conversations: &[Conversation]) -> Result<()> {
        let value = serde_json::to_vec(conversations)
            .map_err(|e| ParleyError::Storage(format!("Serialization failed: {}", e)))?;

        self.db
            .insert(CONVERSATIONS_KEY, value)
            .map_err(|e| ParleyError::Storage(format!("Insert failed: {}", e)))?;

        self.flush()
    }

    fn flush(&self) -> Result<()> {
        self.db
            .flush()
            .map_err(|e| ParleyError::Storage(format!("Flush failed: {}", e)))?;
        Ok(())
    }
}

impl ConversationStore for KeyValueStore {
    fn load_all(&self) -> Result<Vec<Conversation>> {
        match self
            .db
            .get(CONVERSATIONS_KEY)
            .map_err(|e| ParleyError::Storage(format!("Get failed: {}", e)))?
        {
            Some(bytes) => {
                let conversations = serde_json::from_slice(&bytes).map_err(|e| {
                    ParleyError::Storage(format!("Deserialization failed: {}", e))
                })?;
                Ok(conversations)
            }
            None => Ok(Vec::new()),
        }
    }

    fn save_conversation(&self, conversation: &Conversation) -> Result<()> {
        let mut conversations = self.load_all()?;

        match conversations.iter().position(|c| c.id() == conversation.id()) {
            Some(index) => conversations[index] = conversation.clone(),
            None => conversations.insert(0, conversation.clone()),
        }

        self.write_all(&conversations)
    }

    fn delete_conversation(&self, id: &str) -> Result<()> {
        let mut conversations = self.load_all()?;
        let before = conversations.len();
        conversations.retain(|c| c.id() != id);

        if conversations.len() != before {
            self.write_all(&conversations)?;
        }
        Ok(())
    }

    fn load_current_id(&self) -> Result<Option<String>> {
        let value = self
            .db
            .get(CURRENT_ID_KEY)
            .map_err(|e| ParleyError::Storage(format!("Get failed: {}", e)))?;

        Ok(value.map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
    }

    fn save_current_id(&self, id: Option<&str>) -> Result<()> {
        match id {
            Some(id) => {
                self.db
                    .insert(CURRENT_ID_KEY, id.as_bytes())
                    .map_err(|e| ParleyError::Storage(format!("Insert failed: {}", e)))?;
            }
            None => {
                self.db
                    .remove(CURRENT_ID_KEY)
                    .map_err(|e| ParleyError::Storage(format!("Remove failed: {}", e)))?;
            }
        }
        self.flush()
    }
}
