//! In-process conversation store
//!
//! Nothing survives the process. Clones share state, so a test can keep a
//! handle, give a clone to the manager, and later flip it into a failing
//! mode to exercise the notification paths.

use super::ConversationStore;
use crate::conversation::Conversation;
use crate::error::{ParleyError, Result};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct MemoryState {
    conversations: Vec<Conversation>,
    current_id: Option<String>,
    fail_writes: bool,
    writes: usize,
}

/// Shared in-memory conversation store
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with conversations (collection order)
    pub fn with_conversations(conversations: Vec<Conversation>) -> Self {
        let store = Self::new();
        store.lock().conversations = conversations;
        store
    }

    /// Makes every subsequent write fail (or succeed again)
    pub fn set_fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    /// Number of successful writes so far
    pub fn write_count(&self) -> usize {
        self.lock().writes
    }

    /// Copy of the stored collection
    pub fn snapshot(&self) -> Vec<Conversation> {
        self.lock().conversations.clone()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn writable(&self) -> Result<MutexGuard<'_, MemoryState>> {
        let state = self.lock();
        if state.fail_writes {
            return Err(ParleyError::Storage("write rejected by memory store".to_string()).into());
        }
        Ok(state)
    }
}

impl ConversationStore for MemoryStore {
    fn load_all(&self) -> Result<Vec<Conversation>> {
        Ok(self.snapshot())
    }

    fn save_conversation(&self, conversation: &Conversation) -> Result<()> {
        let mut state = self.writable()?;
        match state
            .conversations
            .iter()
            .position(|c| c.id() == conversation.id())
        {
            Some(index) => state.conversations[index] = conversation.clone(),
            None => state.conversations.insert(0, conversation.clone()),
        }
        state.writes += 1;
        Ok(())
    }

    fn delete_conversation(&self, id: &str) -> Result<()> {
        let mut state = self.writable()?;
        state.conversations.retain(|c| c.id() != id);
        state.writes += 1;
        Ok(())
    }

    fn load_current_id(&self) -> Result<Option<String>> {
        Ok(self.lock().current_id.clone())
    }

    fn save_current_id(&self, id: Option<&str>) -> Result<()> {
        let mut state = self.writable()?;
        state.current_id = id.map(str::to_string);
        state.writes += 1;
        Ok(())
    }
}
