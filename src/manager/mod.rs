//! Conversation state manager
//!
//! [`ConversationManager`] is the single owner of the conversation
//! collection, the current selection, the loading/streaming flags and the
//! search results. Every mutation goes through `&mut self`; the only
//! suspension point is the read of the reply stream (see [`stream`]).
//!
//! Invariants kept by every public operation:
//!
//! - whenever the collection is non-empty exactly one conversation is
//!   current, and the current id always names a member of the collection
//! - deleting the last conversation creates a fresh one before returning
//! - at most one reply is generated per conversation at a time

mod stream;

use crate::config::{ChatConfig, Config};
use crate::conversation::{find_by_prefix, search, Attachment, Conversation, Message, Role};
use crate::error::{ParleyError, Result};
use crate::events::{ChatEvent, Notification};
use crate::generation::{ChunkParser, TextGenerator};
use crate::storage::ConversationStore;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Owns the conversation collection and drives reply generation
pub struct ConversationManager {
    store: Box<dyn ConversationStore>,
    generator: Arc<dyn TextGenerator>,
    parser: ChunkParser,
    chat: ChatConfig,
    request_streaming: bool,
    conversations: Vec<Conversation>,
    current_id: Option<String>,
    loading: bool,
    streaming: bool,
    streaming_content: String,
    search_results: Vec<String>,
    notifications: Vec<Notification>,
    in_flight: HashSet<String>,
    events: Option<mpsc::UnboundedSender<ChatEvent>>,
}

impl ConversationManager {
    /// Builds the manager from persisted state
    ///
    /// Reads every conversation and the saved selection. An unknown or
    /// missing selection falls back to the first conversation; an empty
    /// store gets a fresh conversation.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read, or if the store is
    /// empty and the fallback conversation cannot be saved.
    pub fn load(
        store: Box<dyn ConversationStore>,
        generator: Arc<dyn TextGenerator>,
        config: &Config,
    ) -> Result<Self> {
        let conversations = store.load_all()?;
        let saved_id = store.load_current_id()?;

        let mut manager = Self {
            store,
            generator,
            parser: ChunkParser::from_config(&config.generation),
            chat: config.chat.clone(),
            request_streaming: config.generation.streaming,
            conversations,
            current_id: None,
            loading: false,
            streaming: false,
            streaming_content: String::new(),
            search_results: Vec::new(),
            notifications: Vec::new(),
            in_flight: HashSet::new(),
            events: None,
        };

        let restored = saved_id.filter(|id| manager.contains(id));
        match restored {
            Some(id) => manager.current_id = Some(id),
            None => match manager.conversations.first().map(|c| c.id().to_string()) {
                Some(first) => manager.select(first),
                None => {
                    manager.create_conversation()?;
                }
            },
        }

        tracing::info!(
            conversations = manager.conversations.len(),
            current = manager.current_id.as_deref().unwrap_or(""),
            "Loaded conversations"
        );
        Ok(manager)
    }

    /// Sends [`ChatEvent`]s to `sender` from now on
    pub fn with_events(mut self, sender: mpsc::UnboundedSender<ChatEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    /// Persists the current selection and releases the manager
    ///
    /// # Errors
    ///
    /// Returns the store error if the selection cannot be saved
    pub fn close(self) -> Result<()> {
        self.store.save_current_id(self.current_id.as_deref())?;
        tracing::debug!("Conversation manager closed");
        Ok(())
    }

    /// Creates an empty conversation at the front and makes it current
    ///
    /// # Errors
    ///
    /// If the new conversation cannot be persisted an error notification
    /// is recorded, nothing changes locally and the store error is
    /// returned.
    pub fn create_conversation(&mut self) -> Result<String> {
        let conversation = Conversation::new(self.chat.placeholder_title.clone());

        if let Err(e) = self.store.save_conversation(&conversation) {
            tracing::warn!("Failed to create conversation: {:#}", e);
            self.notify(Notification::error(format!(
                "Failed to create conversation: {}",
                e
            )));
            return Err(e);
        }

        let id = conversation.id().to_string();
        self.conversations.insert(0, conversation);
        tracing::info!(conversation_id = %id, "Created conversation");
        self.emit(ChatEvent::ConversationCreated {
            conversation_id: id.clone(),
        });
        self.select(id.clone());
        Ok(id)
    }

    /// Deletes a conversation
    ///
    /// The store is updated first; if that fails an error notification is
    /// recorded and nothing changes locally. Deleting the current
    /// conversation selects the first remaining one, or creates a new one
    /// when none remain. If that replacement cannot be saved it is kept in
    /// memory only (the failure is notified) and is written by the next
    /// successful save.
    ///
    /// # Errors
    ///
    /// Returns `ParleyError::ConversationNotFound` for an unknown id, or the
    /// store error if deletion fails.
    pub fn delete_conversation(&mut self, id: &str) -> Result<()> {
        let index = self
            .conversations
            .iter()
            .position(|c| c.id() == id)
            .ok_or_else(|| ParleyError::ConversationNotFound(id.to_string()))?;

        if let Err(e) = self.store.delete_conversation(id) {
            tracing::warn!(conversation_id = %id, "Failed to delete conversation: {:#}", e);
            self.notify(Notification::error(format!(
                "Failed to delete conversation: {}",
                e
            )));
            return Err(e);
        }

        self.conversations.remove(index);
        self.search_results.retain(|r| r != id);
        tracing::info!(conversation_id = %id, "Deleted conversation");
        self.emit(ChatEvent::ConversationDeleted {
            conversation_id: id.to_string(),
        });

        if self.current_id.as_deref() == Some(id) {
            self.current_id = None;
            match self.conversations.first().map(|c| c.id().to_string()) {
                Some(first) => self.select(first),
                None => {
                    if self.create_conversation().is_err() {
                        self.insert_unsaved_conversation();
                    }
                }
            }
        }

        Ok(())
    }

    /// Makes an existing conversation current and persists the selection
    ///
    /// # Errors
    ///
    /// Returns `ParleyError::ConversationNotFound` for an unknown id
    pub fn set_current_conversation(&mut self, id: &str) -> Result<()> {
        if !self.contains(id) {
            return Err(ParleyError::ConversationNotFound(id.to_string()).into());
        }
        self.select(id.to_string());
        Ok(())
    }

    /// Appends a message to the current conversation
    ///
    /// The first user message also sets the title. A user message then
    /// starts reply generation, which runs to completion before this
    /// returns; generation failures are reported through the placeholder
    /// content and a notification, not as an `Err`.
    ///
    /// # Errors
    ///
    /// Returns `ParleyError::NoCurrentConversation` if nothing is selected,
    /// or `ParleyError::GenerationInFlight` if a reply is already being
    /// generated for the current conversation. Neither changes any state.
    pub async fn append_message(
        &mut self,
        content: impl Into<String>,
        role: Role,
        attachments: Vec<Attachment>,
    ) -> Result<()> {
        let conversation_id = self
            .current_id
            .clone()
            .ok_or(ParleyError::NoCurrentConversation)?;

        if role == Role::User && self.in_flight.contains(&conversation_id) {
            return Err(ParleyError::GenerationInFlight(conversation_id).into());
        }

        let message = Message::new(role, content).with_attachments(attachments);
        let message_id = message.id.clone();
        let question = message.content.clone();
        let title_max_chars = self.chat.title_max_chars;

        let prior = {
            let conversation = self.conversation_mut(&conversation_id)?;
            let prior = conversation.messages().to_vec();
            if conversation.push_message(message, title_max_chars) {
                tracing::debug!(title = conversation.title(), "Derived conversation title");
            }
            prior
        };

        self.persist(&conversation_id);
        self.emit(ChatEvent::MessageAppended {
            conversation_id: conversation_id.clone(),
            message_id,
        });

        if role == Role::User {
            self.generate_reply(&conversation_id, question, prior).await;
        }

        Ok(())
    }

    /// Case-insensitive search over titles and message content
    ///
    /// Results are kept (see [`search_results`](Self::search_results)); the
    /// collection itself is untouched. A blank query matches nothing.
    pub fn search_conversations(&mut self, query: &str) -> Vec<&Conversation> {
        self.search_results = search(&self.conversations, query)
            .into_iter()
            .map(|c| c.id().to_string())
            .collect();

        tracing::debug!(query, results = self.search_results.len(), "Searched conversations");
        self.search_results()
    }

    /// Forgets the last search
    pub fn clear_search(&mut self) {
        self.search_results.clear();
    }

    /// Finds the conversation whose id equals or uniquely starts with `id_or_prefix`
    ///
    /// # Errors
    ///
    /// Returns `ParleyError::ConversationNotFound` if nothing matches or
    /// the prefix is ambiguous
    pub fn resolve_id(&self, id_or_prefix: &str) -> Result<String> {
        find_by_prefix(&self.conversations, id_or_prefix)
            .map(|c| c.id().to_string())
            .ok_or_else(|| ParleyError::ConversationNotFound(id_or_prefix.to_string()).into())
    }

    /// All conversations, most recent first
    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    /// Looks up a conversation by id
    pub fn conversation(&self, id: &str) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id() == id)
    }

    /// The current conversation, if any
    pub fn current_conversation(&self) -> Option<&Conversation> {
        self.current_id
            .as_deref()
            .and_then(|id| self.conversation(id))
    }

    /// Id of the current conversation
    pub fn current_id(&self) -> Option<&str> {
        self.current_id.as_deref()
    }

    /// True from the moment a reply placeholder exists until it is final
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// True while chunks are being read from the generator
    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// Reply text assembled so far
    pub fn streaming_content(&self) -> &str {
        &self.streaming_content
    }

    /// Conversations matched by the last search
    pub fn search_results(&self) -> Vec<&Conversation> {
        self.search_results
            .iter()
            .filter_map(|id| self.conversation(id))
            .collect()
    }

    /// Notifications recorded so far
    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }

    /// Takes every recorded notification
    pub fn drain_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.notifications)
    }

    /// Keeps the collection non-empty when the store rejects a new conversation
    fn insert_unsaved_conversation(&mut self) {
        let conversation = Conversation::new(self.chat.placeholder_title.clone());
        let id = conversation.id().to_string();
        self.conversations.insert(0, conversation);
        tracing::warn!(conversation_id = %id, "Using unsaved replacement conversation");
        self.emit(ChatEvent::ConversationCreated {
            conversation_id: id.clone(),
        });
        self.select(id);
    }

    fn contains(&self, id: &str) -> bool {
        self.conversations.iter().any(|c| c.id() == id)
    }

    fn conversation_mut(&mut self, id: &str) -> Result<&mut Conversation> {
        self.conversations
            .iter_mut()
            .find(|c| c.id() == id)
            .ok_or_else(|| ParleyError::ConversationNotFound(id.to_string()).into())
    }

    fn select(&mut self, id: String) {
        if let Err(e) = self.store.save_current_id(Some(&id)) {
            tracing::warn!("Failed to save current conversation: {:#}", e);
            self.notify(Notification::warning(format!(
                "Failed to save current conversation: {}",
                e
            )));
        }
        self.current_id = Some(id.clone());
        self.emit(ChatEvent::CurrentChanged {
            conversation_id: Some(id),
        });
    }

    /// Saves a conversation; failures become notifications
    fn persist(&mut self, conversation_id: &str) {
        let Some(conversation) = self
            .conversations
            .iter()
            .find(|c| c.id() == conversation_id)
        else {
            return;
        };

        if let Err(e) = self.store.save_conversation(conversation) {
            tracing::warn!(conversation_id, "Failed to save conversation: {:#}", e);
            self.notify(Notification::error(format!(
                "Failed to save conversation: {}",
                e
            )));
        }
    }

    /// Records a notification; an exact repeat of the last one is dropped
    fn notify(&mut self, notification: Notification) {
        let repeated = self.notifications.last().is_some_and(|last| {
            last.level == notification.level && last.message == notification.message
        });
        if repeated {
            return;
        }
        self.emit(ChatEvent::Notified(notification.clone()));
        self.notifications.push(notification);
    }

    fn emit(&self, event: ChatEvent) {
        if let Some(sender) = &self.events {
            if sender.send(event).is_err() {
                tracing::debug!("Event receiver dropped");
            }
        }
    }
}
