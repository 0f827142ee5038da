//! Notifications and chat events
//!
//! [`Notification`]s are user-visible messages the manager records when an
//! operation fails without aborting the session (persistence errors,
//! generation failures). [`ChatEvent`]s are sent over an optional channel so
//! a front end can re-render between stream chunks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    /// Something worth knowing; nothing failed
    Info,
    /// A side effect failed but the operation went ahead
    Warning,
    /// An operation failed
    Error,
}

/// User-visible message about something that went wrong (or right)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Severity
    pub level: NotificationLevel,
    /// Text shown to the user
    pub message: String,
    /// When the notification was recorded
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    /// Creates a notification stamped with the current time
    pub fn new(level: NotificationLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    /// Info-level notification
    pub fn info(message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Info, message)
    }

    /// Warning-level notification
    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Warning, message)
    }

    /// Error-level notification
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Error, message)
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.level {
            NotificationLevel::Info => "info",
            NotificationLevel::Warning => "warning",
            NotificationLevel::Error => "error",
        };
        write!(f, "[{}] {}", level, self.message)
    }
}

/// State change emitted by the conversation manager
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    /// A conversation was created and made current
    ConversationCreated { conversation_id: String },
    /// A conversation was removed from the collection
    ConversationDeleted { conversation_id: String },
    /// The current selection changed
    CurrentChanged { conversation_id: Option<String> },
    /// A message was appended to a conversation
    MessageAppended {
        conversation_id: String,
        message_id: String,
    },
    /// An assistant placeholder was created and generation began
    GenerationStarted {
        conversation_id: String,
        message_id: String,
    },
    /// New reply text arrived
    ///
    /// `delta` is the text this chunk contributed, `content` the reply so
    /// far.
    StreamDelta {
        conversation_id: String,
        message_id: String,
        delta: String,
        content: String,
    },
    /// The reply is complete; `content` is its final text
    GenerationFinished {
        conversation_id: String,
        message_id: String,
        content: String,
    },
    /// Generation failed and the placeholder holds the apology text
    GenerationFailed {
        conversation_id: String,
        message_id: String,
        error: String,
    },
    /// A notification was recorded
    Notified(Notification),
}
