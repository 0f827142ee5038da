//! Error types for Parley
//!
//! This module defines the error types used throughout the crate,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for Parley operations
///
/// Covers configuration loading, persistence, text generation and the
/// precondition failures of the conversation state manager.
#[derive(Error, Debug)]
pub enum ParleyError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Conversation storage errors (database operations)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Text-generation endpoint errors (transport, status, unreadable stream)
    #[error("Generation error: {0}")]
    Generation(String),

    /// An operation required a current conversation but none is selected
    #[error("No current conversation")]
    NoCurrentConversation,

    /// The referenced conversation does not exist in the collection
    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),

    /// A reply is already being generated for the conversation
    #[error("A response is already being generated for conversation {0}")]
    GenerationInFlight(String),

    /// Attachment exceeds the configured size limit
    #[error("Attachment {name} is {size} bytes, limit is {limit} bytes")]
    AttachmentTooLarge {
        /// File name of the rejected attachment
        name: String,
        /// Actual size in bytes
        size: u64,
        /// Configured limit in bytes
        limit: u64,
    },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for Parley operations
///
/// Uses `anyhow::Error` as the error type so callers get rich context;
/// `ParleyError` values are recovered with `downcast_ref` where a caller
/// needs to branch on the kind.
pub type Result<T> = anyhow::Result<T>;
