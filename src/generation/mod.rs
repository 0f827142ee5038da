//! Text-generation collaborator
//!
//! The conversation manager never talks to a model directly. It hands a
//! [`GenerationRequest`] to a [`TextGenerator`] and consumes the returned
//! [`ChunkStream`] of raw bytes, which [`chunk::ChunkParser`] turns into
//! reply text.

pub mod chunk;
pub mod fake;
pub mod http;

pub use chunk::{ChunkParser, Fragment, Utf8ChunkDecoder};
pub use fake::ScriptedGenerator;
pub use http::HttpGenerator;

use crate::conversation::{Message, Role};
use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// Stream of raw reply chunks
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// One prior turn sent as context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Who said it
    pub role: Role,
    /// What was said
    pub content: String,
}

impl From<&Message> for HistoryEntry {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role,
            content: message.content.clone(),
        }
    }
}

/// Body posted to the generation endpoint
///
/// Serializes as `{"question": ..., "history": [{"role", "content"}], "streaming": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Content of the new user message
    pub question: String,
    /// Messages that preceded the question, oldest first
    pub history: Vec<HistoryEntry>,
    /// Whether a streamed reply is requested
    pub streaming: bool,
}

impl GenerationRequest {
    /// Builds a request from the prior messages and the new question
    ///
    /// # Examples
    ///
    /// ```
    /// use parley::conversation::{Message, Role};
    /// use parley::generation::GenerationRequest;
    ///
    /// let prior = vec![Message::new(Role::User, "hi"), Message::new(Role::Assistant, "hello")];
    /// let request = GenerationRequest::new("how are you?", &prior, true);
    /// assert_eq!(request.history.len(), 2);
    /// assert_eq!(request.question, "how are you?");
    /// ```
    pub fn new(question: impl Into<String>, prior: &[Message], streaming: bool) -> Self {
        Self {
            question: question.into(),
            history: prior.iter().map(HistoryEntry::from).collect(),
            streaming,
        }
    }
}

/// A source of streamed assistant replies
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Starts generating a reply
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be issued or is rejected.
    /// Failures after the stream has started are reported as `Err` items.
    async fn generate(&self, request: &GenerationRequest) -> Result<ChunkStream>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_format() {
        let prior = vec![Message::new(Role::User, "first"), Message::new(Role::Assistant, "reply")];
        let request = GenerationRequest::new("second", &prior, true);
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["question"], "second");
        assert_eq!(json["streaming"], true);
        assert_eq!(json["history"][0]["role"], "user");
        assert_eq!(json["history"][1]["content"], "reply");
        assert!(json["history"][0].get("id").is_none());
    }

    #[test]
    fn test_request_with_empty_history() {
        let request = GenerationRequest::new("hello", &[], false);
        let json = serde_json::to_string(&request).unwrap();
        assert_eq!(json, r#"{"question":"hello","history":[],"streaming":false}"#);
    }
}
