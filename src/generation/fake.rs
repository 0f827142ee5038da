//! In-process scripted generator
//!
//! [`ScriptedGenerator`] replaces the HTTP endpoint in tests and in
//! `parley chat --offline`. Each call to `generate` consumes the next
//! scripted reply; when the script runs out it echoes the question back.
//! Every request is recorded so tests can inspect what the manager sent.
//!
//! # Example
//!
//! ```
//! use futures::StreamExt;
//! use parley::generation::{GenerationRequest, ScriptedGenerator, TextGenerator};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let generator = ScriptedGenerator::new().with_chunks(["Hel", "lo"]);
//! let mut stream = generator
//!     .generate(&GenerationRequest::new("hi", &[], true))
//!     .await
//!     .unwrap();
//!
//! let mut text = Vec::new();
//! while let Some(chunk) = stream.next().await {
//!     text.extend_from_slice(&chunk.unwrap());
//! }
//! assert_eq!(text, b"Hello");
//! assert_eq!(generator.requests().len(), 1);
//! # }
//! ```

use super::{ChunkStream, GenerationRequest, TextGenerator};
use crate::error::{ParleyError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone)]
enum Script {
    Reply {
        chunks: Vec<Bytes>,
        error: Option<String>,
    },
    Reject(String),
}

/// Generator that replays scripted replies
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<GenerationRequest>>,
    delay: Option<Duration>,
}

impl ScriptedGenerator {
    /// Creates a generator with an empty script (echo replies)
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a reply made of the given chunks
    pub fn with_chunks<I, C>(self, chunks: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Bytes>,
    {
        self.push(Script::Reply {
            chunks: chunks.into_iter().map(Into::into).collect(),
            error: None,
        })
    }

    /// Queues a reply that yields the given chunks and then fails mid-stream
    pub fn with_stream_error<I, C>(self, chunks: I, message: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Bytes>,
    {
        self.push(Script::Reply {
            chunks: chunks.into_iter().map(Into::into).collect(),
            error: Some(message.into()),
        })
    }

    /// Queues a request that is rejected before any chunk arrives
    pub fn with_failure(self, message: impl Into<String>) -> Self {
        self.push(Script::Reject(message.into()))
    }

    /// Waits this long before each chunk
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Requests received so far, oldest first
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn push(self, script: Script) -> Self {
        self.scripts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(script);
        self
    }

    fn echo(request: &GenerationRequest) -> Script {
        let reply = format!("You said: {}", request.question);
        let chunks = reply
            .split_inclusive(' ')
            .map(|word| Bytes::from(word.to_string()))
            .collect();
        Script::Reply {
            chunks,
            error: None,
        }
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<ChunkStream> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());

        let script = self
            .scripts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_else(|| Self::echo(request));

        let (chunks, error) = match script {
            Script::Reject(message) => return Err(ParleyError::Generation(message).into()),
            Script::Reply { chunks, error } => (chunks, error),
        };

        let items: Vec<Result<Bytes>> = chunks
            .into_iter()
            .map(Ok)
            .chain(error.map(|m| Err(ParleyError::Generation(m).into())))
            .collect();

        let stream = futures::stream::iter(items);
        match self.delay {
            Some(delay) => Ok(Box::pin(stream.then(move |item| async move {
                tokio::time::sleep(delay).await;
                item
            }))),
            None => Ok(Box::pin(stream)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn collect(stream: ChunkStream) -> (String, Option<String>) {
        let mut text = String::new();
        let mut error = None;
        let mut stream = stream;
        while let Some(item) = stream.next().await {
            match item {
                Ok(bytes) => text.push_str(&String::from_utf8_lossy(&bytes)),
                Err(e) => error = Some(e.to_string()),
            }
        }
        (text, error)
    }

    #[tokio::test]
    async fn test_scripts_are_consumed_in_order() {
        let generator = ScriptedGenerator::new()
            .with_chunks(["one"])
            .with_chunks(["two"]);
        let request = GenerationRequest::new("q", &[], true);

        let (first, _) = collect(generator.generate(&request).await.unwrap()).await;
        let (second, _) = collect(generator.generate(&request).await.unwrap()).await;
        assert_eq!(first, "one");
        assert_eq!(second, "two");
    }

    #[tokio::test]
    async fn test_echo_when_script_is_empty() {
        let generator = ScriptedGenerator::new();
        let request = GenerationRequest::new("ping pong", &[], true);
        let (text, error) = collect(generator.generate(&request).await.unwrap()).await;
        assert_eq!(text, "You said: ping pong");
        assert!(error.is_none());
    }

    #[tokio::test]
    async fn test_failure_rejects_request() {
        let generator = ScriptedGenerator::new().with_failure("boom");
        let request = GenerationRequest::new("q", &[], true);
        let err = generator.generate(&request).await.err().unwrap();
        assert!(err.to_string().contains("boom"));
        assert_eq!(generator.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_stream_error_after_chunks() {
        let generator = ScriptedGenerator::new().with_stream_error(["partial"], "reset");
        let request = GenerationRequest::new("q", &[], true);
        let (text, error) = collect(generator.generate(&request).await.unwrap()).await;
        assert_eq!(text, "partial");
        assert!(error.unwrap().contains("reset"));
    }

    #[tokio::test]
    async fn test_delay_still_yields_all_chunks() {
        let generator = ScriptedGenerator::new()
            .with_chunks(["a", "b"])
            .with_delay(Duration::from_millis(1));
        let request = GenerationRequest::new("q", &[], true);
        let (text, _) = collect(generator.generate(&request).await.unwrap()).await;
        assert_eq!(text, "ab");
    }
}
