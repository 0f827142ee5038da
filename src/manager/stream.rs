//! Reply generation and stream assembly
//!
//! A user message is answered by an assistant message that starts empty and
//! is overwritten as chunks arrive. Each chunk is decoded, parsed into
//! fragments, appended to the running text, written into the placeholder,
//! persisted and announced with a `StreamDelta` event. When the stream ends
//! a cleanup pass over the raw text recovers envelopes that were split
//! across chunks. Any failure replaces the placeholder with the configured
//! apology; there is no retry.

use super::ConversationManager;
use crate::conversation::{Message, Role};
use crate::error::Result;
use crate::events::{ChatEvent, Notification};
use crate::generation::{GenerationRequest, Utf8ChunkDecoder};
use futures::StreamExt;
use std::sync::Arc;

/// Raw and assembled text of the reply being streamed
#[derive(Debug, Default)]
struct ReplyBuffer {
    raw: String,
    text: String,
}

impl ConversationManager {
    pub(super) async fn generate_reply(
        &mut self,
        conversation_id: &str,
        question: String,
        prior: Vec<Message>,
    ) {
        self.in_flight.insert(conversation_id.to_string());

        let placeholder = Message::new(Role::Assistant, "");
        let message_id = placeholder.id.clone();
        let title_max_chars = self.chat.title_max_chars;
        if let Ok(conversation) = self.conversation_mut(conversation_id) {
            conversation.push_message(placeholder, title_max_chars);
        }
        self.loading = true;
        self.streaming_content.clear();
        self.persist(conversation_id);
        self.emit(ChatEvent::GenerationStarted {
            conversation_id: conversation_id.to_string(),
            message_id: message_id.clone(),
        });

        let request = GenerationRequest::new(question, &prior, self.request_streaming);
        tracing::debug!(
            conversation_id,
            history = request.history.len(),
            "Requesting reply"
        );

        match self
            .consume_stream(conversation_id, &message_id, &request)
            .await
        {
            Ok(content) => {
                self.write_reply(conversation_id, &message_id, &content);
                self.finish_generation(conversation_id);
                tracing::info!(conversation_id, chars = content.len(), "Reply complete");
                self.emit(ChatEvent::GenerationFinished {
                    conversation_id: conversation_id.to_string(),
                    message_id,
                    content,
                });
            }
            Err(e) => {
                tracing::error!(conversation_id, "Reply generation failed: {:#}", e);
                let apology = self.chat.error_message.clone();
                self.write_reply(conversation_id, &message_id, &apology);
                self.finish_generation(conversation_id);
                self.notify(Notification::error(format!(
                    "Failed to generate a response: {}",
                    e
                )));
                self.emit(ChatEvent::GenerationFailed {
                    conversation_id: conversation_id.to_string(),
                    message_id,
                    error: e.to_string(),
                });
            }
        }
    }

    /// Reads the reply stream to the end and returns the final text
    async fn consume_stream(
        &mut self,
        conversation_id: &str,
        message_id: &str,
        request: &GenerationRequest,
    ) -> Result<String> {
        let generator = Arc::clone(&self.generator);
        let mut stream = generator.generate(request).await?;
        self.streaming = true;

        let mut decoder = Utf8ChunkDecoder::new();
        let mut reply = ReplyBuffer::default();

        while let Some(chunk) = stream.next().await {
            let bytes = chunk?;
            let text = decoder.decode(&bytes);
            self.apply_chunk(conversation_id, message_id, &text, &mut reply);
        }

        let tail = decoder.finish();
        self.apply_chunk(conversation_id, message_id, &tail, &mut reply);

        Ok(self.parser.finalize(&reply.raw, &reply.text))
    }

    fn apply_chunk(
        &mut self,
        conversation_id: &str,
        message_id: &str,
        chunk: &str,
        reply: &mut ReplyBuffer,
    ) {
        if chunk.is_empty() {
            return;
        }
        reply.raw.push_str(chunk);

        let delta = self.parser.extract(chunk);
        if delta.is_empty() {
            tracing::debug!(conversation_id, "Chunk carried no text");
            return;
        }
        reply.text.push_str(&delta);

        self.streaming_content.clone_from(&reply.text);
        self.write_reply(conversation_id, message_id, &reply.text);
        self.emit(ChatEvent::StreamDelta {
            conversation_id: conversation_id.to_string(),
            message_id: message_id.to_string(),
            delta,
            content: reply.text.clone(),
        });
    }

    fn write_reply(&mut self, conversation_id: &str, message_id: &str, content: &str) {
        if let Ok(conversation) = self.conversation_mut(conversation_id) {
            conversation.set_message_content(message_id, content);
        }
        self.persist(conversation_id);
    }

    fn finish_generation(&mut self, conversation_id: &str) {
        self.loading = false;
        self.streaming = false;
        self.streaming_content.clear();
        self.in_flight.remove(conversation_id);
    }
}
