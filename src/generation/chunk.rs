//! Decoding of streamed reply chunks
//!
//! A chunk from the generation endpoint is either plain text or one or more
//! JSON envelopes such as `{"event":"message","data":{"text":"Hel"}}`.
//! [`ChunkParser`] turns a decoded chunk into [`Fragment`]s using these rules,
//! applied in order:
//!
//! 1. A JSON object is an *envelope* when one of the configured dotted
//!    paths (default `data.text`, `text`, `message`, `content`,
//!    `message.data`) resolves to a string.
//! 2. The whole chunk is decoded as a sequence of JSON values. If every
//!    value decodes and at least one is an envelope, each envelope yields
//!    [`Fragment::Text`], event frames yield [`Fragment::Control`] and any
//!    other value yields [`Fragment::Literal`] with its source text.
//! 3. Otherwise the chunk is split into lines (an SSE `data:` prefix is
//!    stripped). If at least one line is an envelope, envelopes yield
//!    `Text`, event frames and `[DONE]` yield `Control`, and any other
//!    line yields a `Literal` that keeps its line terminator.
//! 4. Otherwise the entire chunk is a single `Literal`, untouched.
//!
//! Malformed JSON never fails the stream; it simply falls through to rule 4.

use crate::config::GenerationConfig;
use serde_json::Value;

/// One piece of decoded reply text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    /// Text pulled out of a JSON envelope
    Text(String),
    /// Raw text that was not a recognised envelope
    Literal(String),
    /// Structured frame without text (start/done markers and the like)
    Control,
}

impl Fragment {
    /// Text this fragment contributes to the reply
    pub fn text(&self) -> &str {
        match self {
            Fragment::Text(s) | Fragment::Literal(s) => s,
            Fragment::Control => "",
        }
    }
}

/// Splits chunks into fragments according to configurable envelope fields
#[derive(Debug, Clone)]
pub struct ChunkParser {
    text_paths: Vec<Vec<String>>,
    event_field: String,
}

impl ChunkParser {
    /// Creates a parser from dotted text paths and the event marker field
    ///
    /// # Examples
    ///
    /// ```
    /// use parley::generation::chunk::ChunkParser;
    ///
    /// let parser = ChunkParser::new(&["payload.delta".to_string()], "type");
    /// assert_eq!(parser.extract(r#"{"payload":{"delta":"Hi"}}"#), "Hi");
    /// assert_eq!(parser.extract("plain"), "plain");
    /// ```
    pub fn new(text_fields: &[String], event_field: impl Into<String>) -> Self {
        Self {
            text_paths: text_fields
                .iter()
                .map(|f| f.split('.').map(str::to_string).collect())
                .collect(),
            event_field: event_field.into(),
        }
    }

    /// Creates a parser from the generation section of the configuration
    pub fn from_config(config: &GenerationConfig) -> Self {
        Self::new(&config.text_fields, config.event_field.clone())
    }

    /// Classifies a decoded chunk into fragments
    pub fn parse(&self, chunk: &str) -> Vec<Fragment> {
        if let Some(fragments) = self.decode_structured(chunk) {
            return fragments;
        }
        if let Some(fragments) = self.decode_lines(chunk) {
            return fragments;
        }
        if chunk.is_empty() {
            return Vec::new();
        }
        vec![Fragment::Literal(chunk.to_string())]
    }

    /// Text a chunk contributes to the reply
    pub fn extract(&self, chunk: &str) -> String {
        self.parse(chunk).iter().map(Fragment::text).collect()
    }

    /// Final cleanup over the raw concatenation of every chunk
    ///
    /// Envelopes split across chunk boundaries show up as literal JSON in
    /// the running accumulator. Re-parsing the raw text as a whole recovers
    /// them; when it finds no envelope the accumulator is kept as is.
    pub fn finalize(&self, raw: &str, accumulated: &str) -> String {
        let fragments = self.parse(raw);
        if fragments.iter().any(|f| matches!(f, Fragment::Text(_))) {
            fragments.iter().map(Fragment::text).collect()
        } else {
            accumulated.to_string()
        }
    }

    fn decode_structured(&self, chunk: &str) -> Option<Vec<Fragment>> {
        let mut fragments = Vec::new();
        let mut saw_text = false;
        let mut stream = serde_json::Deserializer::from_str(chunk).into_iter::<Value>();
        let mut start = 0;

        while let Some(value) = stream.next() {
            let value = value.ok()?;
            let end = stream.byte_offset();
            match self.classify(&value) {
                Some(fragment @ Fragment::Text(_)) => {
                    saw_text = true;
                    fragments.push(fragment);
                }
                Some(fragment) => fragments.push(fragment),
                None => fragments.push(Fragment::Literal(chunk[start..end].trim().to_string())),
            }
            start = end;
        }

        saw_text.then_some(fragments)
    }

    /// Envelope and frame lines drop their terminator; literal lines keep
    /// it. Blank lines are SSE event separators when the chunk carries
    /// `data:` lines and literal text otherwise.
    fn decode_lines(&self, chunk: &str) -> Option<Vec<Fragment>> {
        let sse = chunk
            .lines()
            .any(|line| line.trim_start().starts_with("data:"));
        let mut fragments = Vec::new();
        let mut saw_text = false;

        for segment in chunk.split_inclusive('\n') {
            let trimmed = segment.trim();
            if trimmed.is_empty() {
                if !sse {
                    fragments.push(Fragment::Literal(segment.to_string()));
                }
                continue;
            }
            let payload = trimmed
                .strip_prefix("data:")
                .map(str::trim_start)
                .unwrap_or(trimmed);

            if payload == "[DONE]" {
                fragments.push(Fragment::Control);
                continue;
            }

            let classified = serde_json::from_str::<Value>(payload)
                .ok()
                .and_then(|v| self.classify(&v));
            match classified {
                Some(fragment @ Fragment::Text(_)) => {
                    saw_text = true;
                    fragments.push(fragment);
                }
                Some(fragment) => fragments.push(fragment),
                None => fragments.push(Fragment::Literal(segment.to_string())),
            }
        }

        saw_text.then_some(fragments)
    }

    /// `Text` for envelopes, `Control` for event frames, `None` otherwise
    fn classify(&self, value: &Value) -> Option<Fragment> {
        let object = value.as_object()?;

        for path in &self.text_paths {
            if let Some(Value::String(text)) = lookup(value, path) {
                return Some(Fragment::Text(text.clone()));
            }
        }

        object
            .contains_key(&self.event_field)
            .then_some(Fragment::Control)
    }
}

impl Default for ChunkParser {
    fn default() -> Self {
        Self::from_config(&GenerationConfig::default())
    }
}

fn lookup<'a>(value: &'a Value, path: &[String]) -> Option<&'a Value> {
    path.iter().try_fold(value, |current, key| current.get(key))
}

/// Incremental UTF-8 decoder for byte chunks
///
/// Multi-byte sequences split across chunk boundaries are carried into the
/// next call; invalid sequences become U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8ChunkDecoder {
    pending: Vec<u8>,
}

impl Utf8ChunkDecoder {
    /// Creates an empty decoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes as much of `bytes` (plus any carried bytes) as possible
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        let mut buffer = std::mem::take(&mut self.pending);
        buffer.extend_from_slice(bytes);

        let mut out = String::with_capacity(buffer.len());
        let mut rest: &[u8] = &buffer;

        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    out.push_str(text);
                    break;
                }
                Err(e) => {
                    let (valid, tail) = rest.split_at(e.valid_up_to());
                    if let Ok(text) = std::str::from_utf8(valid) {
                        out.push_str(text);
                    }
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &tail[len..];
                        }
                        None => {
                            self.pending = tail.to_vec();
                            break;
                        }
                    }
                }
            }
        }

        out
    }

    /// Flushes bytes left over at end of stream
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            return String::new();
        }
        let pending = std::mem::take(&mut self.pending);
        String::from_utf8_lossy(&pending).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(parser: &ChunkParser, chunks: &[&str]) -> String {
        let mut raw = String::new();
        let mut accumulated = String::new();
        for chunk in chunks {
            raw.push_str(chunk);
            accumulated.push_str(&parser.extract(chunk));
        }
        parser.finalize(&raw, &accumulated)
    }

    #[test]
    fn test_envelope_chunks_assemble_text() {
        let parser = ChunkParser::default();
        let text = feed(
            &parser,
            &[r#"{"data":{"text":"Hel"}}"#, r#"{"data":{"text":"lo!"}}"#],
        );
        assert_eq!(text, "Hello!");
    }

    #[test]
    fn test_plain_text_passes_through() {
        let parser = ChunkParser::default();
        assert_eq!(feed(&parser, &["Hi", " there"]), "Hi there");
    }

    #[test]
    fn test_literal_keeps_whitespace_and_newlines() {
        let parser = ChunkParser::default();
        assert_eq!(
            parser.parse("  line one\nline two\n"),
            vec![Fragment::Literal("  line one\nline two\n".to_string())]
        );
    }

    #[test]
    fn test_event_envelope_with_nested_text() {
        let parser = ChunkParser::default();
        assert_eq!(
            parser.parse(r#"{"event":"message","data":{"text":"Hi"}}"#),
            vec![Fragment::Text("Hi".to_string())]
        );
    }

    #[test]
    fn test_text_field_order_is_respected() {
        let parser = ChunkParser::default();
        assert_eq!(parser.extract(r#"{"text":"top","data":{"text":"nested"}}"#), "nested");
        assert_eq!(parser.extract(r#"{"content":"c"}"#), "c");
        assert_eq!(parser.extract(r#"{"message":{"data":"md"}}"#), "md");
    }

    #[test]
    fn test_concatenated_envelopes_in_one_chunk() {
        let parser = ChunkParser::default();
        let chunk = "{\"data\":{\"text\":\"a\"}}{\"data\":{\"text\":\"b\"}}\n{\"event\":\"done\"}";
        assert_eq!(
            parser.parse(chunk),
            vec![
                Fragment::Text("a".to_string()),
                Fragment::Text("b".to_string()),
                Fragment::Control
            ]
        );
    }

    #[test]
    fn test_object_without_text_or_event_is_literal() {
        let parser = ChunkParser::default();
        assert_eq!(parser.extract(r#"{"answer":42}"#), r#"{"answer":42}"#);
        assert_eq!(parser.extract("42"), "42");
    }

    #[test]
    fn test_lone_event_frame_is_literal_without_envelopes() {
        // Rule 2 needs at least one envelope; a lone frame falls through to rule 4.
        let parser = ChunkParser::default();
        assert_eq!(parser.extract(r#"{"event":"start"}"#), r#"{"event":"start"}"#);
    }

    #[test]
    fn test_sse_lines_are_split_and_unwrapped() {
        let parser = ChunkParser::default();
        let chunk = "data: {\"text\":\"Hel\"}\n\ndata: {\"text\":\"lo\"}\n\ndata: [DONE]\n\n";
        assert_eq!(parser.extract(chunk), "Hello");
    }

    #[test]
    fn test_partial_json_line_becomes_literal() {
        let parser = ChunkParser::default();
        let fragments = parser.parse("{\"data\":{\"text\":\"a\"}}\n{\"data\":{\"te");
        assert_eq!(
            fragments,
            vec![
                Fragment::Text("a".to_string()),
                Fragment::Literal("{\"data\":{\"te".to_string())
            ]
        );
    }

    #[test]
    fn test_finalize_repairs_envelope_split_across_chunks() {
        let parser = ChunkParser::default();
        let text = feed(
            &parser,
            &["{\"data\":{\"te", "xt\":\"Hel\"}}\n{\"data\":{\"text\":\"lo\"}}"],
        );
        assert_eq!(text, "Hello");
    }

    #[test]
    fn test_literal_lines_keep_terminators_next_to_envelopes() {
        let parser = ChunkParser::default();
        assert_eq!(
            parser.parse("Line one\n{\"text\":\"x\"}\nLine two"),
            vec![
                Fragment::Literal("Line one\n".to_string()),
                Fragment::Text("x".to_string()),
                Fragment::Literal("Line two".to_string())
            ]
        );
        assert_eq!(
            parser.extract("Intro\r\n\nMore\n{\"text\":\"x\"}\n"),
            "Intro\r\n\nMore\nx"
        );
    }

    #[test]
    fn test_finalize_keeps_literal_line_breaks() {
        let parser = ChunkParser::default();
        assert_eq!(feed(&parser, &["Sure:\n", "{\"text\":\"done\"}"]), "Sure:\ndone");
        assert_eq!(
            feed(&parser, &["{\"text\":\"a\"}\n", "\nPara one\nPara two"]),
            "a\nPara one\nPara two"
        );
    }

    #[test]
    fn test_structured_non_envelope_values_are_literal() {
        let parser = ChunkParser::default();
        assert_eq!(
            parser.parse("{\"text\":\"a\"} 42 {\"answer\":1}\n{\"event\":\"done\"}"),
            vec![
                Fragment::Text("a".to_string()),
                Fragment::Literal("42".to_string()),
                Fragment::Literal("{\"answer\":1}".to_string()),
                Fragment::Control
            ]
        );
    }

    #[test]
    fn test_finalize_keeps_accumulator_without_envelopes() {
        let parser = ChunkParser::default();
        assert_eq!(parser.finalize("Hi {there", "Hi {there"), "Hi {there");
    }

    #[test]
    fn test_custom_fields() {
        let parser = ChunkParser::new(&["choices.delta".to_string()], "type");
        assert_eq!(parser.extract(r#"{"choices":{"delta":"x"}}"#), "x");
        assert_eq!(parser.extract(r#"{"data":{"text":"y"}}"#), r#"{"data":{"text":"y"}}"#);
        let chunk = "{\"choices\":{\"delta\":\"x\"}}\n{\"type\":\"stop\"}";
        assert_eq!(parser.extract(chunk), "x");
    }

    #[test]
    fn test_empty_chunk_yields_nothing() {
        let parser = ChunkParser::default();
        assert!(parser.parse("").is_empty());
    }

    #[test]
    fn test_utf8_decoder_carries_split_sequence() {
        let mut decoder = Utf8ChunkDecoder::new();
        let bytes = "héllo".as_bytes();
        // 'é' is two bytes starting at index 1; split inside it.
        assert_eq!(decoder.decode(&bytes[..2]), "h");
        assert_eq!(decoder.decode(&bytes[2..]), "éllo");
        assert_eq!(decoder.finish(), "");
    }

    #[test]
    fn test_utf8_decoder_replaces_invalid_bytes() {
        let mut decoder = Utf8ChunkDecoder::new();
        assert_eq!(decoder.decode(&[b'a', 0xFF, b'b']), "a\u{FFFD}b");
    }

    #[test]
    fn test_utf8_decoder_flushes_truncated_tail() {
        let mut decoder = Utf8ChunkDecoder::new();
        assert_eq!(decoder.decode(&[b'x', 0xE2, 0x82]), "x");
        assert_eq!(decoder.finish(), "\u{FFFD}");
    }
}
