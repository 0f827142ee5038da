//! Configuration management for Parley
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::error::{ParleyError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Main configuration structure for Parley
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Text-generation endpoint settings
    #[serde(default)]
    pub generation: GenerationConfig,
    /// Conversation persistence settings
    #[serde(default)]
    pub storage: StorageConfig,
    /// Conversation behavior settings
    #[serde(default)]
    pub chat: ChatConfig,
    /// Log output settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Text-generation endpoint configuration
///
/// The envelope field names describe where streamed chunks carry their text.
/// They are backend-specific, which is why they live here rather than in
/// the parser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Endpoint that accepts `{ question, history, streaming }` POSTs
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Optional bearer token sent as `Authorization: Bearer <key>`
    #[serde(default)]
    pub api_key: Option<String>,

    /// Request timeout (seconds)
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Ask the endpoint for a streamed reply
    #[serde(default = "default_streaming")]
    pub streaming: bool,

    /// Dotted paths tried in order to find the text inside a JSON chunk
    #[serde(default = "default_text_fields")]
    pub text_fields: Vec<String>,

    /// Field that marks a structured frame with no text (e.g. `{"event":"done"}`)
    #[serde(default = "default_event_field")]
    pub event_field: String,

    /// Extra request headers
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

fn default_endpoint() -> String {
    "http://localhost:8080/api/chat".to_string()
}

fn default_timeout_seconds() -> u64 {
    120
}

fn default_streaming() -> bool {
    true
}

fn default_text_fields() -> Vec<String> {
    vec![
        "data.text".to_string(),
        "text".to_string(),
        "message".to_string(),
        "content".to_string(),
        "message.data".to_string(),
    ]
}

fn default_event_field() -> String {
    "event".to_string()
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            api_key: None,
            timeout_seconds: default_timeout_seconds(),
            streaming: default_streaming(),
            text_fields: default_text_fields(),
            event_field: default_event_field(),
            headers: HashMap::new(),
        }
    }
}

/// Persistence backend selection
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// Relational store (conversation, message and attachment rows)
    #[default]
    Sqlite,
    /// Embedded key/value store holding the serialized collection
    Sled,
    /// In-process store, nothing survives the process
    Memory,
}

impl std::str::FromStr for StorageBackend {
    type Err = ParleyError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "sled" => Ok(Self::Sled),
            "memory" => Ok(Self::Memory),
            other => Err(ParleyError::Config(format!(
                "Invalid storage backend: {}. Must be one of: sqlite, sled, memory",
                other
            ))),
        }
    }
}

/// Conversation persistence configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Which backend to use
    #[serde(default)]
    pub backend: StorageBackend,

    /// Database path; defaults to the platform data directory
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Conversation behavior configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Title given to a conversation before its first user message
    #[serde(default = "default_placeholder_title")]
    pub placeholder_title: String,

    /// Number of characters of the first user message kept in the title
    #[serde(default = "default_title_max_chars")]
    pub title_max_chars: usize,

    /// Assistant content written when generation fails
    #[serde(default = "default_error_message")]
    pub error_message: String,

    /// Largest attachment accepted (bytes)
    #[serde(default = "default_max_attachment_bytes")]
    pub max_attachment_bytes: u64,
}

fn default_placeholder_title() -> String {
    "New Conversation".to_string()
}

fn default_title_max_chars() -> usize {
    20
}

fn default_error_message() -> String {
    "I'm sorry, I encountered an error processing your request. Please try again.".to_string()
}

fn default_max_attachment_bytes() -> u64 {
    5 * 1024 * 1024 // 5 MB
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            placeholder_title: default_placeholder_title(),
            title_max_chars: default_title_max_chars(),
            error_message: default_error_message(),
            max_attachment_bytes: default_max_attachment_bytes(),
        }
    }
}

/// Log output configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Emit logs as JSON lines instead of human-readable text
    #[serde(default)]
    pub json: bool,
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ParleyError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| ParleyError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(endpoint) = std::env::var("PARLEY_ENDPOINT") {
            self.generation.endpoint = endpoint;
        }

        if let Ok(api_key) = std::env::var("PARLEY_API_KEY") {
            self.generation.api_key = Some(api_key);
        }

        if let Ok(timeout) = std::env::var("PARLEY_TIMEOUT_SECONDS") {
            if let Ok(value) = timeout.parse() {
                self.generation.timeout_seconds = value;
            } else {
                tracing::warn!("Invalid PARLEY_TIMEOUT_SECONDS: {}", timeout);
            }
        }

        if let Ok(backend) = std::env::var("PARLEY_STORAGE_BACKEND") {
            match backend.parse::<StorageBackend>() {
                Ok(value) => self.storage.backend = value,
                Err(e) => tracing::warn!("{}, keeping {:?}", e, self.storage.backend),
            }
        }

        if let Ok(path) = std::env::var("PARLEY_STORAGE_PATH") {
            self.storage.path = Some(PathBuf::from(path));
        }

        if let Ok(max_chars) = std::env::var("PARLEY_TITLE_MAX_CHARS") {
            if let Ok(value) = max_chars.parse() {
                self.chat.title_max_chars = value;
            } else {
                tracing::warn!("Invalid PARLEY_TITLE_MAX_CHARS: {}", max_chars);
            }
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if cli.verbose {
            tracing::debug!("Verbose mode enabled");
        }

        if let Some(path) = &cli.storage_path {
            tracing::debug!(path = %path.display(), "CLI override: storage path");
            self.storage.path = Some(path.clone());
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns `ParleyError::Config` if any value is out of range
    pub fn validate(&self) -> Result<()> {
        let endpoint = url::Url::parse(&self.generation.endpoint).map_err(|e| {
            ParleyError::Config(format!(
                "Invalid generation endpoint {}: {}",
                self.generation.endpoint, e
            ))
        })?;

        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(ParleyError::Config(format!(
                "Generation endpoint must use http or https, got {}",
                endpoint.scheme()
            ))
            .into());
        }

        if self.generation.timeout_seconds == 0 {
            return Err(ParleyError::Config(
                "generation.timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if self.generation.text_fields.is_empty() {
            return Err(ParleyError::Config(
                "generation.text_fields must list at least one field".to_string(),
            )
            .into());
        }

        if self
            .generation
            .text_fields
            .iter()
            .any(|f| f.split('.').any(str::is_empty))
        {
            return Err(ParleyError::Config(
                "generation.text_fields entries must be non-empty dotted paths".to_string(),
            )
            .into());
        }

        if self.chat.title_max_chars == 0 {
            return Err(ParleyError::Config(
                "chat.title_max_chars must be greater than 0".to_string(),
            )
            .into());
        }

        if self.chat.placeholder_title.trim().is_empty() {
            return Err(
                ParleyError::Config("chat.placeholder_title cannot be empty".to_string()).into(),
            );
        }

        if self.chat.max_attachment_bytes == 0 {
            return Err(ParleyError::Config(
                "chat.max_attachment_bytes must be greater than 0".to_string(),
            )
            .into());
        }

        Ok(())
    }
}
