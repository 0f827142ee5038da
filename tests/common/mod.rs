use parley::config::{Config, StorageBackend};
use parley::conversation::{Conversation, Message, Role};
use parley::storage::SqliteStorage;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

#[allow(dead_code)]
pub fn create_temp_storage() -> (SqliteStorage, TempDir) {
    let tmp = TempDir::new().expect("failed to create tempdir");
    let db_path = tmp.path().join("history.db");
    let storage =
        SqliteStorage::new_with_path(db_path).expect("failed to create sqlite storage with path");
    (storage, tmp)
}

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}

/// Default configuration pointed at `path` with the given backend
#[allow(dead_code)]
pub fn config_with_storage(backend: StorageBackend, path: PathBuf) -> Config {
    let mut config = Config::default();
    config.storage.backend = backend;
    config.storage.path = Some(path);
    config
}

/// Default configuration whose generator endpoint is `endpoint`
#[allow(dead_code)]
pub fn config_with_endpoint(endpoint: &str) -> Config {
    let mut config = Config::default();
    config.generation.endpoint = endpoint.to_string();
    config.storage.backend = StorageBackend::Memory;
    config
}

/// Conversation whose title comes from a first user message
#[allow(dead_code)]
pub fn conversation_with_question(question: &str) -> Conversation {
    let mut conversation = Conversation::new("New Conversation");
    conversation.push_message(Message::new(Role::User, question), 50);
    conversation.push_message(Message::new(Role::Assistant, "Sure."), 50);
    conversation
}
