//! `parley history` against a pre-populated database

mod common;

use assert_cmd::Command;
use parley::storage::ConversationStore;
use predicates::prelude::*;
use std::path::Path;

fn parley(db_path: &Path) -> Command {
    let mut cmd = Command::cargo_bin("parley").expect("binary built");
    cmd.env_remove("PARLEY_STORAGE_BACKEND")
        .env_remove("PARLEY_STORAGE_PATH")
        .env("RUST_LOG", "off")
        .env("NO_COLOR", "1")
        .arg("--config")
        .arg(db_path.with_file_name("missing-config.yaml"))
        .arg("--storage-path")
        .arg(db_path);
    cmd
}

#[test]
fn test_history_list_empty() {
    let (_storage, tmp) = common::create_temp_storage();
    let db_path = tmp.path().join("history.db");

    parley(&db_path)
        .args(["history", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No conversation history found."));
}

#[test]
fn test_history_list_shows_conversations() {
    let (storage, tmp) = common::create_temp_storage();
    let trip = common::conversation_with_question("Trip to Lisbon");
    storage.save_conversation(&trip).unwrap();

    parley(&tmp.path().join("history.db"))
        .args(["history", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Trip to Lisbon"))
        .stdout(predicate::str::contains(&trip.id()[..8]));
}

#[test]
fn test_history_search_filters_by_content() {
    let (storage, tmp) = common::create_temp_storage();
    storage
        .save_conversation(&common::conversation_with_question("Trip to Lisbon"))
        .unwrap();
    storage
        .save_conversation(&common::conversation_with_question("Recipe ideas"))
        .unwrap();

    parley(&tmp.path().join("history.db"))
        .args(["history", "search", "TRIP"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Trip to Lisbon"))
        .stdout(predicate::str::contains("Recipe ideas").not());
}

#[test]
fn test_history_delete_by_prefix() {
    let (storage, tmp) = common::create_temp_storage();
    let trip = common::conversation_with_question("Trip to Lisbon");
    let recipe = common::conversation_with_question("Recipe ideas");
    storage.save_conversation(&trip).unwrap();
    storage.save_conversation(&recipe).unwrap();
    storage.save_current_id(Some(trip.id())).unwrap();

    parley(&tmp.path().join("history.db"))
        .args(["history", "delete", &trip.id()[..8]])
        .assert()
        .success()
        .stdout(predicate::str::contains("Deleted conversation"));

    let remaining = storage.load_all().unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id(), recipe.id());
    assert_eq!(
        storage.load_current_id().unwrap().as_deref(),
        Some(recipe.id())
    );
}

#[test]
fn test_history_delete_unknown_fails() {
    let (_storage, tmp) = common::create_temp_storage();

    parley(&tmp.path().join("history.db"))
        .args(["history", "delete", "deadbeef"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Conversation not found"));
}
