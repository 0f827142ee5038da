//! Relational conversation store backed by SQLite
//!
//! Each conversation is a row in `conversations`, its messages are rows in
//! `messages` ordered by `position`, and attachments hang off messages.
//! Deleting a conversation cascades. The current selection lives in a
//! small `settings` table.

use super::ConversationStore;
use crate::conversation::{Attachment, Conversation, Message, Role};
use crate::error::{ParleyError, Result};
use anyhow::Context;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::PathBuf;

const CURRENT_ID_KEY: &str = "current_conversation_id";

/// Message row before its attachments are joined in
type MessageRow = (String, String, String, String);

/// SQLite-backed conversation store
///
/// A new connection is opened per operation, so the store is cheap to
/// share and holds no open handles between calls.
#[derive(Debug, Clone)]
pub struct SqliteStorage {
    db_path: PathBuf,
}

impl SqliteStorage {
    /// Create a storage instance at the given database path
    ///
    /// The parent directory is created if needed and the schema is
    /// initialized.
    ///
    /// # Examples
    ///
    /// ```
    /// use parley::storage::SqliteStorage;
    ///
    /// let dir = tempfile::tempdir().unwrap();
    /// let storage = SqliteStorage::new_with_path(dir.path().join("history.db")).unwrap();
    /// ```
    pub fn new_with_path<P: Into<PathBuf>>(db_path: P) -> Result<Self> {
        let db_path = db_path.into();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .context("Failed to create parent directory for database")
                .map_err(|e| ParleyError::Storage(e.to_string()))?;
        }

        let storage = Self { db_path };
        storage.init()?;
        Ok(storage)
    }

    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.db_path)
            .context("Failed to open database")
            .map_err(|e| ParleyError::Storage(e.to_string()))?;

        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")
            .map_err(|e| ParleyError::Storage(e.to_string()))?;

        Ok(conn)
    }

    fn init(&self) -> Result<()> {
        let conn = self.connect()?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL
                    REFERENCES conversations(id) ON DELETE CASCADE,
                position INTEGER NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                timestamp TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_messages_conversation
                ON messages(conversation_id, position);
            CREATE TABLE IF NOT EXISTS attachments (
                id TEXT PRIMARY KEY,
                message_id TEXT NOT NULL
                    REFERENCES messages(id) ON DELETE CASCADE,
                position INTEGER NOT NULL,
                name TEXT NOT NULL,
                url TEXT NOT NULL,
                mime_type TEXT NOT NULL,
                size INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );",
        )
        .context("Failed to create tables")
        .map_err(|e| ParleyError::Storage(e.to_string()))?;

        Ok(())
    }

    fn load_messages(&self, conn: &Connection, conversation_id: &str) -> Result<Vec<Message>> {
        let mut stmt = conn
            .prepare(
                "SELECT id, role, content, timestamp FROM messages
                WHERE conversation_id = ?
                ORDER BY position",
            )
            .context("Failed to prepare statement")
            .map_err(|e| ParleyError::Storage(e.to_string()))?;

        let rows: Vec<MessageRow> = stmt
            .query_map(params![conversation_id], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })
            .context("Failed to query messages")
            .map_err(|e| ParleyError::Storage(e.to_string()))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read message row")
            .map_err(|e| ParleyError::Storage(e.to_string()))?;

        let mut attachments = self.load_attachments(conn, conversation_id)?;

        rows.into_iter()
            .map(|(id, role, content, timestamp)| -> Result<Message> {
                let role: Role = role.parse()?;
                Ok(Message {
                    attachments: attachments.remove(&id).unwrap_or_default(),
                    id,
                    role,
                    content,
                    timestamp: parse_timestamp(&timestamp),
                })
            })
            .collect()
    }

    fn load_attachments(
        &self,
        conn: &Connection,
        conversation_id: &str,
    ) -> Result<HashMap<String, Vec<Attachment>>> {
        let mut stmt = conn
            .prepare(
                "SELECT a.message_id, a.id, a.name, a.url, a.mime_type, a.size
                FROM attachments a
                JOIN messages m ON m.id = a.message_id
                WHERE m.conversation_id = ?
                ORDER BY a.message_id, a.position",
            )
            .context("Failed to prepare statement")
            .map_err(|e| ParleyError::Storage(e.to_string()))?;

        let rows = stmt
            .query_map(params![conversation_id], |row| {
                let message_id: String = row.get(0)?;
                let size: i64 = row.get(5)?;
                Ok((
                    message_id,
                    Attachment {
                        id: row.get(1)?,
                        name: row.get(2)?,
                        url: row.get(3)?,
                        mime_type: row.get(4)?,
                        size: size.max(0) as u64,
                    },
                ))
            })
            .context("Failed to query attachments")
            .map_err(|e| ParleyError::Storage(e.to_string()))?;

        let mut by_message: HashMap<String, Vec<Attachment>> = HashMap::new();
        for row in rows {
            let (message_id, attachment) = row
                .context("Failed to read attachment row")
                .map_err(|e| ParleyError::Storage(e.to_string()))?;
            by_message.entry(message_id).or_default().push(attachment);
        }
        Ok(by_message)
    }
}

impl ConversationStore for SqliteStorage {
    fn load_all(&self) -> Result<Vec<Conversation>> {
        let conn = self.connect()?;

        let mut stmt = conn
            .prepare(
                "SELECT id, title, created_at, updated_at
                FROM conversations
                ORDER BY created_at DESC, rowid DESC",
            )
            .context("Failed to prepare statement")
            .map_err(|e| ParleyError::Storage(e.to_string()))?;

        let headers: Vec<(String, String, String, String)> = stmt
            .query_map([], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })
            .context("Failed to query conversations")
            .map_err(|e| ParleyError::Storage(e.to_string()))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read conversation row")
            .map_err(|e| ParleyError::Storage(e.to_string()))?;

        let mut conversations = Vec::with_capacity(headers.len());
        for (id, title, created_at, updated_at) in headers {
            let messages = self.load_messages(&conn, &id)?;
            conversations.push(Conversation::from_parts(
                id,
                title,
                messages,
                parse_timestamp(&created_at),
                parse_timestamp(&updated_at),
            ));
        }

        Ok(conversations)
    }

    fn save_conversation(&self, conversation: &Conversation) -> Result<()> {
        let mut conn = self.connect()?;

        let tx = conn
            .transaction()
            .context("Failed to start transaction")
            .map_err(|e| ParleyError::Storage(e.to_string()))?;

        tx.execute(
            "INSERT INTO conversations (id, title, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                updated_at = excluded.updated_at",
            params![
                conversation.id(),
                conversation.title(),
                format_timestamp(conversation.created_at()),
                format_timestamp(conversation.updated_at()),
            ],
        )
        .context("Failed to upsert conversation")
        .map_err(|e| ParleyError::Storage(e.to_string()))?;

        // Messages are rewritten wholesale; attachments go with them.
        tx.execute(
            "DELETE FROM messages WHERE conversation_id = ?",
            params![conversation.id()],
        )
        .context("Failed to clear messages")
        .map_err(|e| ParleyError::Storage(e.to_string()))?;

        for (position, message) in conversation.messages().iter().enumerate() {
            tx.execute(
                "INSERT INTO messages (id, conversation_id, position, role, content, timestamp)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    message.id,
                    conversation.id(),
                    position as i64,
                    message.role.as_str(),
                    message.content,
                    format_timestamp(message.timestamp),
                ],
            )
            .context("Failed to insert message")
            .map_err(|e| ParleyError::Storage(e.to_string()))?;

            for (index, attachment) in message.attachments.iter().enumerate() {
                tx.execute(
                    "INSERT INTO attachments (id, message_id, position, name, url, mime_type, size)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        attachment.id,
                        message.id,
                        index as i64,
                        attachment.name,
                        attachment.url,
                        attachment.mime_type,
                        attachment.size as i64,
                    ],
                )
                .context("Failed to insert attachment")
                .map_err(|e| ParleyError::Storage(e.to_string()))?;
            }
        }

        tx.commit()
            .context("Failed to commit transaction")
            .map_err(|e| ParleyError::Storage(e.to_string()))?;

        tracing::debug!(
            conversation_id = conversation.id(),
            messages = conversation.messages().len(),
            "Saved conversation"
        );
        Ok(())
    }

    fn delete_conversation(&self, id: &str) -> Result<()> {
        let conn = self.connect()?;

        conn.execute("DELETE FROM conversations WHERE id = ?", params![id])
            .context("Failed to delete conversation")
            .map_err(|e| ParleyError::Storage(e.to_string()))?;

        Ok(())
    }

    fn load_current_id(&self) -> Result<Option<String>> {
        let conn = self.connect()?;

        conn.query_row(
            "SELECT value FROM settings WHERE key = ?",
            params![CURRENT_ID_KEY],
            |row| row.get(0),
        )
        .optional()
        .context("Failed to query current conversation")
        .map_err(|e| ParleyError::Storage(e.to_string()).into())
    }

    fn save_current_id(&self, id: Option<&str>) -> Result<()> {
        let conn = self.connect()?;

        let result = match id {
            Some(id) => conn.execute(
                "INSERT INTO settings (key, value) VALUES (?1, ?2)
                ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![CURRENT_ID_KEY, id],
            ),
            None => conn.execute(
                "DELETE FROM settings WHERE key = ?",
                params![CURRENT_ID_KEY],
            ),
        };

        result
            .context("Failed to save current conversation")
            .map_err(|e| ParleyError::Storage(e.to_string()))?;

        Ok(())
    }
}

/// Fixed-width RFC 3339 so that text ordering matches time ordering
fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|e| {
            tracing::warn!("Unparseable timestamp {:?} in database: {}", s, e);
            Utc::now()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;
    use tempfile::tempdir;

    fn create_test_storage() -> (SqliteStorage, tempfile::TempDir) {
        let dir = tempdir().expect("failed to create tempdir");
        let db_path = dir.path().join("history.db");
        let storage = SqliteStorage::new_with_path(db_path).expect("failed to create storage");
        (storage, dir)
    }

    fn conversation_with(messages: &[(&str, Role)]) -> Conversation {
        let mut conversation = Conversation::new("New Conversation");
        for (content, role) in messages {
            conversation.push_message(Message::new(*role, *content), 20);
        }
        conversation
    }

    #[test]
    fn test_init_creates_tables() {
        let (storage, _dir) = create_test_storage();
        let conn = Connection::open(&storage.db_path).expect("open connection");
        let count: i64 = conn
            .query_row(
                "SELECT count(*) FROM sqlite_master WHERE type='table'
                AND name IN ('conversations', 'messages', 'attachments', 'settings')",
                [],
                |r| r.get(0),
            )
            .expect("query row");
        assert_eq!(count, 4);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let (storage, _dir) = create_test_storage();
        let attachment = Attachment::new("a.txt", "file:///tmp/a.txt", "text/plain", 3);
        let mut conversation = Conversation::new("New Conversation");
        conversation.push_message(
            Message::new(Role::User, "Plan a trip").with_attachments(vec![attachment.clone()]),
            20,
        );
        conversation.push_message(Message::new(Role::Assistant, "Sure"), 20);

        storage.save_conversation(&conversation).unwrap();
        let loaded = storage.load_all().unwrap();

        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0], conversation);
        assert_eq!(loaded[0].messages()[0].attachments, vec![attachment]);
    }

    #[test]
    fn test_save_updates_existing_messages() {
        let (storage, _dir) = create_test_storage();
        let mut conversation = conversation_with(&[("hi", Role::User)]);
        storage.save_conversation(&conversation).unwrap();

        let reply = Message::new(Role::Assistant, "");
        let reply_id = reply.id.clone();
        conversation.push_message(reply, 20);
        storage.save_conversation(&conversation).unwrap();
        conversation.set_message_content(&reply_id, "streamed text");
        storage.save_conversation(&conversation).unwrap();

        let loaded = storage.load_all().unwrap();
        assert_eq!(loaded[0].messages().len(), 2);
        assert_eq!(loaded[0].messages()[1].content, "streamed text");
    }

    #[test]
    fn test_load_all_most_recent_first() {
        let (storage, _dir) = create_test_storage();
        let older = conversation_with(&[("older", Role::User)]);
        sleep(Duration::from_millis(5));
        let newer = conversation_with(&[("newer", Role::User)]);

        storage.save_conversation(&older).unwrap();
        storage.save_conversation(&newer).unwrap();
        // Re-saving the older one must not move it to the front.
        storage.save_conversation(&older).unwrap();

        let loaded = storage.load_all().unwrap();
        assert_eq!(loaded[0].id(), newer.id());
        assert_eq!(loaded[1].id(), older.id());
    }

    #[test]
    fn test_delete_cascades_and_is_idempotent() {
        let (storage, _dir) = create_test_storage();
        let attachment = Attachment::new("a.txt", "file:///tmp/a.txt", "text/plain", 3);
        let mut conversation = Conversation::new("New Conversation");
        conversation.push_message(
            Message::new(Role::User, "x").with_attachments(vec![attachment]),
            20,
        );
        storage.save_conversation(&conversation).unwrap();

        storage.delete_conversation(conversation.id()).unwrap();
        storage.delete_conversation(conversation.id()).unwrap();

        assert!(storage.load_all().unwrap().is_empty());
        let conn = Connection::open(&storage.db_path).unwrap();
        let messages: i64 = conn
            .query_row("SELECT count(*) FROM messages", [], |r| r.get(0))
            .unwrap();
        let attachments: i64 = conn
            .query_row("SELECT count(*) FROM attachments", [], |r| r.get(0))
            .unwrap();
        assert_eq!(messages, 0);
        assert_eq!(attachments, 0);
    }

    #[test]
    fn test_current_id_round_trip() {
        let (storage, _dir) = create_test_storage();
        assert_eq!(storage.load_current_id().unwrap(), None);

        storage.save_current_id(Some("first")).unwrap();
        storage.save_current_id(Some("second")).unwrap();
        assert_eq!(storage.load_current_id().unwrap().as_deref(), Some("second"));

        storage.save_current_id(None).unwrap();
        assert_eq!(storage.load_current_id().unwrap(), None);
    }

    #[test]
    fn test_format_timestamp_is_fixed_width() {
        let a = format_timestamp(
            DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        );
        let b = format_timestamp(
            DateTime::parse_from_rfc3339("2024-05-01T10:00:00.5Z")
                .unwrap()
                .with_timezone(&Utc),
        );
        assert_eq!(a.len(), b.len());
        assert!(a < b);
    }

    #[test]
    fn test_unknown_role_is_storage_error() {
        let (storage, _dir) = create_test_storage();
        let conversation = conversation_with(&[("hi", Role::User)]);
        storage.save_conversation(&conversation).unwrap();

        let conn = Connection::open(&storage.db_path).unwrap();
        conn.execute("UPDATE messages SET role = 'robot'", []).unwrap();

        assert!(storage.load_all().is_err());
    }
}
