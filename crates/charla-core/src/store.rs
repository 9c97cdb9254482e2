//! Local conversation log backed by SQLite.

use std::path::Path;

use rusqlite::{params, Connection};
use tracing::info;

use crate::error::ChatError;
use crate::state::{Message, Sender};

/// An append-only, id-ordered message log.
///
/// Implementations are owned by the store worker thread, so they only need
/// to be `Send`.
pub trait ConversationStore: Send + 'static {
    /// Write a message and return the id assigned to it.
    fn append(&mut self, message: &Message) -> Result<i64, ChatError>;

    /// Every stored message, oldest first.
    fn list_all(&self) -> Result<Vec<Message>, ChatError>;
}

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) the conversation database at `path`.
    pub fn open(path: &Path) -> Result<Self, ChatError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ChatError::Persistence(format!("Failed to create {:?}: {}", parent, e)))?;
            }
        }

        let conn = Connection::open(path)
            .map_err(|e| ChatError::Persistence(format!("Failed to open database: {}", e)))?;
        conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        let store = Self::init(conn)?;
        info!("Conversation store opened at {}", path.display());
        Ok(store)
    }

    /// In-memory database, used by tests.
    pub fn in_memory() -> Result<Self, ChatError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| ChatError::Persistence(format!("Failed to open in-memory db: {}", e)))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, ChatError> {
        // AUTOINCREMENT so ids never get reused, even if rows are removed by hand.
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS chat_messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                sender TEXT NOT NULL,
                message TEXT NOT NULL
            );",
        )?;
        Ok(Self { conn })
    }
}

impl ConversationStore for SqliteStore {
    fn append(&mut self, message: &Message) -> Result<i64, ChatError> {
        self.conn
            .execute(
                "INSERT INTO chat_messages (sender, message) VALUES (?1, ?2)",
                params![message.sender.as_str(), message.text],
            )
            .map_err(|e| ChatError::Persistence(format!("Failed to save message: {}", e)))?;
        Ok(self.conn.last_insert_rowid())
    }

    fn list_all(&self) -> Result<Vec<Message>, ChatError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, sender, message FROM chat_messages ORDER BY id ASC")?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut messages = Vec::new();
        for row in rows {
            let (id, sender, text) = row?;
            let sender = Sender::from_str(&sender).ok_or_else(|| {
                ChatError::Persistence(format!("Unknown sender '{}' on message {}", sender, id))
            })?;
            messages.push(Message {
                id: Some(id),
                sender,
                text,
            });
        }
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_increase_with_each_append() {
        let mut store = SqliteStore::in_memory().unwrap();
        let first = store.append(&Message::user("hi")).unwrap();
        let second = store.append(&Message::bot("hello")).unwrap();
        let third = store.append(&Message::user("again")).unwrap();
        assert!(second > first);
        assert!(third > second);
    }

    #[test]
    fn test_list_all_returns_insertion_order() {
        let mut store = SqliteStore::in_memory().unwrap();
        store.append(&Message::user("hi")).unwrap();
        store.append(&Message::bot("hello")).unwrap();

        let messages = store.list_all().unwrap();
        let texts: Vec<&str> = messages.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["hi", "hello"]);
        assert_eq!(messages[0].sender, Sender::User);
        assert_eq!(messages[1].sender, Sender::Bot);
        assert!(messages.iter().all(|m| m.is_persisted()));
    }

    #[test]
    fn test_log_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("chat.db");

        {
            let mut store = SqliteStore::open(&path).unwrap();
            store.append(&Message::user("remember me")).unwrap();
        }

        let mut store = SqliteStore::open(&path).unwrap();
        let before = store.list_all().unwrap();
        assert_eq!(before.len(), 1);
        assert_eq!(before[0].text, "remember me");

        let next = store.append(&Message::bot("I do")).unwrap();
        assert!(next > before[0].id.unwrap());
    }

    #[test]
    fn test_unknown_sender_is_a_persistence_error() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .conn
            .execute(
                "INSERT INTO chat_messages (sender, message) VALUES ('system', 'x')",
                [],
            )
            .unwrap();
        assert!(matches!(store.list_all(), Err(ChatError::Persistence(_))));
    }

    #[test]
    fn test_utf8_text_is_preserved() {
        let mut store = SqliteStore::in_memory().unwrap();
        store.append(&Message::user("¿qué tal? 👋")).unwrap();
        assert_eq!(store.list_all().unwrap()[0].text, "¿qué tal? 👋");
    }
}
