use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Row, Sqlite, sqlite::SqliteRow};
use uuid::Uuid;

use crate::db::Database;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    ExpenseRequest,
    Note,
    Notification,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::ExpenseRequest => "expense_request",
            MessageKind::Note => "note",
            MessageKind::Notification => "notification",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "expense_request" => Some(MessageKind::ExpenseRequest),
            "note" => Some(MessageKind::Note),
            "notification" => Some(MessageKind::Notification),
            _ => None,
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct MessageRecord {
    pub id: String,
    pub workspace_id: Option<String>,
    pub sender_id: String,
    pub recipient_id: String,
    pub content: String,
    pub kind: MessageKind,
    pub related_expense_id: Option<String>,
    pub is_read: bool,
    pub created_at: i64,
}

#[derive(Debug, Clone)]
pub struct NewMessage<'a> {
    pub workspace_id: Option<&'a str>,
    pub sender_id: &'a str,
    pub recipient_id: &'a str,
    pub content: &'a str,
    pub kind: MessageKind,
    pub related_expense_id: Option<&'a str>,
}

#[derive(Clone)]
pub struct MessageStore {
    pool: Pool<Sqlite>,
}

impl MessageStore {
    pub fn new(database: &Database) -> Self {
        Self {
            pool: database.pool().clone(),
        }
    }

    pub async fn create(&self, message: NewMessage<'_>) -> Result<MessageRecord> {
        let id = Uuid::new_v4().to_string();
        let created_at = Utc::now().timestamp();

        sqlx::query(
            "INSERT INTO messages
                 (id, workspace_id, sender_id, recipient_id, content, kind,
                  related_expense_id, is_read, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?)",
        )
        .bind(&id)
        .bind(message.workspace_id)
        .bind(message.sender_id)
        .bind(message.recipient_id)
        .bind(message.content)
        .bind(message.kind.as_str())
        .bind(message.related_expense_id)
        .bind(created_at)
        .execute(&self.pool)
        .await
        .with_context(|| "failed to insert message".to_string())?;

        Ok(MessageRecord {
            id,
            workspace_id: message.workspace_id.map(ToOwned::to_owned),
            sender_id: message.sender_id.to_owned(),
            recipient_id: message.recipient_id.to_owned(),
            content: message.content.to_owned(),
            kind: message.kind,
            related_expense_id: message.related_expense_id.map(ToOwned::to_owned),
            is_read: false,
            created_at,
        })
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<MessageRecord>> {
        let row = sqlx::query(
            "SELECT id, workspace_id, sender_id, recipient_id, content, kind,
                    related_expense_id, is_read, created_at
             FROM messages WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Self::map_row))
    }

    pub async fn list_by_workspace(&self, workspace_id: &str) -> Result<Vec<MessageRecord>> {
        let rows = sqlx::query(
            "SELECT id, workspace_id, sender_id, recipient_id, content, kind,
                    related_expense_id, is_read, created_at
             FROM messages WHERE workspace_id = ?
             ORDER BY created_at DESC, id DESC",
        )
        .bind(workspace_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Self::map_row).collect())
    }

    /// Flip `is_read` to true. Returns true when the message exists; setting
    /// an already-read message read again reports success without touching
    /// the row.
    pub async fn mark_read(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE messages SET is_read = 1 WHERE id = ? AND is_read = 0")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }

        let exists: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM messages WHERE id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;

        Ok(exists > 0)
    }

    fn map_row(row: SqliteRow) -> MessageRecord {
        let kind: String = row.get("kind");
        MessageRecord {
            id: row.get("id"),
            workspace_id: row.get("workspace_id"),
            sender_id: row.get("sender_id"),
            recipient_id: row.get("recipient_id"),
            content: row.get("content"),
            kind: MessageKind::parse(&kind).unwrap_or(MessageKind::Note),
            related_expense_id: row.get("related_expense_id"),
            is_read: row.get::<i64, _>("is_read") != 0,
            created_at: row.get("created_at"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use tempfile::TempDir;

    async fn setup() -> (TempDir, MessageStore) {
        let temp_dir = tempfile::tempdir().expect("create temp dir");
        let mut config = AppConfig::default();
        config.database_path = temp_dir
            .path()
            .join("test.db")
            .to_string_lossy()
            .into_owned();
        let database = Database::connect(&config).await.expect("connect database");
        (temp_dir, MessageStore::new(&database))
    }

    #[tokio::test]
    async fn messages_start_unread() {
        let (_temp_dir, store) = setup().await;

        let message = store
            .create(NewMessage {
                workspace_id: Some("ws-1"),
                sender_id: "u-1",
                recipient_id: "u-2",
                content: "hello",
                kind: MessageKind::Note,
                related_expense_id: None,
            })
            .await
            .expect("create");

        assert!(!message.is_read);
    }

    #[tokio::test]
    async fn mark_read_is_idempotent() {
        let (_temp_dir, store) = setup().await;
        let message = store
            .create(NewMessage {
                workspace_id: None,
                sender_id: "u-1",
                recipient_id: "u-2",
                content: "hello",
                kind: MessageKind::Note,
                related_expense_id: None,
            })
            .await
            .expect("create");

        assert!(store.mark_read(&message.id).await.expect("first read"));
        assert!(store.mark_read(&message.id).await.expect("second read"));
        assert!(!store.mark_read("missing").await.expect("missing message"));

        let fetched = store
            .find_by_id(&message.id)
            .await
            .expect("fetch")
            .expect("exists");
        assert!(fetched.is_read);
    }

    #[tokio::test]
    async fn workspace_listing_is_newest_first() {
        let (_temp_dir, store) = setup().await;
        for content in ["first", "second"] {
            store
                .create(NewMessage {
                    workspace_id: Some("ws-1"),
                    sender_id: "u-1",
                    recipient_id: "u-2",
                    content,
                    kind: MessageKind::Note,
                    related_expense_id: None,
                })
                .await
                .expect("create");
        }

        let messages = store.list_by_workspace("ws-1").await.expect("list");
        assert_eq!(messages.len(), 2);
        // Same-second inserts fall back to id ordering; both rows are present.
        assert!(messages.iter().any(|m| m.content == "first"));
        assert!(messages.iter().any(|m| m.content == "second"));
    }
}
