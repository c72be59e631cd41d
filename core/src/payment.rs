use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Row, Sqlite, sqlite::SqliteRow};
use uuid::Uuid;

use crate::db::Database;

/// Lifecycle of a payment request. `Rejected` and `Paid` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Approved,
    Rejected,
    Paid,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Approved => "approved",
            PaymentStatus::Rejected => "rejected",
            PaymentStatus::Paid => "paid",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(PaymentStatus::Pending),
            "approved" => Some(PaymentStatus::Approved),
            "rejected" => Some(PaymentStatus::Rejected),
            "paid" => Some(PaymentStatus::Paid),
            _ => None,
        }
    }

    /// Whether the state machine permits moving from `self` to `next`.
    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        matches!(
            (self, next),
            (PaymentStatus::Pending, PaymentStatus::Approved)
                | (PaymentStatus::Pending, PaymentStatus::Rejected)
                | (PaymentStatus::Approved, PaymentStatus::Paid)
        )
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct PaymentRequestRecord {
    pub id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub recipient_id: String,
    pub recipient_name: Option<String>,
    pub amount: f64,
    pub description: String,
    pub workspace_id: Option<String>,
    pub status: PaymentStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Which side of a payment request a listing is scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentRequestFilter {
    Sent,
    Received,
    All,
}

#[derive(Debug, Clone)]
pub struct NewPaymentRequest<'a> {
    pub sender_id: &'a str,
    pub sender_name: &'a str,
    pub recipient_id: &'a str,
    pub recipient_name: Option<&'a str>,
    pub amount: f64,
    pub description: &'a str,
    pub workspace_id: Option<&'a str>,
}

#[derive(Clone)]
pub struct PaymentRequestStore {
    pool: Pool<Sqlite>,
}

impl PaymentRequestStore {
    pub fn new(database: &Database) -> Self {
        Self {
            pool: database.pool().clone(),
        }
    }

    pub async fn create(&self, request: NewPaymentRequest<'_>) -> Result<PaymentRequestRecord> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().timestamp();

        sqlx::query(
            "INSERT INTO payment_requests
                 (id, sender_id, sender_name, recipient_id, recipient_name,
                  amount, description, workspace_id, status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(request.sender_id)
        .bind(request.sender_name)
        .bind(request.recipient_id)
        .bind(request.recipient_name)
        .bind(request.amount)
        .bind(request.description)
        .bind(request.workspace_id)
        .bind(PaymentStatus::Pending.as_str())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .with_context(|| "failed to insert payment request".to_string())?;

        Ok(PaymentRequestRecord {
            id,
            sender_id: request.sender_id.to_owned(),
            sender_name: request.sender_name.to_owned(),
            recipient_id: request.recipient_id.to_owned(),
            recipient_name: request.recipient_name.map(ToOwned::to_owned),
            amount: request.amount,
            description: request.description.to_owned(),
            workspace_id: request.workspace_id.map(ToOwned::to_owned),
            status: PaymentStatus::Pending,
            created_at: now,
            updated_at: now,
        })
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<PaymentRequestRecord>> {
        let row = sqlx::query(
            "SELECT id, sender_id, sender_name, recipient_id, recipient_name,
                    amount, description, workspace_id, status, created_at, updated_at
             FROM payment_requests WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Self::map_row))
    }

    pub async fn list_for_user(
        &self,
        user_id: &str,
        filter: PaymentRequestFilter,
    ) -> Result<Vec<PaymentRequestRecord>> {
        let rows = match filter {
            PaymentRequestFilter::Sent => {
                sqlx::query(
                    "SELECT id, sender_id, sender_name, recipient_id, recipient_name,
                            amount, description, workspace_id, status, created_at, updated_at
                     FROM payment_requests WHERE sender_id = ?
                     ORDER BY created_at DESC, id DESC",
                )
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?
            }
            PaymentRequestFilter::Received => {
                sqlx::query(
                    "SELECT id, sender_id, sender_name, recipient_id, recipient_name,
                            amount, description, workspace_id, status, created_at, updated_at
                     FROM payment_requests WHERE recipient_id = ?
                     ORDER BY created_at DESC, id DESC",
                )
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?
            }
            PaymentRequestFilter::All => {
                sqlx::query(
                    "SELECT id, sender_id, sender_name, recipient_id, recipient_name,
                            amount, description, workspace_id, status, created_at, updated_at
                     FROM payment_requests WHERE sender_id = ? OR recipient_id = ?
                     ORDER BY created_at DESC, id DESC",
                )
                .bind(user_id)
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(rows.into_iter().map(Self::map_row).collect())
    }

    /// Guarded status transition. The update only lands when the stored
    /// status still equals `from`, so racing writers cannot double-apply.
    pub async fn transition_status(
        &self,
        id: &str,
        from: PaymentStatus,
        to: PaymentStatus,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE payment_requests SET status = ?, updated_at = ?
             WHERE id = ? AND status = ?",
        )
        .bind(to.as_str())
        .bind(Utc::now().timestamp())
        .bind(id)
        .bind(from.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    fn map_row(row: SqliteRow) -> PaymentRequestRecord {
        let status: String = row.get("status");
        PaymentRequestRecord {
            id: row.get("id"),
            sender_id: row.get("sender_id"),
            sender_name: row.get("sender_name"),
            recipient_id: row.get("recipient_id"),
            recipient_name: row.get("recipient_name"),
            amount: row.get("amount"),
            description: row.get("description"),
            workspace_id: row.get("workspace_id"),
            status: PaymentStatus::parse(&status).unwrap_or(PaymentStatus::Pending),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use tempfile::TempDir;

    async fn setup() -> (TempDir, PaymentRequestStore) {
        let temp_dir = tempfile::tempdir().expect("create temp dir");
        let mut config = AppConfig::default();
        config.database_path = temp_dir
            .path()
            .join("test.db")
            .to_string_lossy()
            .into_owned();
        let database = Database::connect(&config).await.expect("connect database");
        (temp_dir, PaymentRequestStore::new(&database))
    }

    fn lunch_request<'a>() -> NewPaymentRequest<'a> {
        NewPaymentRequest {
            sender_id: "u-1",
            sender_name: "Ada",
            recipient_id: "u-2",
            recipient_name: Some("Beth"),
            amount: 50.0,
            description: "lunch",
            workspace_id: None,
        }
    }

    #[test]
    fn transition_matrix_matches_state_machine() {
        use PaymentStatus::*;

        assert!(Pending.can_transition_to(Approved));
        assert!(Pending.can_transition_to(Rejected));
        assert!(Approved.can_transition_to(Paid));

        assert!(!Pending.can_transition_to(Paid));
        assert!(!Approved.can_transition_to(Rejected));
        assert!(!Rejected.can_transition_to(Approved));
        assert!(!Paid.can_transition_to(Pending));
    }

    #[tokio::test]
    async fn create_starts_pending() {
        let (_temp_dir, store) = setup().await;

        let request = store.create(lunch_request()).await.expect("create");
        assert_eq!(request.status, PaymentStatus::Pending);
        assert_eq!(request.amount, 50.0);

        let fetched = store
            .find_by_id(&request.id)
            .await
            .expect("fetch")
            .expect("exists");
        assert_eq!(fetched.status, PaymentStatus::Pending);
    }

    #[tokio::test]
    async fn guarded_transition_applies_once() {
        let (_temp_dir, store) = setup().await;
        let request = store.create(lunch_request()).await.expect("create");

        assert!(store
            .transition_status(&request.id, PaymentStatus::Pending, PaymentStatus::Approved)
            .await
            .expect("approve"));
        assert!(!store
            .transition_status(&request.id, PaymentStatus::Pending, PaymentStatus::Rejected)
            .await
            .expect("stale reject"));

        let fetched = store
            .find_by_id(&request.id)
            .await
            .expect("fetch")
            .expect("exists");
        assert_eq!(fetched.status, PaymentStatus::Approved);
    }

    #[tokio::test]
    async fn listing_filters_by_side() {
        let (_temp_dir, store) = setup().await;
        store.create(lunch_request()).await.expect("create");
        store
            .create(NewPaymentRequest {
                sender_id: "u-2",
                sender_name: "Beth",
                recipient_id: "u-1",
                recipient_name: Some("Ada"),
                amount: 20.0,
                description: "coffee",
                workspace_id: None,
            })
            .await
            .expect("create reverse");

        let sent = store
            .list_for_user("u-1", PaymentRequestFilter::Sent)
            .await
            .expect("sent");
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].description, "lunch");

        let received = store
            .list_for_user("u-1", PaymentRequestFilter::Received)
            .await
            .expect("received");
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].description, "coffee");

        let all = store
            .list_for_user("u-1", PaymentRequestFilter::All)
            .await
            .expect("all");
        assert_eq!(all.len(), 2);
    }
}
