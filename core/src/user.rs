use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Row, Sqlite, sqlite::SqliteRow};
use uuid::Uuid;

use crate::db::Database;

/// Subscription tier of an account. The tier bounds how many workspaces the
/// user may own at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTier {
    Free,
    Premium,
    Enterprise,
}

impl SubscriptionTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionTier::Free => "free",
            SubscriptionTier::Premium => "premium",
            SubscriptionTier::Enterprise => "enterprise",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "free" => Some(SubscriptionTier::Free),
            "premium" => Some(SubscriptionTier::Premium),
            "enterprise" => Some(SubscriptionTier::Enterprise),
            _ => None,
        }
    }

    /// Maximum number of workspaces an account of this tier may own.
    /// `None` means unlimited.
    pub fn max_owned_workspaces(&self) -> Option<i64> {
        match self {
            SubscriptionTier::Free => Some(1),
            SubscriptionTier::Premium => Some(5),
            SubscriptionTier::Enterprise => None,
        }
    }
}

impl std::fmt::Display for SubscriptionTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: String,
    pub email: String,
    pub name: String,
    pub tier: SubscriptionTier,
    pub created_at: i64,
}

/// Directory profile surfaced to collaborators that only need identity
/// metadata, not the full account record.
#[derive(Debug, Clone)]
pub struct DirectoryProfile {
    pub user_id: String,
    pub display_name: String,
    pub tier: SubscriptionTier,
}

/// External user directory collaborator. Lookups may miss (deleted users);
/// callers are expected to tolerate that with a placeholder.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn lookup(&self, user_id: &str) -> Result<Option<DirectoryProfile>>;
}

#[derive(Clone)]
pub struct UserStore {
    pool: Pool<Sqlite>,
}

impl UserStore {
    pub fn new(database: &Database) -> Self {
        Self {
            pool: database.pool().clone(),
        }
    }

    /// Create a user, or refresh email/name/tier on an existing external id.
    pub async fn upsert(
        &self,
        id: Option<&str>,
        email: &str,
        name: &str,
        tier: SubscriptionTier,
    ) -> Result<UserRecord> {
        let id = id
            .map(ToOwned::to_owned)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let created_at = Utc::now().timestamp();

        sqlx::query(
            "INSERT INTO users (id, email, name, tier, created_at) VALUES (?, ?, ?, ?, ?)
             ON CONFLICT (id) DO UPDATE SET email = excluded.email,
                                            name = excluded.name,
                                            tier = excluded.tier",
        )
        .bind(&id)
        .bind(email)
        .bind(name)
        .bind(tier.as_str())
        .bind(created_at)
        .execute(&self.pool)
        .await
        .with_context(|| "failed to upsert user".to_string())?;

        self.find_by_id(&id)
            .await?
            .context("user missing immediately after upsert")
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<UserRecord>> {
        let row = sqlx::query("SELECT id, email, name, tier, created_at FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Self::map_row))
    }

    pub async fn set_tier(&self, id: &str, tier: SubscriptionTier) -> Result<bool> {
        let result = sqlx::query("UPDATE users SET tier = ? WHERE id = ?")
            .bind(tier.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Record that a user belongs to a workspace. Joining twice is a no-op.
    pub async fn add_workspace(&self, user_id: &str, workspace_id: &str) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO user_workspaces (user_id, workspace_id) VALUES (?, ?)")
            .bind(user_id)
            .bind(workspace_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn remove_workspace(&self, user_id: &str, workspace_id: &str) -> Result<bool> {
        let result =
            sqlx::query("DELETE FROM user_workspaces WHERE user_id = ? AND workspace_id = ?")
                .bind(user_id)
                .bind(workspace_id)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn list_workspace_ids(&self, user_id: &str) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT workspace_id FROM user_workspaces WHERE user_id = ? ORDER BY workspace_id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| row.get::<String, _>("workspace_id"))
            .collect())
    }

    fn map_row(row: SqliteRow) -> UserRecord {
        let tier: String = row.get("tier");
        UserRecord {
            id: row.get("id"),
            email: row.get("email"),
            name: row.get("name"),
            tier: SubscriptionTier::parse(&tier).unwrap_or(SubscriptionTier::Free),
            created_at: row.get("created_at"),
        }
    }
}

/// Default directory implementation backed by the local user store.
#[derive(Clone)]
pub struct StoreUserDirectory {
    users: UserStore,
}

impl StoreUserDirectory {
    pub fn new(users: UserStore) -> Self {
        Self { users }
    }
}

#[async_trait]
impl UserDirectory for StoreUserDirectory {
    async fn lookup(&self, user_id: &str) -> Result<Option<DirectoryProfile>> {
        let record = self.users.find_by_id(user_id).await?;

        Ok(record.map(|user| DirectoryProfile {
            user_id: user.id,
            display_name: user.name,
            tier: user.tier,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use tempfile::TempDir;

    async fn setup() -> (TempDir, UserStore) {
        let temp_dir = tempfile::tempdir().expect("create temp dir");
        let mut config = AppConfig::default();
        config.database_path = temp_dir
            .path()
            .join("test.db")
            .to_string_lossy()
            .into_owned();
        let database = Database::connect(&config).await.expect("connect database");
        (temp_dir, UserStore::new(&database))
    }

    #[tokio::test]
    async fn upsert_creates_then_refreshes() {
        let (_temp_dir, store) = setup().await;

        let created = store
            .upsert(Some("u-1"), "a@example.com", "Ada", SubscriptionTier::Free)
            .await
            .expect("create user");
        assert_eq!(created.name, "Ada");

        let refreshed = store
            .upsert(
                Some("u-1"),
                "a@example.com",
                "Ada L.",
                SubscriptionTier::Premium,
            )
            .await
            .expect("refresh user");
        assert_eq!(refreshed.name, "Ada L.");
        assert_eq!(refreshed.tier, SubscriptionTier::Premium);
    }

    #[tokio::test]
    async fn workspace_references_are_idempotent() {
        let (_temp_dir, store) = setup().await;
        store
            .upsert(Some("u-1"), "a@example.com", "Ada", SubscriptionTier::Free)
            .await
            .expect("create user");

        store.add_workspace("u-1", "ws-1").await.expect("add once");
        store.add_workspace("u-1", "ws-1").await.expect("add twice");

        let ids = store.list_workspace_ids("u-1").await.expect("list");
        assert_eq!(ids, vec!["ws-1".to_string()]);

        assert!(store.remove_workspace("u-1", "ws-1").await.expect("remove"));
        assert!(!store
            .remove_workspace("u-1", "ws-1")
            .await
            .expect("remove again"));
    }

    #[tokio::test]
    async fn directory_lookup_misses_cleanly() {
        let (_temp_dir, store) = setup().await;
        let directory = StoreUserDirectory::new(store);

        let profile = directory.lookup("ghost").await.expect("lookup");
        assert!(profile.is_none());
    }

    #[test]
    fn tier_limits_match_plan_matrix() {
        assert_eq!(SubscriptionTier::Free.max_owned_workspaces(), Some(1));
        assert_eq!(SubscriptionTier::Premium.max_owned_workspaces(), Some(5));
        assert_eq!(SubscriptionTier::Enterprise.max_owned_workspaces(), None);
    }
}
