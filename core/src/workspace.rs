use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{Pool, QueryBuilder, Row, Sqlite, sqlite::SqliteRow};
use uuid::Uuid;

use crate::{
    db::Database,
    ids::{UserId, WorkspaceId},
};

pub const DEFAULT_CURRENCY: &str = "USD";

/// Role of a member within a workspace. The workspace owner always holds
/// `Admin`; everyone else defaults to `Member` unless invited otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Admin,
    Member,
    Viewer,
}

impl MemberRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberRole::Admin => "admin",
            MemberRole::Member => "member",
            MemberRole::Viewer => "viewer",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "admin" => Some(MemberRole::Admin),
            "member" => Some(MemberRole::Member),
            "viewer" => Some(MemberRole::Viewer),
            _ => None,
        }
    }
}

impl std::fmt::Display for MemberRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct WorkspaceRecord {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub owner_id: String,
    pub budget: f64,
    pub currency: String,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone)]
pub struct WorkspaceMemberRecord {
    pub workspace_id: WorkspaceId,
    pub user_id: UserId,
    pub display_name: Option<String>,
    pub role: MemberRole,
    pub salary: f64,
    pub joined_at: i64,
}

#[derive(Debug, Clone)]
pub struct WorkspaceInviteRecord {
    pub workspace_id: String,
    pub email: String,
    pub token: String,
    pub role: MemberRole,
    pub sent_at: i64,
}

/// Partial update of workspace details. Absent fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct WorkspaceDetailsPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub budget: Option<f64>,
    pub currency: Option<String>,
}

impl WorkspaceDetailsPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.budget.is_none()
            && self.currency.is_none()
    }
}

#[derive(Clone)]
pub struct WorkspaceStore {
    pool: Pool<Sqlite>,
}

impl WorkspaceStore {
    pub fn new(database: &Database) -> Self {
        Self {
            pool: database.pool().clone(),
        }
    }

    /// Create a workspace seeded with the owner as its sole admin member.
    pub async fn create(
        &self,
        owner_id: &str,
        name: &str,
        description: Option<&str>,
    ) -> Result<WorkspaceRecord> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().timestamp();

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO workspaces (id, name, description, owner_id, budget, currency, created_at, updated_at)
             VALUES (?, ?, ?, ?, 0, ?, ?, ?)",
        )
        .bind(&id)
        .bind(name)
        .bind(description)
        .bind(owner_id)
        .bind(DEFAULT_CURRENCY)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .with_context(|| "failed to insert workspace".to_string())?;

        sqlx::query(
            "INSERT INTO workspace_members (workspace_id, user_id, role, salary, joined_at)
             VALUES (?, ?, ?, 0, ?)",
        )
        .bind(&id)
        .bind(owner_id)
        .bind(MemberRole::Admin.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await
        .with_context(|| "failed to seed workspace owner membership".to_string())?;

        tx.commit().await?;

        Ok(WorkspaceRecord {
            id,
            name: name.to_owned(),
            description: description.map(ToOwned::to_owned),
            owner_id: owner_id.to_owned(),
            budget: 0.0,
            currency: DEFAULT_CURRENCY.to_owned(),
            created_at: now,
            updated_at: now,
        })
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<WorkspaceRecord>> {
        let row = sqlx::query(
            "SELECT id, name, description, owner_id, budget, currency, created_at, updated_at
             FROM workspaces WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Self::map_workspace_row))
    }

    pub async fn find_by_ids(&self, ids: &[String]) -> Result<Vec<WorkspaceRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder = QueryBuilder::new(
            "SELECT id, name, description, owner_id, budget, currency, created_at, updated_at
             FROM workspaces WHERE id IN (",
        );
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(id);
        }
        separated.push_unseparated(") ORDER BY created_at, id");

        let rows = builder.build().fetch_all(&self.pool).await?;

        Ok(rows.into_iter().map(Self::map_workspace_row).collect())
    }

    pub async fn count_owned_by(&self, owner_id: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM workspaces WHERE owner_id = ?")
            .bind(owner_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    /// Apply a partial details update. Returns false when the workspace does
    /// not exist.
    pub async fn update_details(&self, id: &str, patch: &WorkspaceDetailsPatch) -> Result<bool> {
        if patch.is_empty() {
            return Ok(self.find_by_id(id).await?.is_some());
        }

        let mut builder = QueryBuilder::new("UPDATE workspaces SET updated_at = ");
        builder.push_bind(Utc::now().timestamp());

        if let Some(name) = &patch.name {
            builder.push(", name = ");
            builder.push_bind(name);
        }
        if let Some(description) = &patch.description {
            builder.push(", description = ");
            builder.push_bind(description);
        }
        if let Some(budget) = patch.budget {
            builder.push(", budget = ");
            builder.push_bind(budget);
        }
        if let Some(currency) = &patch.currency {
            builder.push(", currency = ");
            builder.push_bind(currency);
        }

        builder.push(" WHERE id = ");
        builder.push_bind(id);

        let result = builder.build().execute(&self.pool).await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn list_members(&self, workspace_id: &str) -> Result<Vec<WorkspaceMemberRecord>> {
        let rows = sqlx::query(
            "SELECT workspace_id, user_id, display_name, role, salary, joined_at
             FROM workspace_members WHERE workspace_id = ?
             ORDER BY joined_at, user_id",
        )
        .bind(workspace_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Self::map_member_row).collect())
    }

    pub async fn get_member(
        &self,
        workspace_id: &str,
        user_id: &str,
    ) -> Result<Option<WorkspaceMemberRecord>> {
        let row = sqlx::query(
            "SELECT workspace_id, user_id, display_name, role, salary, joined_at
             FROM workspace_members WHERE workspace_id = ? AND user_id = ?",
        )
        .bind(workspace_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Self::map_member_row))
    }

    /// Insert a member row. Returns false when the user already appears in
    /// the member list (the primary key guards against duplicates).
    pub async fn add_member(
        &self,
        workspace_id: &str,
        user_id: &str,
        display_name: Option<&str>,
        role: MemberRole,
    ) -> Result<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO workspace_members
                 (workspace_id, user_id, display_name, role, salary, joined_at)
             VALUES (?, ?, ?, ?, 0, ?)",
        )
        .bind(workspace_id)
        .bind(user_id)
        .bind(display_name)
        .bind(role.as_str())
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn remove_member(&self, workspace_id: &str, user_id: &str) -> Result<bool> {
        let result =
            sqlx::query("DELETE FROM workspace_members WHERE workspace_id = ? AND user_id = ?")
                .bind(workspace_id)
                .bind(user_id)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn set_member_salary(
        &self,
        workspace_id: &str,
        user_id: &str,
        salary: f64,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE workspace_members SET salary = ? WHERE workspace_id = ? AND user_id = ?",
        )
        .bind(salary)
        .bind(workspace_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Record a pending invite. A prior pending invite for the same email is
    /// replaced, rotating its token.
    pub async fn upsert_invite(
        &self,
        workspace_id: &str,
        email: &str,
        role: MemberRole,
    ) -> Result<WorkspaceInviteRecord> {
        let token = Uuid::new_v4().to_string();
        let sent_at = Utc::now().timestamp();

        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM workspace_invites WHERE workspace_id = ? AND email = ?")
            .bind(workspace_id)
            .bind(email)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO workspace_invites (workspace_id, email, token, role, sent_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(workspace_id)
        .bind(email)
        .bind(&token)
        .bind(role.as_str())
        .bind(sent_at)
        .execute(&mut *tx)
        .await
        .with_context(|| "failed to insert workspace invite".to_string())?;

        tx.commit().await?;

        Ok(WorkspaceInviteRecord {
            workspace_id: workspace_id.to_owned(),
            email: email.to_owned(),
            token,
            role,
            sent_at,
        })
    }

    pub async fn list_invites(&self, workspace_id: &str) -> Result<Vec<WorkspaceInviteRecord>> {
        let rows = sqlx::query(
            "SELECT workspace_id, email, token, role, sent_at
             FROM workspace_invites WHERE workspace_id = ?
             ORDER BY sent_at, email",
        )
        .bind(workspace_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Self::map_invite_row).collect())
    }

    pub async fn find_invite_by_token(
        &self,
        workspace_id: &str,
        token: &str,
    ) -> Result<Option<WorkspaceInviteRecord>> {
        let row = sqlx::query(
            "SELECT workspace_id, email, token, role, sent_at
             FROM workspace_invites WHERE workspace_id = ? AND token = ?",
        )
        .bind(workspace_id)
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Self::map_invite_row))
    }

    /// Compare-and-remove an invite by token. Exactly one of any set of
    /// racing callers observes `true`; the row is gone for everyone else.
    pub async fn consume_invite(&self, workspace_id: &str, token: &str) -> Result<bool> {
        let result =
            sqlx::query("DELETE FROM workspace_invites WHERE workspace_id = ? AND token = ?")
                .bind(workspace_id)
                .bind(token)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    fn map_workspace_row(row: SqliteRow) -> WorkspaceRecord {
        WorkspaceRecord {
            id: row.get("id"),
            name: row.get("name"),
            description: row.get("description"),
            owner_id: row.get("owner_id"),
            budget: row.get("budget"),
            currency: row.get("currency"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }

    fn map_member_row(row: SqliteRow) -> WorkspaceMemberRecord {
        let role: String = row.get("role");
        WorkspaceMemberRecord {
            workspace_id: row.get("workspace_id"),
            user_id: row.get("user_id"),
            display_name: row.get("display_name"),
            role: MemberRole::parse(&role).unwrap_or(MemberRole::Member),
            salary: row.get("salary"),
            joined_at: row.get("joined_at"),
        }
    }

    fn map_invite_row(row: SqliteRow) -> WorkspaceInviteRecord {
        let role: String = row.get("role");
        WorkspaceInviteRecord {
            workspace_id: row.get("workspace_id"),
            email: row.get("email"),
            token: row.get("token"),
            role: MemberRole::parse(&role).unwrap_or(MemberRole::Member),
            sent_at: row.get("sent_at"),
        }
    }
}
