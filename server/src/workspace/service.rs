use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::warn;

use tabshare_core::{
    user::{UserDirectory, UserStore},
    workspace::{
        MemberRole, WorkspaceDetailsPatch, WorkspaceInviteRecord, WorkspaceMemberRecord,
        WorkspaceRecord, WorkspaceStore,
    },
};

use crate::{error::AppError, workspace::invites::{InviteDelivery, build_join_link}};

/// Display name stored when the user directory cannot resolve a member.
/// Reads treat it as "needs repair" and retry the directory.
pub const MEMBER_NAME_PLACEHOLDER: &str = "Anonymous";

/// Result of issuing an invite: the stored record plus the join link the
/// caller relays to the invitee (whether or not email delivery worked).
#[derive(Debug, Clone)]
pub struct InviteIssued {
    pub invite: WorkspaceInviteRecord,
    pub join_link: String,
}

/// All workspace mutation funnels through this service. It owns the
/// authorization rules, the invite→join state machine, and the
/// per-workspace serialization that keeps the member list consistent under
/// concurrent requests.
pub struct WorkspaceService {
    workspace_store: WorkspaceStore,
    user_store: UserStore,
    directory: Arc<dyn UserDirectory>,
    invite_delivery: Arc<dyn InviteDelivery>,
    frontend_url: String,
    workspace_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl WorkspaceService {
    pub fn new(
        workspace_store: WorkspaceStore,
        user_store: UserStore,
        directory: Arc<dyn UserDirectory>,
        invite_delivery: Arc<dyn InviteDelivery>,
        frontend_url: impl Into<String>,
    ) -> Self {
        Self {
            workspace_store,
            user_store,
            directory,
            invite_delivery,
            frontend_url: frontend_url.into(),
            workspace_locks: DashMap::new(),
        }
    }

    /// Mutations to one workspace's member list are serialized through this
    /// lock; different workspaces proceed fully in parallel.
    fn lock_for(&self, workspace_id: &str) -> Arc<Mutex<()>> {
        self.workspace_locks
            .entry(workspace_id.to_owned())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub async fn fetch_workspace(&self, workspace_id: &str) -> Result<WorkspaceRecord, AppError> {
        self.workspace_store
            .find_by_id(workspace_id)
            .await
            .map_err(AppError::from_anyhow)?
            .ok_or_else(|| AppError::workspace_not_found(workspace_id))
    }

    pub async fn create_workspace(
        &self,
        owner_id: &str,
        name: &str,
        description: Option<&str>,
    ) -> Result<WorkspaceRecord, AppError> {
        let trimmed_name = name.trim();
        if trimmed_name.is_empty() {
            return Err(AppError::validation("workspace name must not be empty"));
        }

        let owner = self
            .directory
            .lookup(owner_id)
            .await
            .map_err(AppError::from_anyhow)?
            .ok_or_else(|| AppError::validation("owner not found"))?;

        if let Some(limit) = owner.tier.max_owned_workspaces() {
            let owned = self
                .workspace_store
                .count_owned_by(owner_id)
                .await
                .map_err(AppError::from_anyhow)?;

            if owned >= limit {
                return Err(AppError::quota_exceeded(owner.tier.as_str(), limit));
            }
        }

        let workspace = self
            .workspace_store
            .create(owner_id, trimmed_name, description)
            .await
            .map_err(AppError::from_anyhow)?;

        self.user_store
            .add_workspace(owner_id, &workspace.id)
            .await
            .map_err(AppError::from_anyhow)?;

        Ok(workspace)
    }

    pub async fn invite_member(
        &self,
        workspace_id: &str,
        email: &str,
        role: MemberRole,
        sender_id: &str,
    ) -> Result<InviteIssued, AppError> {
        let workspace = self.fetch_workspace(workspace_id).await?;

        if workspace.owner_id != sender_id {
            return Err(AppError::forbidden(
                "only the workspace owner can invite members",
            ));
        }

        let email = email.trim().to_ascii_lowercase();
        if email.is_empty() {
            return Err(AppError::validation("invite email must not be empty"));
        }

        let invite = self
            .workspace_store
            .upsert_invite(workspace_id, &email, role)
            .await
            .map_err(AppError::from_anyhow)?;

        let join_link = build_join_link(&self.frontend_url, workspace_id, &invite.token);

        if let Err(err) = self.invite_delivery.deliver(&invite, &join_link).await {
            warn!(
                workspace_id,
                email = %invite.email,
                error = %err,
                "invite email delivery failed, returning link only"
            );
        }

        Ok(InviteIssued { invite, join_link })
    }

    pub async fn join_workspace(
        &self,
        workspace_id: &str,
        user_id: &str,
        role: Option<MemberRole>,
        token: Option<&str>,
    ) -> Result<WorkspaceMemberRecord, AppError> {
        let workspace = self.fetch_workspace(workspace_id).await?;

        let lock = self.lock_for(workspace_id);
        let _guard = lock.lock().await;

        let resolved_role = match token {
            Some(token) => {
                let invite = self
                    .workspace_store
                    .find_invite_by_token(workspace_id, token)
                    .await
                    .map_err(AppError::from_anyhow)?
                    .ok_or_else(|| AppError::invalid_token(workspace_id))?;

                // Single use: the compare-and-remove is what decides the
                // winner when two joins race on one token.
                let consumed = self
                    .workspace_store
                    .consume_invite(workspace_id, token)
                    .await
                    .map_err(AppError::from_anyhow)?;

                if !consumed {
                    return Err(AppError::invalid_token(workspace_id));
                }

                invite.role
            }
            None => role.unwrap_or(MemberRole::Member),
        };

        let display_name = match self.directory.lookup(user_id).await {
            Ok(Some(profile)) => profile.display_name,
            Ok(None) => MEMBER_NAME_PLACEHOLDER.to_owned(),
            Err(err) => {
                warn!(user_id, error = %err, "directory lookup failed, storing placeholder name");
                MEMBER_NAME_PLACEHOLDER.to_owned()
            }
        };

        let inserted = self
            .workspace_store
            .add_member(workspace_id, user_id, Some(&display_name), resolved_role)
            .await
            .map_err(AppError::from_anyhow)?;

        if !inserted {
            return Err(AppError::already_member(workspace_id, user_id));
        }

        self.user_store
            .add_workspace(user_id, &workspace.id)
            .await
            .map_err(AppError::from_anyhow)?;

        self.workspace_store
            .get_member(workspace_id, user_id)
            .await
            .map_err(AppError::from_anyhow)?
            .ok_or_else(|| AppError::member_not_found(workspace_id, user_id))
    }

    pub async fn remove_member(
        &self,
        workspace_id: &str,
        requester_id: &str,
        target_user_id: &str,
    ) -> Result<(), AppError> {
        let workspace = self.fetch_workspace(workspace_id).await?;

        if workspace.owner_id != requester_id {
            return Err(AppError::forbidden(
                "only the workspace owner can remove members",
            ));
        }

        if workspace.owner_id == target_user_id {
            return Err(AppError::invalid_operation(
                "the workspace owner cannot be removed",
            ));
        }

        let lock = self.lock_for(workspace_id);
        let _guard = lock.lock().await;

        let removed = self
            .workspace_store
            .remove_member(workspace_id, target_user_id)
            .await
            .map_err(AppError::from_anyhow)?;

        if !removed {
            return Err(AppError::member_not_found(workspace_id, target_user_id));
        }

        self.user_store
            .remove_workspace(target_user_id, workspace_id)
            .await
            .map_err(AppError::from_anyhow)?;

        Ok(())
    }

    pub async fn set_member_salary(
        &self,
        workspace_id: &str,
        requester_id: &str,
        target_user_id: &str,
        amount: f64,
    ) -> Result<WorkspaceMemberRecord, AppError> {
        let workspace = self.fetch_workspace(workspace_id).await?;

        if workspace.owner_id != requester_id {
            return Err(AppError::forbidden(
                "only the workspace owner can set member salaries",
            ));
        }

        let salary = if amount.is_finite() { amount.max(0.0) } else { 0.0 };

        let lock = self.lock_for(workspace_id);
        let _guard = lock.lock().await;

        let updated = self
            .workspace_store
            .set_member_salary(workspace_id, target_user_id, salary)
            .await
            .map_err(AppError::from_anyhow)?;

        if !updated {
            return Err(AppError::member_not_found(workspace_id, target_user_id));
        }

        self.workspace_store
            .get_member(workspace_id, target_user_id)
            .await
            .map_err(AppError::from_anyhow)?
            .ok_or_else(|| AppError::member_not_found(workspace_id, target_user_id))
    }

    pub async fn update_workspace_details(
        &self,
        workspace_id: &str,
        requester_id: &str,
        patch: WorkspaceDetailsPatch,
    ) -> Result<WorkspaceRecord, AppError> {
        let workspace = self.fetch_workspace(workspace_id).await?;

        if workspace.owner_id != requester_id {
            return Err(AppError::forbidden(
                "only the workspace owner can update workspace details",
            ));
        }

        if let Some(name) = &patch.name {
            if name.trim().is_empty() {
                return Err(AppError::validation("workspace name must not be empty"));
            }
        }

        if let Some(budget) = patch.budget {
            if !budget.is_finite() || budget < 0.0 {
                return Err(AppError::validation("budget must be non-negative"));
            }
        }

        self.workspace_store
            .update_details(workspace_id, &patch)
            .await
            .map_err(AppError::from_anyhow)?;

        self.fetch_workspace(workspace_id).await
    }

    /// Members of a workspace, with display names repaired from the
    /// directory when the stored name is absent or a placeholder. The repair
    /// is read-side and best-effort only; rows are not written back.
    pub async fn list_members(
        &self,
        workspace_id: &str,
    ) -> Result<Vec<WorkspaceMemberRecord>, AppError> {
        let mut members = self
            .workspace_store
            .list_members(workspace_id)
            .await
            .map_err(AppError::from_anyhow)?;

        for member in &mut members {
            if !name_needs_repair(member.display_name.as_deref()) {
                continue;
            }

            match self.directory.lookup(member.user_id.as_str()).await {
                Ok(Some(profile)) => member.display_name = Some(profile.display_name),
                Ok(None) => {}
                Err(err) => {
                    warn!(
                        user_id = %member.user_id,
                        error = %err,
                        "directory lookup failed during member name repair"
                    );
                }
            }
        }

        Ok(members)
    }

    /// Workspaces the user belongs to. A user record may point at workspace
    /// ids that no longer resolve; those are dropped instead of failing the
    /// whole listing.
    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<WorkspaceRecord>, AppError> {
        let ids = self
            .user_store
            .list_workspace_ids(user_id)
            .await
            .map_err(AppError::from_anyhow)?;

        self.workspace_store
            .find_by_ids(&ids)
            .await
            .map_err(AppError::from_anyhow)
    }

    pub async fn list_invites(
        &self,
        workspace_id: &str,
    ) -> Result<Vec<WorkspaceInviteRecord>, AppError> {
        self.workspace_store
            .list_invites(workspace_id)
            .await
            .map_err(AppError::from_anyhow)
    }
}

fn name_needs_repair(name: Option<&str>) -> bool {
    match name {
        None => true,
        Some(value) => value.trim().is_empty() || value == MEMBER_NAME_PLACEHOLDER,
    }
}
