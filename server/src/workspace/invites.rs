use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use tabshare_core::workspace::WorkspaceInviteRecord;

/// External email/link delivery collaborator. A failed delivery never fails
/// the invite itself: the join link is always handed back to the caller.
#[async_trait]
pub trait InviteDelivery: Send + Sync {
    async fn deliver(&self, invite: &WorkspaceInviteRecord, join_link: &str) -> Result<()>;
}

/// Fallback when no mailer is configured: invites only return links.
#[derive(Clone, Copy, Default)]
pub struct LoggingInviteDelivery;

#[async_trait]
impl InviteDelivery for LoggingInviteDelivery {
    async fn deliver(&self, invite: &WorkspaceInviteRecord, join_link: &str) -> Result<()> {
        info!(
            workspace_id = %invite.workspace_id,
            email = %invite.email,
            join_link,
            "invite issued without email delivery"
        );
        Ok(())
    }
}

/// Join link consumed by the client's workspace join page, which reads the
/// workspace id and token from its query string.
pub fn build_join_link(frontend_url: &str, workspace_id: &str, token: &str) -> String {
    format!("{frontend_url}/workspace/join?workspaceId={workspace_id}&token={token}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_link_carries_workspace_and_token() {
        let link = build_join_link("http://localhost:3000", "ws-1", "tok-abc");
        assert_eq!(
            link,
            "http://localhost:3000/workspace/join?workspaceId=ws-1&token=tok-abc"
        );
    }
}
