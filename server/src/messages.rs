use chrono::Utc;
use serde_json::json;

use tabshare_core::message::{MessageRecord, MessageStore, NewMessage};

use crate::{
    error::AppError,
    realtime::{NotificationDispatcher, RECEIVE_MESSAGE},
};

/// Messaging workflow. Persisted workspace messages and transient direct
/// chat pushes are independent paths: a stored note is not pushed, and a
/// relayed chat line is not stored twice.
pub struct MessageService {
    store: MessageStore,
    dispatcher: NotificationDispatcher,
}

impl MessageService {
    pub fn new(store: MessageStore, dispatcher: NotificationDispatcher) -> Self {
        Self { store, dispatcher }
    }

    pub async fn post_message(&self, message: NewMessage<'_>) -> Result<MessageRecord, AppError> {
        if message.sender_id.trim().is_empty() || message.recipient_id.trim().is_empty() {
            return Err(AppError::validation(
                "senderId and recipientId are required",
            ));
        }

        if message.content.trim().is_empty() {
            return Err(AppError::validation("message content must not be empty"));
        }

        self.store
            .create(message)
            .await
            .map_err(AppError::from_anyhow)
    }

    /// Push a direct chat line to the recipient's live session without
    /// persisting anything. Offline recipients simply miss it.
    pub fn relay_direct_message(
        &self,
        sender_id: &str,
        recipient_id: &str,
        content: &str,
        workspace_id: Option<&str>,
    ) {
        self.dispatcher.notify(
            recipient_id,
            RECEIVE_MESSAGE,
            json!({
                "senderId": sender_id,
                "content": content,
                "workspaceId": workspace_id,
                "timestamp": Utc::now().timestamp(),
            }),
        );
    }

    pub async fn list_by_workspace(
        &self,
        workspace_id: &str,
    ) -> Result<Vec<MessageRecord>, AppError> {
        self.store
            .list_by_workspace(workspace_id)
            .await
            .map_err(AppError::from_anyhow)
    }

    pub async fn mark_read(&self, message_id: &str) -> Result<(), AppError> {
        let found = self
            .store
            .mark_read(message_id)
            .await
            .map_err(AppError::from_anyhow)?;

        if !found {
            return Err(AppError::not_found(format!(
                "message {message_id} not found"
            )));
        }

        Ok(())
    }
}
