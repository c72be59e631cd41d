use std::sync::Arc;

use serde_json::json;
use tracing::warn;

use tabshare_core::{
    payment::{
        NewPaymentRequest, PaymentRequestFilter, PaymentRequestRecord, PaymentRequestStore,
        PaymentStatus,
    },
    user::UserDirectory,
};

use crate::{
    error::AppError,
    realtime::{NotificationDispatcher, PAYMENT_REQUEST_UPDATED, RECEIVE_PAYMENT_REQUEST},
};

/// Payment request workflow: validation, persistence, and the fire-and-forget
/// pushes that ride on the dispatcher. A recipient being offline never fails
/// the request.
pub struct PaymentService {
    store: PaymentRequestStore,
    directory: Arc<dyn UserDirectory>,
    dispatcher: NotificationDispatcher,
}

impl PaymentService {
    pub fn new(
        store: PaymentRequestStore,
        directory: Arc<dyn UserDirectory>,
        dispatcher: NotificationDispatcher,
    ) -> Self {
        Self {
            store,
            directory,
            dispatcher,
        }
    }

    pub async fn create_payment_request(
        &self,
        request: NewPaymentRequest<'_>,
    ) -> Result<PaymentRequestRecord, AppError> {
        if request.sender_id.trim().is_empty() || request.recipient_id.trim().is_empty() {
            return Err(AppError::validation(
                "senderId and recipientId are required",
            ));
        }

        if !request.amount.is_finite() || request.amount <= 0.0 {
            return Err(AppError::validation("amount must be greater than zero"));
        }

        if request.description.trim().is_empty() {
            return Err(AppError::validation("description is required"));
        }

        // Resolve the recipient name from the directory when absent; status
        // updates echo it back to the sender.
        let recipient_name = match request.recipient_name {
            Some(name) => Some(name.to_owned()),
            None => match self.directory.lookup(request.recipient_id).await {
                Ok(profile) => profile.map(|p| p.display_name),
                Err(err) => {
                    warn!(
                        recipient_id = request.recipient_id,
                        error = %err,
                        "directory lookup failed while resolving recipient name"
                    );
                    None
                }
            },
        };

        let record = self
            .store
            .create(NewPaymentRequest {
                sender_id: request.sender_id,
                sender_name: request.sender_name,
                recipient_id: request.recipient_id,
                recipient_name: recipient_name.as_deref(),
                amount: request.amount,
                description: request.description,
                workspace_id: request.workspace_id,
            })
            .await
            .map_err(AppError::from_anyhow)?;

        self.dispatcher.notify(
            &record.recipient_id,
            RECEIVE_PAYMENT_REQUEST,
            json!({
                "id": record.id,
                "senderId": record.sender_id,
                "senderName": record.sender_name,
                "amount": record.amount,
                "description": record.description,
                "workspaceId": record.workspace_id,
                "timestamp": record.created_at,
            }),
        );

        Ok(record)
    }

    pub async fn list_for_user(
        &self,
        user_id: &str,
        filter: PaymentRequestFilter,
    ) -> Result<Vec<PaymentRequestRecord>, AppError> {
        self.store
            .list_for_user(user_id, filter)
            .await
            .map_err(AppError::from_anyhow)
    }

    pub async fn update_status(
        &self,
        request_id: &str,
        new_status: PaymentStatus,
    ) -> Result<PaymentRequestRecord, AppError> {
        let record = self
            .store
            .find_by_id(request_id)
            .await
            .map_err(AppError::from_anyhow)?
            .ok_or_else(|| {
                AppError::not_found(format!("payment request {request_id} not found"))
            })?;

        if !record.status.can_transition_to(new_status) {
            return Err(AppError::invalid_transition(
                record.status.as_str(),
                new_status.as_str(),
            ));
        }

        let applied = self
            .store
            .transition_status(request_id, record.status, new_status)
            .await
            .map_err(AppError::from_anyhow)?;

        if !applied {
            // A concurrent writer moved the request first.
            let current = self
                .store
                .find_by_id(request_id)
                .await
                .map_err(AppError::from_anyhow)?
                .map(|r| r.status)
                .unwrap_or(record.status);
            return Err(AppError::invalid_transition(
                current.as_str(),
                new_status.as_str(),
            ));
        }

        self.dispatcher.notify(
            &record.sender_id,
            PAYMENT_REQUEST_UPDATED,
            json!({
                "id": record.id,
                "status": new_status.as_str(),
                "recipientName": record.recipient_name,
            }),
        );

        self.store
            .find_by_id(request_id)
            .await
            .map_err(AppError::from_anyhow)?
            .ok_or_else(|| AppError::not_found(format!("payment request {request_id} not found")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::ErrorKind,
        realtime::QueueChannel,
        test_support::setup_state,
    };
    use tabshare_core::user::SubscriptionTier;

    fn lunch<'a>(sender: &'a str, recipient: &'a str) -> NewPaymentRequest<'a> {
        NewPaymentRequest {
            sender_id: sender,
            sender_name: "Ada",
            recipient_id: recipient,
            recipient_name: None,
            amount: 50.0,
            description: "lunch",
            workspace_id: None,
        }
    }

    #[tokio::test]
    async fn rejects_invalid_amounts_and_blank_descriptions() {
        let (_temp_dir, state) = setup_state().await;

        for amount in [0.0, -5.0, f64::NAN] {
            let err = state
                .payment_service
                .create_payment_request(NewPaymentRequest {
                    amount,
                    ..lunch("u-1", "u-2")
                })
                .await
                .expect_err("invalid amount");
            assert_eq!(err.kind(), ErrorKind::Validation);
        }

        let err = state
            .payment_service
            .create_payment_request(NewPaymentRequest {
                description: "   ",
                ..lunch("u-1", "u-2")
            })
            .await
            .expect_err("blank description");
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn recipient_name_is_resolved_from_directory() {
        let (_temp_dir, state) = setup_state().await;
        let recipient = state.seed_user("Beth", SubscriptionTier::Free).await;

        let record = state
            .payment_service
            .create_payment_request(lunch("u-1", &recipient))
            .await
            .expect("create");
        assert_eq!(record.recipient_name.as_deref(), Some("Beth"));
    }

    #[tokio::test]
    async fn online_recipient_receives_push_and_sender_hears_back() {
        let (_temp_dir, state) = setup_state().await;

        let (sender_channel, mut sender_rx) = QueueChannel::open();
        let (recipient_channel, mut recipient_rx) = QueueChannel::open();
        state.registry.register("u-1", sender_channel);
        state.registry.register("u-2", recipient_channel);

        let record = state
            .payment_service
            .create_payment_request(lunch("u-1", "u-2"))
            .await
            .expect("create");

        let event = recipient_rx.recv().await.expect("recipient push");
        assert_eq!(event.event, RECEIVE_PAYMENT_REQUEST);
        assert_eq!(event.payload["amount"], 50.0);
        assert_eq!(event.payload["senderName"], "Ada");

        let approved = state
            .payment_service
            .update_status(&record.id, PaymentStatus::Approved)
            .await
            .expect("approve");
        assert_eq!(approved.status, PaymentStatus::Approved);

        let event = sender_rx.recv().await.expect("sender push");
        assert_eq!(event.event, PAYMENT_REQUEST_UPDATED);
        assert_eq!(event.payload["status"], "approved");

        let err = state
            .payment_service
            .update_status(&record.id, PaymentStatus::Rejected)
            .await
            .expect_err("reject after approve");
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);
    }

    #[tokio::test]
    async fn offline_recipient_still_gets_a_persisted_request() {
        let (_temp_dir, state) = setup_state().await;

        let record = state
            .payment_service
            .create_payment_request(lunch("u-1", "u-2"))
            .await
            .expect("create with nobody online");

        let received = state
            .payment_service
            .list_for_user("u-2", PaymentRequestFilter::Received)
            .await
            .expect("list");
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].id, record.id);
    }

    #[tokio::test]
    async fn terminal_states_reject_all_transitions() {
        let (_temp_dir, state) = setup_state().await;

        let rejected = state
            .payment_service
            .create_payment_request(lunch("u-1", "u-2"))
            .await
            .expect("create");
        state
            .payment_service
            .update_status(&rejected.id, PaymentStatus::Rejected)
            .await
            .expect("reject");

        for next in [
            PaymentStatus::Pending,
            PaymentStatus::Approved,
            PaymentStatus::Paid,
        ] {
            let err = state
                .payment_service
                .update_status(&rejected.id, next)
                .await
                .expect_err("transition out of rejected");
            assert_eq!(err.kind(), ErrorKind::InvalidTransition);
        }

        let paid = state
            .payment_service
            .create_payment_request(lunch("u-1", "u-2"))
            .await
            .expect("create");
        state
            .payment_service
            .update_status(&paid.id, PaymentStatus::Approved)
            .await
            .expect("approve");
        state
            .payment_service
            .update_status(&paid.id, PaymentStatus::Paid)
            .await
            .expect("pay");

        let err = state
            .payment_service
            .update_status(&paid.id, PaymentStatus::Approved)
            .await
            .expect_err("transition out of paid");
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);
    }

    #[tokio::test]
    async fn unknown_request_reports_not_found() {
        let (_temp_dir, state) = setup_state().await;

        let err = state
            .payment_service
            .update_status("missing", PaymentStatus::Approved)
            .await
            .expect_err("missing request");
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
