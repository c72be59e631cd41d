use std::sync::Arc;

use tabshare_core::{
    config::AppConfig,
    db::Database,
    message::MessageStore,
    payment::PaymentRequestStore,
    user::{StoreUserDirectory, UserDirectory, UserStore},
    workspace::WorkspaceStore,
};

use crate::{
    messages::MessageService,
    payments::PaymentService,
    realtime::{NotificationDispatcher, SessionRegistry},
    workspace::{
        invites::{InviteDelivery, LoggingInviteDelivery},
        service::WorkspaceService,
    },
};

/// Everything the engine needs, wired once at process start and torn down
/// with it. The session registry is owned state, not a process-wide global;
/// tests build their own.
#[derive(Clone)]
pub struct AppState {
    pub user_store: UserStore,
    pub workspace_store: WorkspaceStore,
    pub payment_store: PaymentRequestStore,
    pub message_store: MessageStore,
    pub directory: Arc<dyn UserDirectory>,
    pub registry: SessionRegistry,
    pub dispatcher: NotificationDispatcher,
    pub workspace_service: Arc<WorkspaceService>,
    pub payment_service: Arc<PaymentService>,
    pub message_service: Arc<MessageService>,
}

pub fn build_state(database: &Database, config: &AppConfig) -> AppState {
    build_state_with_delivery(database, config, Arc::new(LoggingInviteDelivery))
}

pub fn build_state_with_delivery(
    database: &Database,
    config: &AppConfig,
    invite_delivery: Arc<dyn InviteDelivery>,
) -> AppState {
    let user_store = UserStore::new(database);
    let workspace_store = WorkspaceStore::new(database);
    let payment_store = PaymentRequestStore::new(database);
    let message_store = MessageStore::new(database);

    let directory: Arc<dyn UserDirectory> = Arc::new(StoreUserDirectory::new(user_store.clone()));

    let registry = SessionRegistry::new();
    let dispatcher = NotificationDispatcher::new(registry.clone());

    let workspace_service = Arc::new(WorkspaceService::new(
        workspace_store.clone(),
        user_store.clone(),
        directory.clone(),
        invite_delivery,
        config.frontend_url.clone(),
    ));
    let payment_service = Arc::new(PaymentService::new(
        payment_store.clone(),
        directory.clone(),
        dispatcher.clone(),
    ));
    let message_service = Arc::new(MessageService::new(
        message_store.clone(),
        dispatcher.clone(),
    ));

    AppState {
        user_store,
        workspace_store,
        payment_store,
        message_store,
        directory,
        registry,
        dispatcher,
        workspace_service,
        payment_service,
        message_service,
    }
}
