pub mod channel;
pub mod dispatcher;
pub mod registry;

pub use channel::{DeliveryChannel, PushEvent, QueueChannel};
pub use dispatcher::NotificationDispatcher;
pub use registry::SessionRegistry;

/// Event names pushed over live connections. The wire names are part of the
/// client contract and must not change.
pub const RECEIVE_PAYMENT_REQUEST: &str = "receive_payment_request";
pub const PAYMENT_REQUEST_UPDATED: &str = "payment_request_updated";
pub const RECEIVE_MESSAGE: &str = "receive_message";
