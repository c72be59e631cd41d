pub mod error;
pub mod messages;
pub mod payments;
pub mod realtime;
pub mod state;
pub mod workspace;

pub use error::{AppError, ErrorKind};
pub use state::{AppState, build_state, build_state_with_delivery};

#[cfg(test)]
pub mod test_support;
