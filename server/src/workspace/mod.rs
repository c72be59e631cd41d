pub mod invites;
pub mod service;

pub use service::{InviteIssued, WorkspaceService};
