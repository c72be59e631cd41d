use std::fmt;

use anyhow::Error as AnyError;
use serde::Serialize;
use serde_json::{Value as JsonValue, json};
use tracing::error;

/// Stable machine-readable classification of an application error. Every
/// domain failure maps to exactly one kind; `Internal` covers storage and
/// other infrastructure faults without leaking their detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Forbidden,
    AlreadyMember,
    InvalidToken,
    InvalidOperation,
    InvalidTransition,
    QuotaExceeded,
    Validation,
    Internal,
}

#[derive(Debug, Clone, Copy)]
struct ErrorDescriptor {
    kind: ErrorKind,
    name: &'static str,
    default_message: &'static str,
}

const NOT_FOUND_DESCRIPTOR: ErrorDescriptor = ErrorDescriptor {
    kind: ErrorKind::NotFound,
    name: "NOT_FOUND",
    default_message: "Resource not found.",
};

const FORBIDDEN_DESCRIPTOR: ErrorDescriptor = ErrorDescriptor {
    kind: ErrorKind::Forbidden,
    name: "ACTION_FORBIDDEN",
    default_message: "Action forbidden.",
};

const ALREADY_MEMBER_DESCRIPTOR: ErrorDescriptor = ErrorDescriptor {
    kind: ErrorKind::AlreadyMember,
    name: "ALREADY_MEMBER",
    default_message: "User is already a member of this workspace.",
};

const INVALID_TOKEN_DESCRIPTOR: ErrorDescriptor = ErrorDescriptor {
    kind: ErrorKind::InvalidToken,
    name: "INVALID_INVITE_TOKEN",
    default_message: "Invite token is invalid or has already been used.",
};

const INVALID_OPERATION_DESCRIPTOR: ErrorDescriptor = ErrorDescriptor {
    kind: ErrorKind::InvalidOperation,
    name: "INVALID_OPERATION",
    default_message: "Operation not permitted on this entity.",
};

const INVALID_TRANSITION_DESCRIPTOR: ErrorDescriptor = ErrorDescriptor {
    kind: ErrorKind::InvalidTransition,
    name: "INVALID_STATUS_TRANSITION",
    default_message: "Status transition is not allowed.",
};

const QUOTA_EXCEEDED_DESCRIPTOR: ErrorDescriptor = ErrorDescriptor {
    kind: ErrorKind::QuotaExceeded,
    name: "WORKSPACE_QUOTA_EXCEEDED",
    default_message: "Workspace limit for this subscription tier reached.",
};

const VALIDATION_DESCRIPTOR: ErrorDescriptor = ErrorDescriptor {
    kind: ErrorKind::Validation,
    name: "VALIDATION_ERROR",
    default_message: "Request is missing or has malformed required fields.",
};

const INTERNAL_DESCRIPTOR: ErrorDescriptor = ErrorDescriptor {
    kind: ErrorKind::Internal,
    name: "INTERNAL_ERROR",
    default_message: "An internal error occurred.",
};

#[derive(Debug)]
pub struct AppError {
    descriptor: &'static ErrorDescriptor,
    name: String,
    message: String,
    data: Option<JsonValue>,
    source: Option<AnyError>,
}

impl AppError {
    pub(crate) fn not_found(message: impl Into<String>) -> Self {
        Self::from_descriptor(&NOT_FOUND_DESCRIPTOR, Some(message.into()))
    }

    pub(crate) fn forbidden(message: impl Into<String>) -> Self {
        Self::from_descriptor(&FORBIDDEN_DESCRIPTOR, Some(message.into()))
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::from_descriptor(&VALIDATION_DESCRIPTOR, Some(message.into()))
    }

    pub(crate) fn invalid_operation(message: impl Into<String>) -> Self {
        Self::from_descriptor(&INVALID_OPERATION_DESCRIPTOR, Some(message.into()))
    }

    pub(crate) fn workspace_not_found(workspace_id: &str) -> Self {
        let message = format!("Workspace {workspace_id} not found.");

        Self::from_descriptor(&NOT_FOUND_DESCRIPTOR, Some(message))
            .with_name("WORKSPACE_NOT_FOUND")
            .with_data(json!({ "workspaceId": workspace_id }))
    }

    pub(crate) fn member_not_found(workspace_id: &str, user_id: &str) -> Self {
        let message = format!("User {user_id} is not a member of workspace {workspace_id}.");

        Self::from_descriptor(&NOT_FOUND_DESCRIPTOR, Some(message))
            .with_name("MEMBER_NOT_FOUND")
            .with_data(json!({ "workspaceId": workspace_id, "userId": user_id }))
    }

    pub(crate) fn already_member(workspace_id: &str, user_id: &str) -> Self {
        let message = format!("User {user_id} already belongs to workspace {workspace_id}.");

        Self::from_descriptor(&ALREADY_MEMBER_DESCRIPTOR, Some(message))
            .with_data(json!({ "workspaceId": workspace_id, "userId": user_id }))
    }

    pub(crate) fn invalid_token(workspace_id: &str) -> Self {
        let message =
            format!("Invite token for workspace {workspace_id} is invalid or already used.");

        Self::from_descriptor(&INVALID_TOKEN_DESCRIPTOR, Some(message))
            .with_data(json!({ "workspaceId": workspace_id }))
    }

    pub(crate) fn invalid_transition(from: &str, to: &str) -> Self {
        let message = format!("Payment request cannot move from {from} to {to}.");

        Self::from_descriptor(&INVALID_TRANSITION_DESCRIPTOR, Some(message))
            .with_data(json!({ "from": from, "to": to }))
    }

    pub(crate) fn quota_exceeded(tier: &str, limit: i64) -> Self {
        let message = format!("The {tier} tier allows owning at most {limit} workspace(s).");

        Self::from_descriptor(&QUOTA_EXCEEDED_DESCRIPTOR, Some(message))
            .with_data(json!({ "tier": tier, "limit": limit }))
    }

    pub(crate) fn internal(error: AnyError) -> Self {
        error!(?error, "internal error");
        Self::from_descriptor(&INTERNAL_DESCRIPTOR, None).with_source(error)
    }

    pub(crate) fn from_anyhow(error: AnyError) -> Self {
        Self::internal(error)
    }

    pub fn kind(&self) -> ErrorKind {
        self.descriptor.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn data(&self) -> Option<&JsonValue> {
        self.data.as_ref()
    }

    pub fn into_payload(self) -> ErrorPayload {
        let AppError {
            descriptor: _,
            name,
            message,
            data,
            source: _,
        } = self;

        ErrorPayload {
            name,
            message,
            data,
        }
    }

    fn from_descriptor(descriptor: &'static ErrorDescriptor, message: Option<String>) -> Self {
        Self {
            descriptor,
            name: descriptor.name.to_owned(),
            message: message.unwrap_or_else(|| descriptor.default_message.to_owned()),
            data: None,
            source: None,
        }
    }

    fn with_source(mut self, error: AnyError) -> Self {
        self.source = Some(error);
        self
    }

    pub(crate) fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub(crate) fn with_data(mut self, data: JsonValue) -> Self {
        self.data = Some(data);
        self
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Serializable form handed to whatever surface (HTTP, RPC, CLI) fronts the
/// engine. Infrastructure detail never crosses this boundary.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorPayload {
    pub name: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonValue>,
}
