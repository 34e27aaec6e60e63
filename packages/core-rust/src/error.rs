//! Failure taxonomy shared by the pipeline and every transport.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Errors a call can end with.
///
/// Every variant aborts the remaining pipeline stages for the call and is
/// reported through the transport's native error channel.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum InvocationError {
    /// The resolved identifier was missing, empty, or could not be decoded.
    #[error("invalid identifier: {reason}")]
    InvalidIdentifier { reason: String },

    /// The action requires an entity and none was found.
    #[error("{service} entity not found")]
    ModelNotFound { service: String, id: Option<String> },

    /// Permission, role, or ownership check failed.
    #[error("forbidden: {reason}")]
    Forbidden { reason: String },

    /// A sub-invocation failed. The original cause is kept, not reinterpreted.
    #[error("call to {action} failed: {source}")]
    DownstreamFailure {
        action: String,
        #[source]
        source: Box<InvocationError>,
    },

    /// No published action has the given qualified name.
    #[error("unknown action: {name}")]
    UnknownAction { name: String },

    #[error("server overloaded, try again later")]
    Overloaded,

    /// Failure raised by an action handler with its own status.
    #[error("{message}")]
    ActionFailed { status: u16, message: String },

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl InvocationError {
    pub fn invalid_identifier(reason: impl Into<String>) -> Self {
        Self::InvalidIdentifier {
            reason: reason.into(),
        }
    }

    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self::Forbidden {
            reason: reason.into(),
        }
    }

    /// Wraps the failure of a sub-invocation of `action`.
    pub fn downstream(action: impl Into<String>, source: Self) -> Self {
        Self::DownstreamFailure {
            action: action.into(),
            source: Box::new(source),
        }
    }

    /// Stable machine-readable name of the variant.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidIdentifier { .. } => "InvalidIdentifier",
            Self::ModelNotFound { .. } => "ModelNotFound",
            Self::Forbidden { .. } => "Forbidden",
            Self::DownstreamFailure { .. } => "DownstreamFailure",
            Self::UnknownAction { .. } => "UnknownAction",
            Self::Overloaded => "Overloaded",
            Self::ActionFailed { .. } => "ActionFailed",
            Self::Internal(_) => "InternalError",
        }
    }

    /// HTTP-style status code. A downstream failure reports its cause's status.
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            Self::InvalidIdentifier { .. } => 400,
            Self::Forbidden { .. } => 403,
            Self::ModelNotFound { .. } | Self::UnknownAction { .. } => 404,
            Self::DownstreamFailure { source, .. } => source.status(),
            Self::Overloaded => 503,
            Self::ActionFailed { status, .. } => *status,
            Self::Internal(_) => 500,
        }
    }

    #[must_use]
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status())
    }

    /// The innermost error of a chain of downstream failures.
    #[must_use]
    pub fn root_cause(&self) -> &Self {
        match self {
            Self::DownstreamFailure { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Serializable form sent to callers.
    #[must_use]
    pub fn to_body(&self) -> ErrorBody {
        let data = match self {
            Self::DownstreamFailure { action, source } => Some(json!({
                "action": action,
                "cause": source.to_body(),
            })),
            Self::ModelNotFound { id: Some(id), .. } => Some(json!({ "id": id })),
            _ => None,
        };
        ErrorBody {
            name: self.kind().to_string(),
            message: self.to_string(),
            code: self.status(),
            data,
        }
    }
}

/// Wire representation of an [`InvocationError`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub name: String,
    pub message: String,
    pub code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}
