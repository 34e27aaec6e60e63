use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Role name that bypasses ownership checks unless configured otherwise.
pub const DEFAULT_ADMIN_ROLE: &str = "admin";

/// Identity of whoever issued a call.
///
/// Authentication happens before the pipeline; by the time a `Caller` exists
/// its identifier and roles are trusted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    /// Identifier of the authenticated principal. `None` for anonymous calls.
    pub id: Option<String>,
    /// Roles held by the principal.
    #[serde(default)]
    pub roles: BTreeSet<String>,
}

impl Caller {
    /// An unauthenticated caller with no roles.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// An authenticated caller with the given roles.
    pub fn new<I, R>(id: impl Into<String>, roles: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<String>,
    {
        Self {
            id: Some(id.into()),
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether the caller carries an identity.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.id.as_deref().is_some_and(|id| !id.is_empty())
    }

    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}

/// Transport a call arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// Request/response over HTTP.
    Http,
    /// Persistent bidirectional channel (`WebSocket`).
    Channel,
    /// Typed query protocol.
    Query,
    /// Sub-invocation issued from inside another call.
    Internal,
}

impl Transport {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Channel => "channel",
            Self::Query => "query",
            Self::Internal => "internal",
        }
    }
}
