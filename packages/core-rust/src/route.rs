//! Transport-facing endpoint descriptors derived from action metadata.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// HTTP verb of a request/response route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string is not a supported HTTP verb.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported HTTP method: {0}")]
pub struct UnknownMethod(pub String);

impl FromStr for HttpMethod {
    type Err = UnknownMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "get" => Ok(Self::Get),
            "post" => Ok(Self::Post),
            "put" => Ok(Self::Put),
            "patch" => Ok(Self::Patch),
            "delete" => Ok(Self::Delete),
            _ => Err(UnknownMethod(s.to_string())),
        }
    }
}

/// One request/response endpoint.
///
/// `path` uses `:{param}` placeholders (e.g. `/docs/:id/rename`); transport
/// adapters translate them into their router's own syntax.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteDescriptor {
    pub method: HttpMethod,
    pub path: String,
    pub action_qualified_name: String,
    pub permission: String,
    pub role: Option<String>,
}

impl RouteDescriptor {
    /// Name of the identifier placeholder in `path`, if the route has one.
    #[must_use]
    pub fn path_param(&self) -> Option<&str> {
        self.path
            .split('/')
            .find_map(|segment| segment.strip_prefix(':'))
    }
}

/// One channel-transport event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelRoute {
    /// Explicit socket namespace, `None` for the default namespace.
    pub socket_namespace: Option<String>,
    /// Event name, e.g. `/docs/get` or `/v2/docs/get`.
    pub event: String,
    pub action_qualified_name: String,
}

/// Root type a query-protocol resolver is attached to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResolverRoot {
    #[default]
    Query,
    Mutation,
}

/// Binds a named query-protocol resolver to an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolverBinding {
    pub root: ResolverRoot,
    pub name: String,
    pub action_qualified_name: String,
}

/// Everything one publish cycle hands to the transport adapters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteSet {
    pub http: Vec<RouteDescriptor>,
    pub channel: Vec<ChannelRoute>,
    pub resolvers: Vec<ResolverBinding>,
}

impl RouteSet {
    #[must_use]
    pub fn len(&self) -> usize {
        self.http.len() + self.channel.len() + self.resolvers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends another set, keeping each list's order.
    pub fn extend(&mut self, other: Self) {
        self.http.extend(other.http);
        self.channel.extend(other.channel);
        self.resolvers.extend(other.resolvers);
    }
}
