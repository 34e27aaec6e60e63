//! HTTP, channel and query-protocol handler definitions.
//!
//! This module defines `AppState` (the shared state carried through axum
//! extractors), the HTTP error response, caller extraction, and re-exports
//! all handler functions for convenient access when building the router.

pub mod channel;
pub mod health;
pub mod query;
pub mod rest;

pub use channel::{ws_namespace_handler, ws_upgrade_handler};
pub use health::{health_handler, liveness_handler};
pub use query::query_handler;
pub use rest::{rest_handler, RestRoute};

use std::sync::Arc;
use std::time::Instant;

use actionhub_core::{Caller, ErrorBody, InvocationError};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

use super::{ConnectionRegistry, NetworkConfig};
use crate::service::{Dispatcher, RouteTable, ServiceRegistry};

/// Header carrying the authenticated caller id, set by a trusted upstream.
pub const CALLER_ID_HEADER: &str = "x-caller-id";
/// Header carrying the caller's comma-separated roles.
pub const CALLER_ROLES_HEADER: &str = "x-caller-roles";

/// Shared application state passed to all axum handlers via `State` extraction.
///
/// Holds `Arc` references to shared resources so cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    /// Entry point into the invocation pipeline.
    pub dispatcher: Dispatcher,
    /// Routes of the latest publish cycle.
    pub routes: Arc<RouteTable>,
    pub services: Arc<ServiceRegistry>,
    /// Open channel-transport connections.
    pub connections: Arc<ConnectionRegistry>,
    pub config: Arc<NetworkConfig>,
    /// Server process start time, used for uptime calculation.
    pub start_time: Instant,
}

/// Reads the caller identity from trusted upstream headers.
///
/// A missing or blank id yields an anonymous caller.
#[must_use]
pub fn caller_from_headers(headers: &HeaderMap) -> Caller {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    let Some(id) = header(CALLER_ID_HEADER) else {
        return Caller::anonymous();
    };
    let roles = header(CALLER_ROLES_HEADER)
        .map(|roles| {
            roles
                .split(',')
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    Caller::new(id, roles)
}

/// Error response of the request/response transport.
#[derive(Debug)]
pub enum ApiError {
    /// The call ran and failed.
    Invocation(InvocationError),
    /// The request could not be turned into a call.
    BadRequest(String),
}

impl From<InvocationError> for ApiError {
    fn from(err: InvocationError) -> Self {
        Self::Invocation(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = match &self {
            Self::Invocation(err) => err.to_body(),
            Self::BadRequest(message) => ErrorBody {
                name: "BadRequest".to_string(),
                message: message.clone(),
                code: 400,
                data: None,
            },
        };
        let status =
            StatusCode::from_u16(body.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(body)).into_response()
    }
}

/// State over the sample services, for handler tests.
#[cfg(test)]
pub(crate) fn test_state() -> AppState {
    use crate::network::NetworkModule;
    use crate::service::{CompositeObserver, ServerConfig};

    let services = crate::demo::registry().unwrap();
    NetworkModule::new(
        NetworkConfig::default(),
        &ServerConfig::default(),
        Arc::new(services),
        CompositeObserver::default(),
    )
    .state()
}
