//! Query-protocol transport: `POST /graphql`.
//!
//! A request names one resolver binding under a root type. The reply always
//! has HTTP 200; failures are reported in the protocol's `errors` list.

use actionhub_core::{InvocationError, QueryRequest, QueryResponse, Transport};
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde_json::Value;

use super::{caller_from_headers, AppState};
use crate::service::Invocation;

/// Resolves the binding, dispatches the bound action and wraps the result.
///
/// The requested selection becomes the call's `propFilter`.
pub async fn query_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<QueryRequest>,
) -> Json<QueryResponse> {
    let QueryRequest {
        root,
        field,
        mut arguments,
        selection,
    } = request;

    let result = match state.routes.resolver_action(root, &field) {
        Some(action) => {
            if let Some(selection) = selection.filter(|fields| !fields.is_empty()) {
                arguments.insert(
                    "propFilter".to_string(),
                    Value::Array(selection.into_iter().map(Value::String).collect()),
                );
            }
            let caller = caller_from_headers(&headers);
            let invocation = Invocation::new(action, arguments, caller, Transport::Query);
            state.dispatcher.dispatch(invocation).await
        }
        None => Err(InvocationError::UnknownAction {
            name: field.clone(),
        }),
    };

    Json(match result {
        Ok(value) => QueryResponse::success(&field, value),
        Err(err) => QueryResponse::failure(&field, &err),
    })
}
