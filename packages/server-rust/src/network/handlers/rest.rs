//! Request/response transport: one axum route per published route
//! descriptor, all funnelled into the dispatcher.

use std::collections::HashMap;

use actionhub_core::{Params, Transport};
use axum::http::HeaderMap;
use axum::Json;
use bytes::Bytes;
use serde_json::Value;

use super::{caller_from_headers, ApiError, AppState};
use crate::service::Invocation;

/// Action bound to one mounted HTTP route.
#[derive(Debug, Clone)]
pub struct RestRoute {
    pub action: String,
}

/// Normalizes the request into call params and dispatches it.
///
/// # Errors
///
/// Returns `ApiError::BadRequest` for a body that is not a JSON object and
/// `ApiError::Invocation` when the call fails.
pub async fn rest_handler(
    state: AppState,
    route: &RestRoute,
    path: HashMap<String, String>,
    query: Vec<(String, String)>,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<Json<Value>, ApiError> {
    let params = normalize_params(path, query, body)?;
    let caller = caller_from_headers(headers);
    let invocation = Invocation::new(route.action.clone(), params, caller, Transport::Http);
    let value = state.dispatcher.dispatch(invocation).await?;
    Ok(Json(value))
}

/// Merges query string, JSON body and path segments into one params
/// mapping. Later sources win: path over body over query. Repeated query
/// keys collect into a list.
///
/// # Errors
///
/// Returns `ApiError::BadRequest` if a non-empty body is not a JSON object.
pub fn normalize_params(
    path: HashMap<String, String>,
    query: Vec<(String, String)>,
    body: &[u8],
) -> Result<Params, ApiError> {
    let mut params = Params::new();

    for (key, value) in query {
        let value = Value::String(value);
        match params.get_mut(&key) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                params.insert(key, value);
            }
        }
    }

    if !body.iter().all(u8::is_ascii_whitespace) {
        match serde_json::from_slice::<Value>(body) {
            Ok(Value::Object(fields)) => params.extend(fields),
            Ok(Value::Null) => {}
            Ok(_) => {
                return Err(ApiError::BadRequest(
                    "request body must be a JSON object".to_string(),
                ))
            }
            Err(err) => return Err(ApiError::BadRequest(format!("invalid JSON body: {err}"))),
        }
    }

    params.extend(path.into_iter().map(|(k, v)| (k, Value::String(v))));
    Ok(params)
}
