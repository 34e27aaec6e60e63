//! Health and liveness endpoint handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;

use super::AppState;

/// Returns loaded services, published route counts, open channel
/// connections and uptime as JSON.
pub async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let routes = state.routes.current();

    Json(json!({
        "status": "ok",
        "services": state.services.len(),
        "routes": {
            "http": routes.http.len(),
            "channel": routes.channel.len(),
            "resolvers": routes.resolvers.len(),
        },
        "connections": state.connections.count(),
        "uptime_secs": state.start_time.elapsed().as_secs(),
    }))
}

/// Liveness probe -- always returns 200 OK.
pub async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use actionhub_core::Caller;

    use super::*;
    use crate::network::handlers::test_state;

    #[tokio::test]
    async fn health_handler_reports_services_and_routes() {
        let state = test_state();
        let published = state.routes.current();

        let Json(body) = health_handler(State(state)).await;

        assert_eq!(body["status"], "ok");
        assert_eq!(body["services"], 2);
        assert_eq!(body["routes"]["http"], published.http.len());
        assert_eq!(body["routes"]["channel"], published.channel.len());
        assert_eq!(body["routes"]["resolvers"], 2);
        assert_eq!(body["connections"], 0);
        assert!(body["uptime_secs"].is_u64());
    }

    #[tokio::test]
    async fn health_handler_counts_connections() {
        let state = test_state();
        let (_handle, _rx) =
            state
                .connections
                .register(Caller::anonymous(), None, &state.config.connection);

        let Json(body) = health_handler(State(state)).await;
        assert_eq!(body["connections"], 1);
    }

    #[tokio::test]
    async fn liveness_handler_returns_ok() {
        assert_eq!(liveness_handler().await, StatusCode::OK);
    }
}
