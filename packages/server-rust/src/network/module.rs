//! Network module with deferred startup lifecycle.
//!
//! `new()` wires the pipeline and publishes routes, `start()` binds the TCP
//! listener, and `serve()` starts accepting connections. Between `start()`
//! and `serve()` callers can inspect the bound port or republish routes.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use actionhub_core::{HttpMethod, RouteDescriptor};
use axum::extract::{Path, Query, State};
use axum::handler::Handler;
use axum::http::HeaderMap;
use axum::routing::{get, on, post, MethodFilter, MethodRouter};
use axum::Router;
use bytes::Bytes;
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::config::NetworkConfig;
use super::connection::{ConnectionRegistry, OutboundMessage};
use super::handlers::{
    health_handler, liveness_handler, query_handler, rest_handler, ws_namespace_handler,
    ws_upgrade_handler, AppState, RestRoute,
};
use super::middleware::with_http_layers;
use crate::service::{
    CompositeObserver, Dispatcher, InvocationPipeline, RouteTable, ServerConfig, ServiceRegistry,
};

/// Paths owned by the server itself; published routes never shadow them.
const RESERVED_PATHS: [&str; 5] = [
    "/health",
    "/health/live",
    "/ws",
    "/ws/{namespace}",
    "/graphql",
];

/// Manages the full HTTP/WebSocket server lifecycle.
///
/// Follows the deferred startup pattern:
/// 1. `new()` -- builds the pipeline, dispatcher and route table
/// 2. `start()` -- binds TCP listener to the configured address
/// 3. `serve()` -- begins accepting connections until shutdown is signalled
pub struct NetworkModule {
    config: NetworkConfig,
    listener: Option<TcpListener>,
    state: AppState,
}

impl NetworkModule {
    /// Creates a new network module without binding any port.
    ///
    /// The services' routes are published once here.
    #[must_use]
    pub fn new(
        config: NetworkConfig,
        server_config: &ServerConfig,
        services: Arc<ServiceRegistry>,
        observers: CompositeObserver,
    ) -> Self {
        let pipeline = InvocationPipeline::new(Arc::clone(&services), server_config, observers);
        let routes = Arc::new(RouteTable::new());
        routes.publish(&services);

        let state = AppState {
            dispatcher: Dispatcher::new(pipeline, server_config),
            routes,
            services,
            connections: Arc::new(ConnectionRegistry::new()),
            config: Arc::new(config.clone()),
            start_time: Instant::now(),
        };

        Self {
            config,
            listener: None,
            state,
        }
    }

    /// Shared state handed to every handler.
    #[must_use]
    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    #[must_use]
    pub fn connections(&self) -> Arc<ConnectionRegistry> {
        Arc::clone(&self.state.connections)
    }

    #[must_use]
    pub fn routes(&self) -> Arc<RouteTable> {
        Arc::clone(&self.state.routes)
    }

    /// Assembles the axum router with all routes and middleware.
    ///
    /// Routes:
    /// - every published request/response route
    /// - `GET /ws`, `GET /ws/{namespace}` -- channel transport upgrade
    /// - `POST /graphql` -- query protocol
    /// - `GET /health`, `GET /health/live`
    ///
    /// HTTP routes are read from the route table when the router is built;
    /// republishing afterwards affects the channel and query transports only.
    pub fn build_router(&self) -> Router {
        let published = self.state.routes.current();

        let router = Router::new()
            .route("/health", get(health_handler))
            .route("/health/live", get(liveness_handler))
            .route("/ws", get(ws_upgrade_handler))
            .route("/ws/{namespace}", get(ws_namespace_handler))
            .route("/graphql", post(query_handler))
            .merge(http_routes(&published.http));

        with_http_layers(router, &self.config).with_state(self.state.clone())
    }

    /// Binds the TCP listener to the configured host and port.
    ///
    /// Returns the actual bound port, which may differ from the configured
    /// port when port 0 is used (OS-assigned ephemeral port).
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound (e.g., port in use).
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();

        info!("TCP listener bound to {}:{}", self.config.host, port);

        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves connections until `shutdown` resolves.
    ///
    /// When it does, every open channel connection receives a close frame
    /// and axum finishes the in-flight requests before returning.
    ///
    /// # Errors
    ///
    /// Returns an error if `start()` was not called first or if the server
    /// hits a fatal I/O error.
    pub async fn serve(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let router = self.build_router();
        let Some(listener) = self.listener else {
            anyhow::bail!("start() must be called before serve()");
        };
        let connections = self.state.connections;

        info!("Serving HTTP/WS connections");

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown.await;
                close_connections(&connections);
            })
            .await?;
        Ok(())
    }
}

/// Sends a close frame to every open channel connection.
fn close_connections(connections: &ConnectionRegistry) {
    let handles = connections.drain_all();
    if handles.is_empty() {
        return;
    }
    info!("Closing {} channel connections", handles.len());
    for handle in &handles {
        if !handle.try_send(OutboundMessage::Close(Some("server shutting down".to_string()))) {
            warn!(connection = handle.id.0, "close frame not delivered");
        }
    }
}

// ---------------------------------------------------------------------------
// Published HTTP routes
// ---------------------------------------------------------------------------

/// Mounts published route descriptors. The first registration of a
/// `(method, path)` pair wins; later ones are skipped with a warning.
fn http_routes(routes: &[RouteDescriptor]) -> Router<AppState> {
    let mut seen: HashSet<(HttpMethod, String)> = HashSet::new();
    let mut by_path: BTreeMap<String, MethodRouter<AppState>> = BTreeMap::new();

    for route in routes {
        let path = axum_path(&route.path);
        if RESERVED_PATHS.contains(&path.as_str()) {
            warn!(
                path = %route.path,
                action = %route.action_qualified_name,
                "route shadows a server path, skipped"
            );
            continue;
        }
        if !seen.insert((route.method, path.clone())) {
            warn!(
                method = %route.method,
                path = %route.path,
                action = %route.action_qualified_name,
                "duplicate route, keeping first registration"
            );
            continue;
        }

        let rest = RestRoute {
            action: route.action_qualified_name.clone(),
        };
        let filter = method_filter(route.method);
        let existing = by_path.remove(&path);
        let method_router = if route.path_param().is_some() {
            attach(
                existing,
                filter,
                move |State(state): State<AppState>,
                      Path(path): Path<HashMap<String, String>>,
                      Query(query): Query<Vec<(String, String)>>,
                      headers: HeaderMap,
                      body: Bytes| async move {
                    rest_handler(state, &rest, path, query, &headers, &body).await
                },
            )
        } else {
            attach(
                existing,
                filter,
                move |State(state): State<AppState>,
                      Query(query): Query<Vec<(String, String)>>,
                      headers: HeaderMap,
                      body: Bytes| async move {
                    rest_handler(state, &rest, HashMap::new(), query, &headers, &body).await
                },
            )
        };
        by_path.insert(path, method_router);
    }

    by_path
        .into_iter()
        .fold(Router::new(), |router, (path, method_router)| {
            router.route(&path, method_router)
        })
}

fn attach<H, T>(
    existing: Option<MethodRouter<AppState>>,
    filter: MethodFilter,
    handler: H,
) -> MethodRouter<AppState>
where
    H: Handler<T, AppState>,
    T: 'static,
{
    match existing {
        Some(method_router) => method_router.on(filter, handler),
        None => on(filter, handler),
    }
}

/// Rewrites `:param` segments into axum's `{param}` syntax.
fn axum_path(path: &str) -> String {
    path.split('/')
        .map(|segment| match segment.strip_prefix(':') {
            Some(param) => format!("{{{param}}}"),
            None => segment.to_string(),
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn method_filter(method: HttpMethod) -> MethodFilter {
    match method {
        HttpMethod::Get => MethodFilter::GET,
        HttpMethod::Post => MethodFilter::POST,
        HttpMethod::Put => MethodFilter::PUT,
        HttpMethod::Patch => MethodFilter::PATCH,
        HttpMethod::Delete => MethodFilter::DELETE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo;

    fn module() -> NetworkModule {
        NetworkModule::new(
            NetworkConfig::default(),
            &ServerConfig::default(),
            Arc::new(demo::registry().unwrap()),
            CompositeObserver::default(),
        )
    }

    #[test]
    fn axum_path_rewrites_params() {
        assert_eq!(axum_path("/docs/:id/rename"), "/docs/{id}/rename");
        assert_eq!(axum_path("/docs/:code"), "/docs/{code}");
        assert_eq!(axum_path("/docs/get"), "/docs/get");
    }

    #[test]
    fn new_publishes_routes_without_binding() {
        let module = module();
        assert!(module.listener.is_none());
        assert!(!module.routes().current().http.is_empty());
        assert!(Arc::ptr_eq(&module.connections(), &module.state().connections));
    }

    #[test]
    fn duplicate_and_reserved_routes_are_skipped() {
        let route = |method, path: &str, action: &str| RouteDescriptor {
            method,
            path: path.to_string(),
            action_qualified_name: action.to_string(),
            permission: "public".to_string(),
            role: None,
        };
        // Would panic inside axum if duplicates reached `Router::route`.
        let _router = http_routes(&[
            route(HttpMethod::Get, "/docs/get", "docs.get"),
            route(HttpMethod::Get, "/docs/get", "other.get"),
            route(HttpMethod::Post, "/docs/get", "docs.get"),
            route(HttpMethod::Get, "/health", "health.check"),
        ]);
    }

    #[test]
    fn build_router_creates_router() {
        let _router = module().build_router();
    }

    #[tokio::test]
    async fn start_binds_to_os_assigned_port() {
        let mut module = module();
        let port = module.start().await.unwrap();
        assert!(port > 0, "OS-assigned port should be > 0");
        assert!(module.listener.is_some());
    }

    #[tokio::test]
    async fn serve_without_start_fails() {
        let result = module().serve(std::future::pending::<()>()).await;
        assert!(result.is_err());
    }
}
