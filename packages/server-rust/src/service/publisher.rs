//! Route derivation and the shared route table.
//!
//! [`ActionPublisher`] turns service descriptors into transport route
//! descriptors; [`RouteTable`] holds the set produced by the latest publish
//! cycle for the transport adapters to read.

use std::sync::Arc;

use actionhub_core::{ChannelRoute, ResolverBinding, ResolverRoot, RouteDescriptor, RouteSet, HttpMethod};
use arc_swap::ArcSwap;
use tracing::info;

use super::descriptor::{ActionDescriptor, ServiceDescriptor};
use super::registry::ServiceRegistry;

/// Derives route descriptors from published actions.
///
/// Derivation is a pure function of the descriptors, so publishing the same
/// services twice yields identical output.
pub struct ActionPublisher;

impl ActionPublisher {
    /// Routes for one service.
    ///
    /// Request/response routes come in two groups: every shortcut route of
    /// the service first, then the generic routes. Within each group actions
    /// keep declaration order.
    #[must_use]
    pub fn derive(service: &ServiceDescriptor) -> RouteSet {
        let options = service.options();
        let published: Vec<&Arc<ActionDescriptor>> =
            service.actions().filter(|action| action.publish).collect();

        let mut set = RouteSet::default();

        if options.rest_enabled {
            let ns = service.namespace();
            let id_param = options.id_param_name();

            for action in &published {
                if let Some(method) = action.default_method {
                    let path = if action.need_model {
                        format!("/{ns}/:{id_param}")
                    } else {
                        format!("/{ns}")
                    };
                    set.http.push(http_route(method, path, action));
                }
            }

            for action in &published {
                let name = &action.name;
                for method in [HttpMethod::Get, HttpMethod::Post] {
                    set.http.push(http_route(method, format!("/{ns}/{name}"), action));
                }
                for method in [HttpMethod::Get, HttpMethod::Post] {
                    set.http
                        .push(http_route(method, format!("/{ns}/:{id_param}/{name}"), action));
                }
            }
        }

        if options.ws_enabled {
            let ns = service.namespace();
            for action in &published {
                let name = &action.name;
                let mut events = vec![format!("/{ns}/{name}")];
                if let Some(version) = service.version() {
                    events.push(format!("/v{version}/{ns}/{name}"));
                }
                set.channel.extend(events.into_iter().map(|event| ChannelRoute {
                    socket_namespace: options.socket_namespace.clone(),
                    event,
                    action_qualified_name: action.qualified_name.clone(),
                }));
            }
        }

        if options.graphql_enabled {
            for action in &published {
                if let Some((root, name)) = &action.resolver {
                    set.resolvers.push(ResolverBinding {
                        root: *root,
                        name: name.clone(),
                        action_qualified_name: action.qualified_name.clone(),
                    });
                }
            }
        }

        set
    }

    /// Routes for every registered service, in load order.
    #[must_use]
    pub fn derive_all(registry: &ServiceRegistry) -> RouteSet {
        let mut set = RouteSet::default();
        for service in registry.services() {
            set.extend(Self::derive(&service));
        }
        set
    }
}

fn http_route(method: HttpMethod, path: String, action: &ActionDescriptor) -> RouteDescriptor {
    RouteDescriptor {
        method,
        path,
        action_qualified_name: action.qualified_name.clone(),
        permission: action.permission.as_str().to_string(),
        role: action.role.clone(),
    }
}

// ---------------------------------------------------------------------------
// RouteTable
// ---------------------------------------------------------------------------

/// The route set of the latest publish cycle.
///
/// Readers take a lock-free snapshot; a publish replaces the whole set.
pub struct RouteTable {
    current: ArcSwap<RouteSet>,
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new()
    }
}

impl RouteTable {
    #[must_use]
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(RouteSet::default()),
        }
    }

    /// Derives routes for the whole registry and replaces the current set.
    pub fn publish(&self, registry: &ServiceRegistry) -> Arc<RouteSet> {
        let set = Arc::new(ActionPublisher::derive_all(registry));
        info!(
            http = set.http.len(),
            channel = set.channel.len(),
            resolvers = set.resolvers.len(),
            "routes published"
        );
        self.current.store(Arc::clone(&set));
        set
    }

    pub fn replace(&self, set: RouteSet) {
        self.current.store(Arc::new(set));
    }

    #[must_use]
    pub fn current(&self) -> Arc<RouteSet> {
        self.current.load_full()
    }

    /// Qualified action bound to a channel event in a socket namespace.
    #[must_use]
    pub fn channel_action(&self, socket_namespace: Option<&str>, event: &str) -> Option<String> {
        self.current
            .load()
            .channel
            .iter()
            .find(|route| route.event == event && route.socket_namespace.as_deref() == socket_namespace)
            .map(|route| route.action_qualified_name.clone())
    }

    /// Qualified action bound to a query-protocol resolver.
    #[must_use]
    pub fn resolver_action(&self, root: ResolverRoot, name: &str) -> Option<String> {
        self.current
            .load()
            .resolvers
            .iter()
            .find(|binding| binding.root == root && binding.name == name)
            .map(|binding| binding.action_qualified_name.clone())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
