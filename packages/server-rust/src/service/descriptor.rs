//! Declarative service and action metadata.
//!
//! Services are declared once through [`ServiceDescriptor::builder`]. Each
//! action is given either as a bare handler ([`ActionSpec::Inline`]) or as a
//! handler plus metadata ([`ActionSpec::Full`]); both are normalized into a
//! single [`ActionDescriptor`] shape when the service is built, with
//! permission and role inherited from the service defaults.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use actionhub_core::{HttpMethod, InvocationError, PopulationSchema, ResolverRoot};

use super::operation::{ActionOutput, InvocationContext};
use crate::traits::{DocumentStore, IdentifierCodec};

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Future returned by an action handler.
pub type HandlerFuture =
    Pin<Box<dyn Future<Output = Result<ActionOutput, InvocationError>> + Send>>;

/// Business logic behind an action.
///
/// Implemented for every `Fn(Arc<InvocationContext>) -> impl Future` closure,
/// so most handlers are written inline as `|ctx| async move { .. }`.
pub trait ActionHandler: Send + Sync + 'static {
    fn handle(&self, ctx: Arc<InvocationContext>) -> HandlerFuture;
}

impl<F, Fut> ActionHandler for F
where
    F: Fn(Arc<InvocationContext>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ActionOutput, InvocationError>> + Send + 'static,
{
    fn handle(&self, ctx: Arc<InvocationContext>) -> HandlerFuture {
        Box::pin(self(ctx))
    }
}

/// Shared, type-erased handler.
pub type Handler = Arc<dyn ActionHandler>;

// ---------------------------------------------------------------------------
// Permission
// ---------------------------------------------------------------------------

/// Capability an action requires from its caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Permission {
    /// Anyone, including anonymous callers.
    #[default]
    Public,
    /// Any caller with an identity.
    Authenticated,
    /// The caller must own the resolved entity (or be an administrator).
    Owner,
    /// Administrators only.
    Admin,
}

impl Permission {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Authenticated => "authenticated",
            Self::Owner => "owner",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Self::Public),
            "authenticated" => Ok(Self::Authenticated),
            "owner" => Ok(Self::Owner),
            "admin" => Ok(Self::Admin),
            other => Err(anyhow::anyhow!("unknown permission: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// Optional metadata attached to a [`ActionSpec::Full`] action.
#[derive(Debug, Clone)]
pub struct ActionMeta {
    permission: Option<Permission>,
    role: Option<String>,
    publish: bool,
    default_method: Option<HttpMethod>,
    need_model: bool,
    resolver: Option<(ResolverRoot, String)>,
}

impl Default for ActionMeta {
    fn default() -> Self {
        Self {
            permission: None,
            role: None,
            publish: true,
            default_method: None,
            need_model: false,
            resolver: None,
        }
    }
}

impl ActionMeta {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn permission(mut self, permission: Permission) -> Self {
        self.permission = Some(permission);
        self
    }

    #[must_use]
    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    /// Keeps the action callable internally but off every transport.
    #[must_use]
    pub fn unpublished(mut self) -> Self {
        self.publish = false;
        self
    }

    /// Enables the name-elided shortcut route with the given verb.
    #[must_use]
    pub fn default_method(mut self, method: HttpMethod) -> Self {
        self.default_method = Some(method);
        self
    }

    /// Resolves the target entity before the handler runs.
    #[must_use]
    pub fn need_model(mut self) -> Self {
        self.need_model = true;
        self
    }

    /// Binds the action as a `Query` resolver.
    #[must_use]
    pub fn query(mut self, name: impl Into<String>) -> Self {
        self.resolver = Some((ResolverRoot::Query, name.into()));
        self
    }

    /// Binds the action as a `Mutation` resolver.
    #[must_use]
    pub fn mutation(mut self, name: impl Into<String>) -> Self {
        self.resolver = Some((ResolverRoot::Mutation, name.into()));
        self
    }
}

/// An action as declared by a service author.
pub enum ActionSpec {
    /// A bare handler; every setting comes from the service defaults.
    Inline(Handler),
    /// A handler with explicit metadata.
    Full { handler: Handler, meta: ActionMeta },
}

impl ActionSpec {
    pub fn inline(handler: impl ActionHandler) -> Self {
        Self::Inline(Arc::new(handler))
    }

    pub fn full(handler: impl ActionHandler, meta: ActionMeta) -> Self {
        Self::Full {
            handler: Arc::new(handler),
            meta,
        }
    }
}

/// Normalized, immutable action metadata.
pub struct ActionDescriptor {
    pub name: String,
    /// `{service}.{action}`.
    pub qualified_name: String,
    pub handler: Handler,
    pub permission: Permission,
    pub role: Option<String>,
    pub publish: bool,
    pub default_method: Option<HttpMethod>,
    pub need_model: bool,
    pub resolver: Option<(ResolverRoot, String)>,
}

impl fmt::Debug for ActionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionDescriptor")
            .field("qualified_name", &self.qualified_name)
            .field("permission", &self.permission)
            .field("role", &self.role)
            .field("publish", &self.publish)
            .field("default_method", &self.default_method)
            .field("need_model", &self.need_model)
            .field("resolver", &self.resolver)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Services
// ---------------------------------------------------------------------------

/// Recognized per-service configuration.
#[derive(Debug, Clone)]
pub struct ServiceOptions {
    pub rest_enabled: bool,
    pub ws_enabled: bool,
    pub graphql_enabled: bool,
    pub default_permission: Permission,
    pub default_role: Option<String>,
    /// Clients address entities by encoded `code` rather than raw `id`.
    pub hashed_identity: bool,
    /// Overrides the path placeholder name (`code`/`id` by default).
    pub id_param_name: Option<String>,
    /// Entity field compared with the caller's id by owner-only checks.
    pub owner_field: String,
    /// Fields kept when a caller passes `propFilter: true`.
    pub default_fields: Option<Vec<String>>,
    /// Population schema applied when a caller passes `populate: true`.
    pub populate: PopulationSchema,
    /// Store collection; defaults to the service name.
    pub collection: Option<String>,
    /// Explicit channel namespace.
    pub socket_namespace: Option<String>,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            rest_enabled: true,
            ws_enabled: true,
            graphql_enabled: true,
            default_permission: Permission::Public,
            default_role: None,
            hashed_identity: false,
            id_param_name: None,
            owner_field: "owner".to_string(),
            default_fields: None,
            populate: PopulationSchema::new(),
            collection: None,
            socket_namespace: None,
        }
    }
}

impl ServiceOptions {
    /// Path placeholder for identifier-in-path routes.
    #[must_use]
    pub fn id_param_name(&self) -> &str {
        match &self.id_param_name {
            Some(name) => name,
            None if self.hashed_identity => "code",
            None => "id",
        }
    }
}

/// A named group of actions sharing namespace, version and defaults.
///
/// Immutable after [`ServiceDescriptorBuilder::build`], except for the store
/// handle bound once by the registry at load time.
pub struct ServiceDescriptor {
    name: String,
    version: Option<u32>,
    namespace: String,
    options: ServiceOptions,
    actions: Vec<Arc<ActionDescriptor>>,
    index: HashMap<String, usize>,
    codec: Option<Arc<dyn IdentifierCodec>>,
    store: OnceLock<Arc<dyn DocumentStore>>,
}

impl fmt::Debug for ServiceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceDescriptor")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("namespace", &self.namespace)
            .field("options", &self.options)
            .field("actions", &self.actions)
            .field("has_codec", &self.codec.is_some())
            .field("store_bound", &self.store.get().is_some())
            .finish()
    }
}

impl ServiceDescriptor {
    pub fn builder(name: impl Into<String>) -> ServiceDescriptorBuilder {
        ServiceDescriptorBuilder {
            name: name.into(),
            version: None,
            namespace: None,
            options: ServiceOptions::default(),
            codec: None,
            actions: Vec::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn version(&self) -> Option<u32> {
        self.version
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    #[must_use]
    pub fn options(&self) -> &ServiceOptions {
        &self.options
    }

    /// Actions in declaration order.
    pub fn actions(&self) -> impl Iterator<Item = &Arc<ActionDescriptor>> {
        self.actions.iter()
    }

    #[must_use]
    pub fn action(&self, name: &str) -> Option<&Arc<ActionDescriptor>> {
        self.index.get(name).map(|&i| &self.actions[i])
    }

    #[must_use]
    pub fn codec(&self) -> Option<&Arc<dyn IdentifierCodec>> {
        self.codec.as_ref()
    }

    #[must_use]
    pub fn collection(&self) -> &str {
        self.options.collection.as_deref().unwrap_or(&self.name)
    }

    /// Attaches the backing store. Only the first binding takes effect;
    /// returns `false` if a store was already bound.
    pub fn bind_store(&self, store: Arc<dyn DocumentStore>) -> bool {
        self.store.set(store).is_ok()
    }

    #[must_use]
    pub fn store(&self) -> Option<&Arc<dyn DocumentStore>> {
        self.store.get()
    }
}

/// Collects a service declaration and normalizes it into a
/// [`ServiceDescriptor`].
pub struct ServiceDescriptorBuilder {
    name: String,
    version: Option<u32>,
    namespace: Option<String>,
    options: ServiceOptions,
    codec: Option<Arc<dyn IdentifierCodec>>,
    actions: Vec<(String, ActionSpec)>,
}

impl ServiceDescriptorBuilder {
    #[must_use]
    pub fn version(mut self, version: u32) -> Self {
        self.version = Some(version);
        self
    }

    /// Routing prefix; defaults to the service name.
    #[must_use]
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    #[must_use]
    pub fn options(mut self, options: ServiceOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn codec(mut self, codec: impl IdentifierCodec + 'static) -> Self {
        self.codec = Some(Arc::new(codec));
        self
    }

    #[must_use]
    pub fn action(mut self, name: impl Into<String>, spec: ActionSpec) -> Self {
        self.actions.push((name.into(), spec));
        self
    }

    /// Normalizes every action and freezes the descriptor.
    ///
    /// # Errors
    ///
    /// Returns an error if the service or an action has an empty or dotted
    /// name, or if two actions share a name.
    pub fn build(self) -> anyhow::Result<ServiceDescriptor> {
        anyhow::ensure!(
            valid_segment(&self.name),
            "invalid service name: {:?}",
            self.name
        );

        let mut actions = Vec::with_capacity(self.actions.len());
        let mut index = HashMap::with_capacity(self.actions.len());

        for (name, spec) in self.actions {
            anyhow::ensure!(
                valid_segment(&name),
                "invalid action name in {}: {name:?}",
                self.name
            );
            anyhow::ensure!(
                !index.contains_key(&name),
                "duplicate action {}.{name}",
                self.name
            );

            let (handler, meta) = match spec {
                ActionSpec::Inline(handler) => (handler, ActionMeta::default()),
                ActionSpec::Full { handler, meta } => (handler, meta),
            };

            index.insert(name.clone(), actions.len());
            actions.push(Arc::new(ActionDescriptor {
                qualified_name: format!("{}.{name}", self.name),
                name,
                handler,
                permission: meta.permission.unwrap_or(self.options.default_permission),
                role: meta.role.or_else(|| self.options.default_role.clone()),
                publish: meta.publish,
                default_method: meta.default_method,
                need_model: meta.need_model,
                resolver: meta.resolver,
            }));
        }

        Ok(ServiceDescriptor {
            namespace: self.namespace.unwrap_or_else(|| self.name.clone()),
            name: self.name,
            version: self.version,
            options: self.options,
            actions,
            index,
            codec: self.codec,
            store: OnceLock::new(),
        })
    }
}

fn valid_segment(name: &str) -> bool {
    !name.is_empty() && !name.contains(['.', '/'])
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;
    use crate::storage::MemoryStore;

    async fn noop(_ctx: Arc<InvocationContext>) -> Result<ActionOutput, InvocationError> {
        Ok(ActionOutput::Final(Value::Null))
    }

    #[test]
    fn inline_action_inherits_service_defaults() {
        let service = ServiceDescriptor::builder("docs")
            .options(ServiceOptions {
                default_permission: Permission::Authenticated,
                default_role: Some("editor".to_string()),
                ..ServiceOptions::default()
            })
            .action("list", ActionSpec::inline(noop))
            .build()
            .unwrap();

        let action = service.action("list").unwrap();
        assert_eq!(action.qualified_name, "docs.list");
        assert_eq!(action.permission, Permission::Authenticated);
        assert_eq!(action.role.as_deref(), Some("editor"));
        assert!(action.publish);
        assert!(!action.need_model);
    }

    #[test]
    fn full_action_overrides_defaults() {
        let service = ServiceDescriptor::builder("docs")
            .options(ServiceOptions {
                default_permission: Permission::Authenticated,
                ..ServiceOptions::default()
            })
            .action(
                "rename",
                ActionSpec::full(
                    noop,
                    ActionMeta::new()
                        .permission(Permission::Owner)
                        .default_method(HttpMethod::Put)
                        .need_model(),
                ),
            )
            .build()
            .unwrap();

        let action = service.action("rename").unwrap();
        assert_eq!(action.permission, Permission::Owner);
        assert_eq!(action.default_method, Some(HttpMethod::Put));
        assert!(action.need_model);
    }

    #[test]
    fn namespace_defaults_to_name() {
        let service = ServiceDescriptor::builder("docs").build().unwrap();
        assert_eq!(service.namespace(), "docs");
        assert_eq!(service.collection(), "docs");

        let service = ServiceDescriptor::builder("docs")
            .namespace("documents")
            .build()
            .unwrap();
        assert_eq!(service.namespace(), "documents");
    }

    #[test]
    fn actions_keep_declaration_order() {
        let service = ServiceDescriptor::builder("docs")
            .action("b", ActionSpec::inline(noop))
            .action("a", ActionSpec::inline(noop))
            .action("c", ActionSpec::inline(noop))
            .build()
            .unwrap();
        let names: Vec<&str> = service.actions().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
    }

    #[test]
    fn duplicate_or_dotted_names_are_rejected() {
        let dup = ServiceDescriptor::builder("docs")
            .action("get", ActionSpec::inline(noop))
            .action("get", ActionSpec::inline(noop))
            .build();
        assert!(dup.is_err());

        let dotted = ServiceDescriptor::builder("docs")
            .action("a.b", ActionSpec::inline(noop))
            .build();
        assert!(dotted.is_err());

        assert!(ServiceDescriptor::builder("").build().is_err());
    }

    #[test]
    fn id_param_name_follows_hashed_identity() {
        let plain = ServiceOptions::default();
        assert_eq!(plain.id_param_name(), "id");

        let hashed = ServiceOptions {
            hashed_identity: true,
            ..ServiceOptions::default()
        };
        assert_eq!(hashed.id_param_name(), "code");

        let explicit = ServiceOptions {
            id_param_name: Some("slug".to_string()),
            ..ServiceOptions::default()
        };
        assert_eq!(explicit.id_param_name(), "slug");
    }

    #[test]
    fn store_binds_once() {
        let service = ServiceDescriptor::builder("docs").build().unwrap();
        assert!(service.store().is_none());
        assert!(service.bind_store(Arc::new(MemoryStore::new())));
        assert!(!service.bind_store(Arc::new(MemoryStore::new())));
        assert!(service.store().is_some());
    }

    #[test]
    fn permission_parses_from_text() {
        assert_eq!("owner".parse::<Permission>().unwrap(), Permission::Owner);
        assert!("root".parse::<Permission>().is_err());
    }
}
