//! The invocation pipeline: resolve, authorize, execute and shape a single
//! call, independent of the transport it arrived on.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use std::time::Instant;

use actionhub_core::{Caller, InvocationError, Params, Transport};
use async_trait::async_trait;
use serde_json::Value;
use tower::Service;
use tracing::{debug, debug_span, warn, Instrument};

use super::config::ServerConfig;
use super::descriptor::{ActionDescriptor, Permission, ServiceDescriptor};
use super::observer::{CompositeObserver, PipelineObserver};
use super::operation::{ActionOutput, Invocation, InvocationContext, Stage, SubInvoker};
use super::permission::PermissionGate;
use super::registry::ServiceRegistry;
use super::resolver::ModelResolver;
use super::shaper::ResultShaper;

/// Drives each call through
/// `Created -> ModelResolved -> PermissionChecked -> Executed -> Shaped -> Completed`.
///
/// Any stage failure ends the call in `Failed` with the originating error;
/// nothing is retried. The pipeline also serves sub-invocations issued from
/// inside a running call, which skip transport-level concerns such as load
/// shedding and publication checks.
pub struct InvocationPipeline {
    registry: Arc<ServiceRegistry>,
    gate: PermissionGate,
    observers: CompositeObserver,
    call_ids: AtomicU64,
    this: Weak<InvocationPipeline>,
}

impl InvocationPipeline {
    #[must_use]
    pub fn new(
        registry: Arc<ServiceRegistry>,
        config: &ServerConfig,
        observers: CompositeObserver,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            registry,
            gate: PermissionGate::new(config.admin_role.clone()),
            observers,
            call_ids: AtomicU64::new(1),
            this: this.clone(),
        })
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    /// Runs one call to completion.
    ///
    /// # Errors
    ///
    /// Returns `UnknownAction` for names that are not registered (or not
    /// published, for external transports), otherwise the error of the
    /// first failing stage.
    pub async fn invoke(&self, invocation: Invocation) -> Result<Value, InvocationError> {
        let call_id = self.call_ids.fetch_add(1, Ordering::Relaxed);
        let action_name = invocation.action.clone();

        let (service, action) = match self.lookup(&invocation) {
            Ok(found) => found,
            Err(err) => {
                debug!(call_id, action = %action_name, "unknown action");
                self.observers.on_error(call_id, &action_name, Stage::Created, &err);
                return Err(err);
            }
        };

        self.observers.on_start(call_id, &action_name, invocation.transport);
        let span = debug_span!(
            "call",
            call_id,
            action = %action_name,
            transport = invocation.transport.as_str()
        );

        let started = Instant::now();
        match self.run(call_id, invocation, service, action).instrument(span).await {
            Ok(value) => {
                self.advance(call_id, &action_name, Stage::Completed);
                self.observers.on_complete(call_id, &action_name, started.elapsed());
                Ok(value)
            }
            Err((stage, err)) => {
                debug!(call_id, action = %action_name, from = stage.as_str(), error = %err, "call failed");
                self.observers.on_error(call_id, &action_name, stage, &err);
                Err(err)
            }
        }
    }

    fn lookup(
        &self,
        invocation: &Invocation,
    ) -> Result<(Arc<ServiceDescriptor>, Arc<ActionDescriptor>), InvocationError> {
        let unknown = || InvocationError::UnknownAction {
            name: invocation.action.clone(),
        };
        let (service, action) = self.registry.resolve_action(&invocation.action).ok_or_else(unknown)?;
        if !action.publish && invocation.transport != Transport::Internal {
            return Err(unknown());
        }
        Ok((service, action))
    }

    /// Stage sequence. Errors carry the last stage reached.
    async fn run(
        &self,
        call_id: u64,
        invocation: Invocation,
        service: Arc<ServiceDescriptor>,
        action: Arc<ActionDescriptor>,
    ) -> Result<Value, (Stage, InvocationError)> {
        let invoker = self.invoker().map_err(|err| (Stage::Created, err))?;
        let name = action.qualified_name.clone();
        let mut ctx = InvocationContext::new(call_id, invocation, service, action, invoker);

        // Created -> ModelResolved
        if ctx.action.need_model || ctx.action.permission == Permission::Owner {
            ctx.model = ModelResolver::resolve(&ctx.service, &ctx.params)
                .await
                .map_err(|err| (Stage::Created, err))?;
        }
        self.advance(call_id, &name, Stage::ModelResolved);

        // ModelResolved -> PermissionChecked
        self.gate
            .check_context(&ctx)
            .map_err(|err| (Stage::ModelResolved, err))?;
        self.advance(call_id, &name, Stage::PermissionChecked);

        // PermissionChecked -> Executed
        let ctx = Arc::new(ctx);
        let output = ctx
            .action
            .handler
            .handle(Arc::clone(&ctx))
            .await
            .map_err(|err| {
                warn!(call_id, action = %name, kind = err.kind(), error = %err, "action handler failed");
                (Stage::PermissionChecked, err)
            })?;
        self.advance(call_id, &name, Stage::Executed);

        // Executed -> Shaped
        match output {
            ActionOutput::Final(value) => Ok(value),
            ActionOutput::Raw(value) => {
                let default_fields = ctx.service.options().default_fields.as_deref();
                let shaped = ResultShaper::shape_for(value, &ctx.params, default_fields);
                self.advance(call_id, &name, Stage::Shaped);
                Ok(shaped)
            }
        }
    }

    fn advance(&self, call_id: u64, action: &str, stage: Stage) {
        debug!(call_id, action, stage = stage.as_str(), "stage reached");
        self.observers.on_stage(call_id, action, stage);
    }

    fn invoker(&self) -> Result<Arc<dyn SubInvoker>, InvocationError> {
        let this = self
            .this
            .upgrade()
            .ok_or_else(|| anyhow::anyhow!("invocation pipeline is shutting down"))?;
        Ok(this)
    }
}

#[async_trait]
impl SubInvoker for InvocationPipeline {
    async fn invoke_internal(
        &self,
        action: &str,
        params: Params,
        caller: &Caller,
    ) -> Result<Value, InvocationError> {
        self.invoke(Invocation::new(action, params, caller.clone(), Transport::Internal))
            .await
    }
}

// ---------------------------------------------------------------------------
// PipelineService
// ---------------------------------------------------------------------------

/// Adapts the pipeline to `tower::Service` so middleware can wrap it.
#[derive(Clone)]
pub struct PipelineService {
    pipeline: Arc<InvocationPipeline>,
}

impl PipelineService {
    #[must_use]
    pub fn new(pipeline: Arc<InvocationPipeline>) -> Self {
        Self { pipeline }
    }
}

impl Service<Invocation> for PipelineService {
    type Response = Value;
    type Error = InvocationError;
    type Future = Pin<Box<dyn Future<Output = Result<Value, InvocationError>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, invocation: Invocation) -> Self::Future {
        let pipeline = Arc::clone(&self.pipeline);
        Box::pin(async move { pipeline.invoke(invocation).await })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use actionhub_core::{Entity, HttpMethod, PopulationSchema, DEFAULT_ADMIN_ROLE};
    use parking_lot::Mutex;
    use serde_json::json;
    use tower::ServiceExt;

    use super::*;
    use crate::service::actions::fetch_model;
    use crate::service::descriptor::{ActionMeta, ActionSpec, ServiceOptions};
    use crate::service::registry::ServiceFactory;
    use crate::storage::MemoryStore;
    use crate::traits::DocumentStore;

    #[derive(Default)]
    struct Recorder {
        stages: Mutex<Vec<(u64, Stage)>>,
        failures: Mutex<Vec<(Stage, &'static str)>>,
    }

    impl PipelineObserver for Recorder {
        fn on_stage(&self, call_id: u64, _action: &str, stage: Stage) {
            self.stages.lock().push((call_id, stage));
        }

        fn on_error(&self, _call_id: u64, _action: &str, stage: Stage, error: &InvocationError) {
            self.failures.lock().push((stage, error.kind()));
        }
    }

    fn docs() -> ServiceDescriptor {
        ServiceDescriptor::builder("docs")
            .options(ServiceOptions {
                default_fields: Some(vec!["id".to_string(), "title".to_string()]),
                populate: PopulationSchema::new().with("tags", "tags.getByIds"),
                ..ServiceOptions::default()
            })
            .action(
                "get",
                ActionSpec::full(fetch_model(), ActionMeta::new().need_model()),
            )
            .action(
                "rename",
                ActionSpec::full(
                    |ctx: Arc<InvocationContext>| async move {
                        let mut entity = ctx.entity().cloned().unwrap_or_default();
                        if let Some(title) = ctx.param("title") {
                            entity.insert("title".to_string(), title.clone());
                        }
                        Ok::<_, InvocationError>(ActionOutput::Raw(Value::Object(entity)))
                    },
                    ActionMeta::new()
                        .permission(Permission::Owner)
                        .default_method(HttpMethod::Put)
                        .need_model(),
                ),
            )
            .action(
                "summary",
                ActionSpec::inline(|ctx: Arc<InvocationContext>| async move {
                    let tags = ctx.call("tags.count", Params::new()).await?;
                    Ok::<_, InvocationError>(ActionOutput::Final(json!({"tags": tags})))
                }),
            )
            .action(
                "explode",
                ActionSpec::inline(|_ctx: Arc<InvocationContext>| async move {
                    Err::<ActionOutput, _>(InvocationError::ActionFailed {
                        status: 422,
                        message: "cannot explode".to_string(),
                    })
                }),
            )
            .build()
            .unwrap()
    }

    fn tags() -> ServiceDescriptor {
        ServiceDescriptor::builder("tags")
            .options(ServiceOptions {
                default_fields: Some(vec!["id".to_string(), "label".to_string()]),
                ..ServiceOptions::default()
            })
            .action(
                "getByIds",
                ActionSpec::full(fetch_model(), ActionMeta::new().need_model().unpublished()),
            )
            .action(
                "count",
                ActionSpec::full(
                    |_ctx: Arc<InvocationContext>| async move {
                        Err::<ActionOutput, _>(InvocationError::forbidden("counting disabled"))
                    },
                    ActionMeta::new().unpublished(),
                ),
            )
            .build()
            .unwrap()
    }

    fn seeded_store() -> Arc<MemoryStore> {
        let store = MemoryStore::new();
        let rows = [
            ("docs", json!({"id": "a", "owner": "u1", "title": "A", "tags": ["t1", "t2"]})),
            ("docs", json!({"id": "d", "owner": "u2", "title": "D", "tags": ["gone"]})),
            ("tags", json!({"id": "t1", "label": "one", "internal": 1})),
            ("tags", json!({"id": "t2", "label": "two", "internal": 2})),
        ];
        for (collection, row) in rows {
            let entity: Entity = serde_json::from_value(row).unwrap();
            store.insert_entity(collection, &entity).unwrap();
        }
        Arc::new(store)
    }

    fn pipeline_with(observer: Arc<Recorder>) -> Arc<InvocationPipeline> {
        let factories: Vec<ServiceFactory> = vec![Box::new(|| Ok(docs())), Box::new(|| Ok(tags()))];
        pipeline_over(factories, observer)
    }

    fn pipeline_over(factories: Vec<ServiceFactory>, observer: Arc<Recorder>) -> Arc<InvocationPipeline> {
        let store: Arc<dyn DocumentStore> = seeded_store();
        let registry = ServiceRegistry::load(factories, store).unwrap();
        InvocationPipeline::new(
            Arc::new(registry),
            &ServerConfig::default(),
            CompositeObserver::new(vec![observer]),
        )
    }

    fn pipeline() -> Arc<InvocationPipeline> {
        pipeline_with(Arc::new(Recorder::default()))
    }

    fn call(action: &str, params: Value, caller: Caller) -> Invocation {
        Invocation::new(
            action,
            serde_json::from_value(params).unwrap(),
            caller,
            Transport::Http,
        )
    }

    #[tokio::test]
    async fn get_returns_resolved_model() {
        let out = pipeline()
            .invoke(call("docs.get", json!({"id": "a"}), Caller::anonymous()))
            .await
            .unwrap();
        assert_eq!(out["title"], "A");
        assert_eq!(out["tags"], json!(["t1", "t2"]));
    }

    #[tokio::test]
    async fn populate_inlines_tags_through_unpublished_action() {
        let out = pipeline()
            .invoke(call(
                "docs.get",
                json!({"id": "a", "populate": true}),
                Caller::anonymous(),
            ))
            .await
            .unwrap();
        assert_eq!(
            out["tags"],
            json!([{"id": "t1", "label": "one"}, {"id": "t2", "label": "two"}])
        );
    }

    #[tokio::test]
    async fn dangling_references_populate_to_nothing() {
        let out = pipeline()
            .invoke(call(
                "docs.get",
                json!({"id": "d", "populate": true}),
                Caller::anonymous(),
            ))
            .await
            .unwrap();
        assert_eq!(out["title"], "D");
        assert_eq!(out["tags"], json!([]));
    }

    #[tokio::test]
    async fn set_lookup_matching_nothing_is_empty_mapping() {
        let out = pipeline()
            .invoke_internal(
                "tags.getByIds",
                serde_json::from_value(json!({"id": ["gone"], "resultAsObject": true})).unwrap(),
                &Caller::anonymous(),
            )
            .await
            .unwrap();
        assert_eq!(out, json!({}));
    }

    #[tokio::test]
    async fn populated_targets_survive_default_fields_without_id() {
        let labels_only = || {
            ServiceDescriptor::builder("tags")
                .options(ServiceOptions {
                    default_fields: Some(vec!["label".to_string()]),
                    ..ServiceOptions::default()
                })
                .action(
                    "getByIds",
                    ActionSpec::full(fetch_model(), ActionMeta::new().need_model().unpublished()),
                )
                .build()
        };
        let factories: Vec<ServiceFactory> = vec![Box::new(|| Ok(docs())), Box::new(labels_only)];
        let out = pipeline_over(factories, Arc::new(Recorder::default()))
            .invoke(call(
                "docs.get",
                json!({"id": "a", "populate": true}),
                Caller::anonymous(),
            ))
            .await
            .unwrap();
        assert_eq!(out["tags"], json!([{"label": "one"}, {"label": "two"}]));
    }

    #[tokio::test]
    async fn explicit_populate_cannot_reach_other_unpublished_actions() {
        let out = pipeline()
            .invoke(call(
                "docs.get",
                json!({"id": "a", "populate": {"tags": "tags.count"}}),
                Caller::anonymous(),
            ))
            .await
            .unwrap();
        assert_eq!(out["tags"], json!(["t1", "t2"]));

        let out = pipeline()
            .invoke(call(
                "docs.get",
                json!({"id": "a", "populate": {"tags": "tags.getByIds"}}),
                Caller::anonymous(),
            ))
            .await
            .unwrap();
        assert_eq!(out["tags"][0]["label"], "one");
    }

    #[tokio::test]
    async fn prop_filter_and_result_as_object_shape_output() {
        let out = pipeline()
            .invoke(call(
                "docs.get",
                json!({"id": ["a"], "propFilter": "id title", "resultAsObject": true}),
                Caller::anonymous(),
            ))
            .await
            .unwrap();
        assert_eq!(out, json!({"a": {"id": "a", "title": "A"}}));
    }

    #[tokio::test]
    async fn owner_may_rename() {
        let out = pipeline()
            .invoke(call(
                "docs.rename",
                json!({"id": "a", "title": "B"}),
                Caller::new("u1", ["user"]),
            ))
            .await
            .unwrap();
        assert_eq!(out["title"], "B");
    }

    #[tokio::test]
    async fn non_owner_is_forbidden_and_handler_never_runs() {
        let recorder = Arc::new(Recorder::default());
        let err = pipeline_with(recorder.clone())
            .invoke(call(
                "docs.rename",
                json!({"id": "a", "title": "B"}),
                Caller::new("u2", ["user"]),
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, InvocationError::Forbidden { .. }));

        let stages: Vec<Stage> = recorder.stages.lock().iter().map(|(_, s)| *s).collect();
        assert_eq!(stages, vec![Stage::ModelResolved]);
        assert_eq!(
            *recorder.failures.lock(),
            vec![(Stage::ModelResolved, "Forbidden")]
        );
    }

    #[tokio::test]
    async fn admin_bypasses_ownership() {
        let out = pipeline()
            .invoke(call(
                "docs.rename",
                json!({"id": "a", "title": "C"}),
                Caller::new("root", [DEFAULT_ADMIN_ROLE]),
            ))
            .await
            .unwrap();
        assert_eq!(out["title"], "C");
    }

    #[tokio::test]
    async fn missing_model_is_not_found_with_id() {
        let err = pipeline()
            .invoke(call("docs.get", json!({"id": "zzz"}), Caller::anonymous()))
            .await
            .unwrap_err();
        match err {
            InvocationError::ModelNotFound { service, id } => {
                assert_eq!(service, "docs");
                assert_eq!(id.as_deref(), Some("zzz"));
            }
            other => panic!("expected not found, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_identifier_is_invalid() {
        let err = pipeline()
            .invoke(call("docs.get", json!({}), Caller::anonymous()))
            .await
            .unwrap_err();
        assert!(matches!(err, InvocationError::InvalidIdentifier { .. }));
    }

    #[tokio::test]
    async fn unpublished_action_is_unknown_externally() {
        let pipeline = pipeline();
        let err = pipeline
            .invoke(call("tags.getByIds", json!({"id": "t1"}), Caller::anonymous()))
            .await
            .unwrap_err();
        assert!(matches!(err, InvocationError::UnknownAction { .. }));

        let internal = pipeline
            .invoke_internal("tags.getByIds", serde_json::from_value(json!({"id": "t1"})).unwrap(), &Caller::anonymous())
            .await
            .unwrap();
        assert_eq!(internal["label"], "one");
    }

    #[tokio::test]
    async fn unknown_action_is_reported() {
        let err = pipeline()
            .invoke(call("docs.nope", json!({}), Caller::anonymous()))
            .await
            .unwrap_err();
        assert_eq!(err.status(), 404);
    }

    #[tokio::test]
    async fn downstream_failure_keeps_cause() {
        let err = pipeline()
            .invoke(call("docs.summary", json!({}), Caller::anonymous()))
            .await
            .unwrap_err();
        match &err {
            InvocationError::DownstreamFailure { action, source } => {
                assert_eq!(action, "tags.count");
                assert!(matches!(**source, InvocationError::Forbidden { .. }));
            }
            other => panic!("expected downstream failure, got {other:?}"),
        }
        assert_eq!(err.status(), 403);
    }

    #[tokio::test]
    async fn handler_failure_is_surfaced_verbatim() {
        let recorder = Arc::new(Recorder::default());
        let err = pipeline_with(recorder.clone())
            .invoke(call("docs.explode", json!({}), Caller::anonymous()))
            .await
            .unwrap_err();
        assert_eq!(err.status(), 422);
        assert_eq!(err.to_string(), "cannot explode");
        assert_eq!(
            *recorder.failures.lock(),
            vec![(Stage::PermissionChecked, "ActionFailed")]
        );
    }

    #[tokio::test]
    async fn stages_run_in_order_and_call_ids_are_distinct() {
        let recorder = Arc::new(Recorder::default());
        let pipeline = pipeline_with(recorder.clone());
        pipeline
            .invoke(call("docs.get", json!({"id": "a"}), Caller::anonymous()))
            .await
            .unwrap();
        pipeline
            .invoke(call("docs.get", json!({"id": "a"}), Caller::anonymous()))
            .await
            .unwrap();

        let stages = recorder.stages.lock().clone();
        let first: Vec<Stage> = stages.iter().filter(|(id, _)| *id == stages[0].0).map(|(_, s)| *s).collect();
        assert_eq!(
            first,
            vec![
                Stage::ModelResolved,
                Stage::PermissionChecked,
                Stage::Executed,
                Stage::Shaped,
                Stage::Completed
            ]
        );
        assert!(stages.iter().any(|(id, _)| *id != stages[0].0));
    }

    #[tokio::test]
    async fn pipeline_service_serves_invocations() {
        let svc = PipelineService::new(pipeline());
        let out = tokio::time::timeout(
            Duration::from_secs(5),
            svc.oneshot(call("docs.get", json!({"id": "a"}), Caller::anonymous())),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(out["id"], "a");
    }
}
