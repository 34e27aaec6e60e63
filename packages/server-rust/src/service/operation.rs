//! Per-call types carried through the invocation pipeline.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use actionhub_core::{Caller, Entity, InvocationError, Params, PopulationSchema, Transport};
use serde_json::Value;

use super::descriptor::{ActionDescriptor, ServiceDescriptor};
use super::population::PopulationEngine;

// ---------------------------------------------------------------------------
// Invocation
// ---------------------------------------------------------------------------

/// A transport-agnostic inbound call, as built by a transport adapter.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Qualified action name, `{service}.{action}`.
    pub action: String,
    pub params: Params,
    pub caller: Caller,
    pub transport: Transport,
}

impl Invocation {
    pub fn new(action: impl Into<String>, params: Params, caller: Caller, transport: Transport) -> Self {
        Self {
            action: action.into(),
            params,
            caller,
            transport,
        }
    }
}

// ---------------------------------------------------------------------------
// Sub-invocation seam
// ---------------------------------------------------------------------------

/// Issues calls from inside a running call (population, handler fan-out).
///
/// Implemented by the pipeline; stubbed in tests.
#[async_trait]
pub trait SubInvoker: Send + Sync {
    async fn invoke_internal(
        &self,
        action: &str,
        params: Params,
        caller: &Caller,
    ) -> Result<Value, InvocationError>;
}

// ---------------------------------------------------------------------------
// Resolved model
// ---------------------------------------------------------------------------

/// Entity (or entities) a call was resolved against.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedModel {
    One(Entity),
    Many(Vec<Entity>),
}

impl ResolvedModel {
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        match self {
            Self::One(entity) => std::slice::from_ref(entity).iter(),
            Self::Many(entities) => entities.iter(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Many(entities) if entities.is_empty())
    }

    #[must_use]
    pub fn into_value(self) -> Value {
        match self {
            Self::One(entity) => Value::Object(entity),
            Self::Many(entities) => Value::Array(entities.into_iter().map(Value::Object).collect()),
        }
    }
}

// ---------------------------------------------------------------------------
// Handler output
// ---------------------------------------------------------------------------

/// What a handler hands back to the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutput {
    /// An entity or collection; field filtering and object keying apply.
    Raw(Value),
    /// Already-shaped data, returned to the caller as is.
    Final(Value),
}

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

/// Pipeline state of a single call.
///
/// `Created -> ModelResolved -> PermissionChecked -> Executed -> Shaped ->
/// Completed`, with `Failed` reachable from any stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Created,
    ModelResolved,
    PermissionChecked,
    Executed,
    Shaped,
    Completed,
    Failed,
}

impl Stage {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::ModelResolved => "model_resolved",
            Self::PermissionChecked => "permission_checked",
            Self::Executed => "executed",
            Self::Shaped => "shaped",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

// ---------------------------------------------------------------------------
// InvocationContext
// ---------------------------------------------------------------------------

/// Per-call record handed to the action handler.
///
/// Created fresh for every call and dropped once the response is emitted.
pub struct InvocationContext {
    pub call_id: u64,
    pub params: Params,
    pub caller: Caller,
    pub transport: Transport,
    pub service: Arc<ServiceDescriptor>,
    pub action: Arc<ActionDescriptor>,
    /// Filled by the model-resolution stage for actions that need a model.
    pub model: Option<ResolvedModel>,
    invoker: Arc<dyn SubInvoker>,
}

impl fmt::Debug for InvocationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvocationContext")
            .field("call_id", &self.call_id)
            .field("action", &self.action.qualified_name)
            .field("transport", &self.transport)
            .field("caller", &self.caller)
            .field("params", &self.params)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl InvocationContext {
    pub fn new(
        call_id: u64,
        invocation: Invocation,
        service: Arc<ServiceDescriptor>,
        action: Arc<ActionDescriptor>,
        invoker: Arc<dyn SubInvoker>,
    ) -> Self {
        Self {
            call_id,
            params: invocation.params,
            caller: invocation.caller,
            transport: invocation.transport,
            service,
            action,
            model: None,
            invoker,
        }
    }

    #[must_use]
    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params.get(name)
    }

    /// The single resolved entity, if the call resolved exactly one.
    #[must_use]
    pub fn entity(&self) -> Option<&Entity> {
        match &self.model {
            Some(ResolvedModel::One(entity)) => Some(entity),
            _ => None,
        }
    }

    /// Calls another action as the same caller.
    ///
    /// # Errors
    ///
    /// Returns `DownstreamFailure` wrapping the callee's error.
    pub async fn call(&self, action: &str, params: Params) -> Result<Value, InvocationError> {
        self.invoker
            .invoke_internal(action, params, &self.caller)
            .await
            .map_err(|err| InvocationError::downstream(action, err))
    }

    /// Population schema selected by the call's `populate` parameter.
    #[must_use]
    pub fn population_schema(&self) -> Option<PopulationSchema> {
        PopulationSchema::from_request(self.param("populate"), &self.service.options().populate)
    }

    /// Inlines referenced entities into `value` according to the call's
    /// population schema. A no-op when no schema applies.
    ///
    /// # Errors
    ///
    /// Returns `DownstreamFailure` if any population sub-invocation fails.
    pub async fn populate(&self, value: Value) -> Result<Value, InvocationError> {
        let Some(schema) = self.population_schema() else {
            return Ok(value);
        };
        PopulationEngine::new(Arc::clone(&self.invoker))
            .populate(value, &schema, &self.caller)
            .await
    }
}
