//! Cross-service population: replaces foreign-identifier fields with the
//! entities they reference.
//!
//! For every schema field the engine collects the referenced identifiers
//! across all input entities and issues one sub-invocation of the target
//! action. Sub-invocations for distinct fields run concurrently and are
//! joined before returning. Population is best-effort, not atomic: when one
//! sub-invocation fails the whole step fails and no partial result is
//! returned.

use std::collections::HashSet;
use std::sync::Arc;

use actionhub_core::{entity_id, identifier_of, Caller, Entity, InvocationError, Params, PopulationSchema};
use futures_util::future::try_join_all;
use serde_json::{Map, Value};
use tracing::debug;

use super::operation::SubInvoker;

/// One planned sub-invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopulationCall {
    pub field: String,
    pub action: String,
    pub ids: Vec<String>,
}

/// Inlines referenced entities through sub-invocations.
pub struct PopulationEngine {
    invoker: Arc<dyn SubInvoker>,
}

impl PopulationEngine {
    pub fn new(invoker: Arc<dyn SubInvoker>) -> Self {
        Self { invoker }
    }

    /// Populates an entity or a sequence of entities.
    ///
    /// Values that are neither an object nor an array of objects are
    /// returned unchanged, as is everything when the schema is empty.
    ///
    /// # Errors
    ///
    /// Returns `DownstreamFailure` if any sub-invocation fails.
    pub async fn populate(
        &self,
        value: Value,
        schema: &PopulationSchema,
        caller: &Caller,
    ) -> Result<Value, InvocationError> {
        if schema.is_empty() {
            return Ok(value);
        }
        match value {
            Value::Object(entity) => {
                let mut populated = self.populate_entities(vec![entity], schema, caller).await?;
                Ok(populated.pop().map_or(Value::Null, Value::Object))
            }
            Value::Array(items) if items.iter().all(Value::is_object) => {
                let entities = items
                    .into_iter()
                    .filter_map(|item| match item {
                        Value::Object(entity) => Some(entity),
                        _ => None,
                    })
                    .collect();
                let populated = self.populate_entities(entities, schema, caller).await?;
                Ok(Value::Array(populated.into_iter().map(Value::Object).collect()))
            }
            other => Ok(other),
        }
    }

    /// Populates a batch of entities in place and returns them.
    ///
    /// # Errors
    ///
    /// Returns `DownstreamFailure` if any sub-invocation fails.
    pub async fn populate_entities(
        &self,
        mut entities: Vec<Entity>,
        schema: &PopulationSchema,
        caller: &Caller,
    ) -> Result<Vec<Entity>, InvocationError> {
        let calls = Self::plan(&entities, schema);
        if calls.is_empty() {
            return Ok(entities);
        }

        let pending = calls.iter().map(|call| self.fetch(call, caller));
        let fetched = try_join_all(pending).await?;

        for (call, found) in calls.iter().zip(&fetched) {
            for entity in &mut entities {
                replace_field(entity, &call.field, found);
            }
        }
        Ok(entities)
    }

    /// Plans one call per schema field that references at least one
    /// identifier. Identifiers are deduplicated in first-seen order.
    #[must_use]
    pub fn plan(entities: &[Entity], schema: &PopulationSchema) -> Vec<PopulationCall> {
        schema
            .iter()
            .filter_map(|(field, action)| {
                let ids = referenced_ids(entities, field);
                (!ids.is_empty()).then(|| PopulationCall {
                    field: field.to_string(),
                    action: action.to_string(),
                    ids,
                })
            })
            .collect()
    }

    async fn fetch(
        &self,
        call: &PopulationCall,
        caller: &Caller,
    ) -> Result<Map<String, Value>, InvocationError> {
        let mut params = Params::new();
        params.insert("id".to_string(), Value::from(call.ids.clone()));
        params.insert("resultAsObject".to_string(), Value::Bool(true));
        params.insert("propFilter".to_string(), Value::Bool(true));

        debug!(field = %call.field, action = %call.action, ids = call.ids.len(), "population call");

        let result = self
            .invoker
            .invoke_internal(&call.action, params, caller)
            .await
            .map_err(|err| InvocationError::downstream(&call.action, err))?;
        Ok(keyed(result))
    }
}

/// Identifiers referenced by `field` across all entities.
fn referenced_ids(entities: &[Entity], field: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut ids = Vec::new();
    let mut push = |value: &Value| {
        if let Some(id) = identifier_of(value) {
            if seen.insert(id.clone()) {
                ids.push(id);
            }
        }
    };
    for entity in entities {
        match entity.get(field) {
            Some(Value::Array(items)) => items.iter().for_each(&mut push),
            Some(value) => push(value),
            None => {}
        }
    }
    ids
}

/// Normalizes a sub-invocation result into an id-keyed mapping. Callees are
/// asked for object-keyed output, but a plain sequence is accepted too.
fn keyed(result: Value) -> Map<String, Value> {
    match result {
        Value::Object(map) => map,
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(entity) => entity_id(&entity).map(|id| (id, Value::Object(entity))),
                _ => None,
            })
            .collect(),
        _ => Map::new(),
    }
}

/// Tolerant join: sequence fields keep only matched references, scalar
/// fields are replaced or removed.
fn replace_field(entity: &mut Entity, field: &str, found: &Map<String, Value>) {
    let replacement = match entity.get(field) {
        None | Some(Value::Null) => return,
        Some(Value::Array(items)) => {
            let matched: Vec<Value> = items
                .iter()
                .filter_map(|item| identifier_of(item).and_then(|id| found.get(&id).cloned()))
                .collect();
            if matched.len() < items.len() {
                debug!(field, dropped = items.len() - matched.len(), "unmatched references dropped");
            }
            Some(Value::Array(matched))
        }
        Some(scalar) => identifier_of(scalar).and_then(|id| found.get(&id).cloned()),
    };

    match replacement {
        Some(value) => {
            entity.insert(field.to_string(), value);
        }
        None => {
            debug!(field, "unmatched reference removed");
            entity.remove(field);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
