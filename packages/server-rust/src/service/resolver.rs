//! Model resolution: turns the `id`/`code` parameters of a call into live
//! entities from the backing store.

use std::collections::HashSet;

use actionhub_core::{identifier_of, InvocationError, Params};
use serde_json::Value;
use tracing::debug;

use super::descriptor::ServiceDescriptor;
use super::operation::ResolvedModel;

/// Identifier(s) a call targets after decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdSelector {
    One(String),
    Many(Vec<String>),
}

/// Resolves direct or encoded identifiers to canonical entities.
///
/// A single identifier is a point lookup; a sequence is a set lookup whose
/// result order is whatever the store returns. Every entity leaves this
/// component as a plain field mapping.
pub struct ModelResolver;

impl ModelResolver {
    /// Looks up the entity or entities a call targets.
    ///
    /// Returns `Ok(None)` when a single identifier matches nothing; deciding
    /// whether that is fatal is the permission gate's job.
    ///
    /// # Errors
    ///
    /// - `InvalidIdentifier` if no usable identifier could be derived
    /// - `Internal` if the service has no bound store or the store fails
    pub async fn resolve(
        service: &ServiceDescriptor,
        params: &Params,
    ) -> Result<Option<ResolvedModel>, InvocationError> {
        let selector = Self::selector(service, params)?;
        let store = service.store().ok_or_else(|| {
            anyhow::anyhow!("service {} has no bound document store", service.name())
        })?;
        let collection = service.collection();

        match selector {
            IdSelector::One(id) => {
                let Some(stored) = store.load(collection, &id).await? else {
                    debug!(service = service.name(), id = %id, "no entity for identifier");
                    return Ok(None);
                };
                Ok(Some(ResolvedModel::One(stored.to_entity(&id)?)))
            }
            IdSelector::Many(ids) => {
                let found = store.load_all(collection, &ids).await?;
                let entities = found
                    .iter()
                    .map(|(key, stored)| stored.to_entity(key))
                    .collect::<anyhow::Result<Vec<_>>>()?;
                debug!(
                    service = service.name(),
                    requested = ids.len(),
                    found = entities.len(),
                    "set lookup"
                );
                Ok(Some(ResolvedModel::Many(entities)))
            }
        }
    }

    /// Derives the raw identifier selector from call params.
    ///
    /// The service's id parameter name is read first, then `code` or `id`.
    /// With hashed identity a present code wins over `id` and is decoded by
    /// the service codec. Inside a sequence, unusable identifiers are
    /// dropped; the call only fails when none remain.
    ///
    /// # Errors
    ///
    /// Returns `InvalidIdentifier` if the identifier is absent, empty, or
    /// cannot be decoded.
    pub fn selector(service: &ServiceDescriptor, params: &Params) -> Result<IdSelector, InvocationError> {
        let options = service.options();
        let name = options.id_param_name();

        if options.hashed_identity {
            if let Some(code) = id_param(params, name, "code") {
                let codec = service.codec().ok_or_else(|| {
                    InvocationError::invalid_identifier(format!(
                        "service {} cannot decode identifier codes",
                        service.name()
                    ))
                })?;
                return Self::collect(code, |raw| codec.decode(&raw));
            }
        }

        match id_param(params, name, "id") {
            Some(id) => Self::collect(id, Some),
            None => Err(InvocationError::invalid_identifier("missing identifier")),
        }
    }

    fn collect(
        value: &Value,
        decode: impl Fn(String) -> Option<String>,
    ) -> Result<IdSelector, InvocationError> {
        if let Value::Array(items) = value {
            let mut seen = HashSet::new();
            let ids: Vec<String> = items
                .iter()
                .filter_map(identifier_of)
                .filter_map(&decode)
                .filter(|id| !id.is_empty() && seen.insert(id.clone()))
                .collect();
            if ids.is_empty() {
                return Err(InvocationError::invalid_identifier(
                    "no usable identifier in sequence",
                ));
            }
            return Ok(IdSelector::Many(ids));
        }

        identifier_of(value)
            .and_then(decode)
            .filter(|id| !id.is_empty())
            .map(IdSelector::One)
            .ok_or_else(|| InvocationError::invalid_identifier("empty or undecodable identifier"))
    }
}

/// A custom placeholder name stands in for `code` or `id`.
fn id_param<'a>(params: &'a Params, name: &str, fallback: &str) -> Option<&'a Value> {
    [name, fallback]
        .into_iter()
        .find_map(|key| params.get(key).filter(|v| !v.is_null()))
}
