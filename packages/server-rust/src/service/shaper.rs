//! Result shaping: per-entity field selection and object-keyed output.

use actionhub_core::{entity_id, param_flag, FieldFilter, Params};
use serde_json::{Map, Value};

/// Applies field filtering and keyed-mapping conversion to handler output.
pub struct ResultShaper;

impl ResultShaper {
    /// Shapes a raw result according to the call's `propFilter` and
    /// `resultAsObject` parameters.
    #[must_use]
    pub fn shape_for(value: Value, params: &Params, default_fields: Option<&[String]>) -> Value {
        let filter = FieldFilter::from_param(params.get("propFilter"));
        Self::shape(value, filter.as_ref(), default_fields, param_flag(params, "resultAsObject"))
    }

    /// Shapes an entity or a sequence of entities.
    ///
    /// `FieldFilter::ServiceDefault` resolves to `default_fields`; without
    /// them no filtering happens. With `as_object` a sequence becomes a
    /// mapping keyed by entity identifier where later duplicates overwrite
    /// earlier ones and entities without an identifier are dropped.
    #[must_use]
    pub fn shape(
        value: Value,
        filter: Option<&FieldFilter>,
        default_fields: Option<&[String]>,
        as_object: bool,
    ) -> Value {
        let fields = match filter {
            Some(FieldFilter::Fields(fields)) => Some(fields.as_slice()),
            Some(FieldFilter::ServiceDefault) => default_fields,
            None => None,
        };

        match value {
            Value::Array(items) if as_object => Value::Object(Self::keyed(items, fields)),
            other => match fields {
                Some(fields) => Self::filter(other, fields),
                None => other,
            },
        }
    }

    fn filter(value: Value, fields: &[String]) -> Value {
        match value {
            Value::Object(entity) => Value::Object(select_fields(entity, fields)),
            Value::Array(items) => Value::Array(
                items
                    .into_iter()
                    .map(|item| match item {
                        Value::Object(entity) => Value::Object(select_fields(entity, fields)),
                        other => other,
                    })
                    .collect(),
            ),
            other => other,
        }
    }

    /// Keys by the unfiltered identifier, then filters each value.
    fn keyed(items: Vec<Value>, fields: Option<&[String]>) -> Map<String, Value> {
        let mut out = Map::new();
        for item in items {
            let Value::Object(entity) = item else { continue };
            let Some(id) = entity_id(&entity) else { continue };
            let entity = match fields {
                Some(fields) => select_fields(entity, fields),
                None => entity,
            };
            out.insert(id, Value::Object(entity));
        }
        out
    }
}

fn select_fields(mut entity: Map<String, Value>, fields: &[String]) -> Map<String, Value> {
    fields
        .iter()
        .filter_map(|field| entity.remove(field).map(|value| (field.clone(), value)))
        .collect()
}
