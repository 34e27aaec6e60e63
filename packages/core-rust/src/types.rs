use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Canonical, JSON-compatible representation of a stored entity.
///
/// Everything handed past the model resolver is a plain field mapping; no
/// store-specific handle escapes it.
pub type Entity = Map<String, Value>;

/// Transport-normalized call parameters.
pub type Params = Map<String, Value>;

/// Name of the identifier field on every entity.
pub const ID_FIELD: &str = "id";

/// Opaque serialized entity as held by a document store.
///
/// The bytes are `MsgPack` (via `rmp-serde`). Only the model resolver turns
/// them back into an [`Entity`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageValue {
    /// Raw `MsgPack` bytes of the entity body.
    pub data: Vec<u8>,
}

impl StorageValue {
    /// Encodes an entity into its stored form.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity cannot be serialized.
    pub fn from_entity(entity: &Entity) -> anyhow::Result<Self> {
        Ok(Self {
            data: rmp_serde::to_vec_named(entity)?,
        })
    }

    /// Decodes the stored bytes into an entity and stamps the identifier
    /// field with the key the value was stored under.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a `MsgPack` map.
    pub fn to_entity(&self, key: &str) -> anyhow::Result<Entity> {
        let mut entity: Entity = rmp_serde::from_slice(&self.data)?;
        entity.insert(ID_FIELD.to_string(), Value::String(key.to_string()));
        Ok(entity)
    }
}

/// Returns the identifier carried by a scalar value.
///
/// Strings are taken as-is, numbers are stringified, and objects yield their
/// own `id` field (an already-populated reference). Empty strings and every
/// other shape yield `None`.
#[must_use]
pub fn identifier_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(map) => map.get(ID_FIELD).and_then(identifier_of),
        _ => None,
    }
}

/// Returns the identifier of an entity, if it has a usable one.
#[must_use]
pub fn entity_id(entity: &Entity) -> Option<String> {
    entity.get(ID_FIELD).and_then(identifier_of)
}

/// Reads a boolean flag from normalized params.
///
/// Query strings deliver flags as text, so `"true"` and `"1"` count as set.
#[must_use]
pub fn param_flag(params: &Params, name: &str) -> bool {
    match params.get(name) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s == "true" || s == "1",
        Some(Value::Number(n)) => n.as_u64() == Some(1),
        _ => false,
    }
}
