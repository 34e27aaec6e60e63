//! In-memory [`DocumentStore`] implementation backed by [`DashMap`].
//!
//! Provides concurrent read/write access without external locking. Suitable
//! for development, tests, and any deployment whose data fits in memory.

use std::collections::HashSet;

use async_trait::async_trait;
use dashmap::DashMap;
use actionhub_core::{entity_id, Entity, StorageValue};

use crate::traits::DocumentStore;

/// Collections of `MsgPack`-encoded documents keyed by identifier.
///
/// Readers never block each other; writers contend only on the shard that
/// holds the key.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: DashMap<String, DashMap<String, StorageValue>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Encodes and stores an entity under its own `id` field.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity has no identifier or cannot be encoded.
    pub fn insert_entity(&self, collection: &str, entity: &Entity) -> anyhow::Result<()> {
        let key = entity_id(entity)
            .ok_or_else(|| anyhow::anyhow!("entity in {collection} has no identifier"))?;
        let value = StorageValue::from_entity(entity)?;
        self.collections
            .entry(collection.to_string())
            .or_default()
            .insert(key, value);
        Ok(())
    }

    /// Number of documents in a collection.
    #[must_use]
    pub fn len(&self, collection: &str) -> usize {
        self.collections.get(collection).map_or(0, |c| c.len())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn load(&self, collection: &str, key: &str) -> anyhow::Result<Option<StorageValue>> {
        Ok(self
            .collections
            .get(collection)
            .and_then(|c| c.get(key).map(|v| v.value().clone())))
    }

    async fn load_all(
        &self,
        collection: &str,
        keys: &[String],
    ) -> anyhow::Result<Vec<(String, StorageValue)>> {
        let Some(docs) = self.collections.get(collection) else {
            return Ok(Vec::new());
        };
        let wanted: HashSet<&str> = keys.iter().map(String::as_str).collect();
        // Membership scan: results come back in shard order, not request order.
        Ok(docs
            .iter()
            .filter(|entry| wanted.contains(entry.key().as_str()))
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect())
    }

    async fn store(&self, collection: &str, key: &str, value: &StorageValue) -> anyhow::Result<()> {
        self.collections
            .entry(collection.to_string())
            .or_default()
            .insert(key.to_string(), value.clone());
        Ok(())
    }

    async fn delete(&self, collection: &str, key: &str) -> anyhow::Result<()> {
        if let Some(docs) = self.collections.get(collection) {
            docs.remove(key);
        }
        Ok(())
    }
}
