use async_trait::async_trait;
use actionhub_core::StorageValue;

/// Key-addressable document store backing the services.
///
/// Implementations: in-memory (`MemoryStore`); external engines plug in
/// behind the same trait.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Point lookup of one document by identifier.
    async fn load(&self, collection: &str, key: &str) -> anyhow::Result<Option<StorageValue>>;

    /// Set lookup (`identifier ∈ keys`). Missing keys are skipped; the order
    /// of the returned pairs is store-defined.
    async fn load_all(
        &self,
        collection: &str,
        keys: &[String],
    ) -> anyhow::Result<Vec<(String, StorageValue)>>;

    /// Store a single document.
    async fn store(&self, collection: &str, key: &str, value: &StorageValue) -> anyhow::Result<()>;

    /// Delete a single document.
    async fn delete(&self, collection: &str, key: &str) -> anyhow::Result<()>;
}

/// Translates between raw store identifiers and the opaque codes handed to
/// clients of services configured with hashed identity.
pub trait IdentifierCodec: Send + Sync {
    /// Decodes a client-facing code. `None` if the code is not valid.
    fn decode(&self, code: &str) -> Option<String>;

    /// Encodes a raw identifier into its client-facing code.
    fn encode(&self, id: &str) -> String;
}
