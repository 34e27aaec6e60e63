//! Storage collaborators for the invocation pipeline.
//!
//! - [`MemoryStore`]: `DashMap`-backed [`DocumentStore`](crate::traits::DocumentStore)
//!   for development, tests, and the demo binary
//! - [`Base64IdCodec`]: URL-safe `base64` [`IdentifierCodec`](crate::traits::IdentifierCodec)
//!   for services configured with hashed identity

pub mod codec;
pub mod memory;

pub use codec::Base64IdCodec;
pub use memory::MemoryStore;
