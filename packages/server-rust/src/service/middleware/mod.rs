//! Tower middleware layers for inbound invocations.
//!
//! - [`metrics`]: Invocation timing and counting via `tracing` spans and the `metrics` facade
//! - [`load_shed`]: Semaphore-based concurrency limiting
//! - [`stack`]: Composes all layers around the pipeline

pub mod load_shed;
pub mod metrics;
pub mod stack;

pub use load_shed::LoadShedLayer;
pub use metrics::MetricsLayer;
pub use stack::build_dispatch_stack;
