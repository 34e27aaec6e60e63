use std::sync::Arc;

use actionhub_core::InvocationError;
use serde_json::Value;
use tower::ServiceExt;

use super::config::ServerConfig;
use super::middleware::{build_dispatch_stack, LoadShedLayer};
use super::operation::Invocation;
use super::pipeline::InvocationPipeline;

/// Entry point for transport adapters.
///
/// Each call runs through a fresh dispatch stack; the load-shedding permits
/// are shared across clones, so the concurrency cap is server-wide.
#[derive(Clone)]
pub struct Dispatcher {
    pipeline: Arc<InvocationPipeline>,
    load_shed: LoadShedLayer,
}

impl Dispatcher {
    #[must_use]
    pub fn new(pipeline: Arc<InvocationPipeline>, config: &ServerConfig) -> Self {
        Self {
            pipeline,
            load_shed: LoadShedLayer::new(config.max_concurrent_invocations),
        }
    }

    #[must_use]
    pub fn pipeline(&self) -> &Arc<InvocationPipeline> {
        &self.pipeline
    }

    /// # Errors
    ///
    /// Returns `Overloaded` when the concurrency cap is reached, otherwise
    /// whatever the pipeline fails with.
    pub async fn dispatch(&self, invocation: Invocation) -> Result<Value, InvocationError> {
        build_dispatch_stack(Arc::clone(&self.pipeline), self.load_shed.clone())
            .oneshot(invocation)
            .await
    }
}
