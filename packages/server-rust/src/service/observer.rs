//! Pipeline observer trait and composite implementation.
//!
//! Observers are injected into the [`InvocationPipeline`](super::pipeline::InvocationPipeline)
//! at construction and notified of every call's lifecycle. They run inline
//! on the calling task and must not block.

use std::sync::Arc;
use std::time::Duration;

use actionhub_core::{InvocationError, Transport};

use super::operation::Stage;

/// Observer for call lifecycle events.
///
/// Every method has a no-op default so implementations override only what
/// they need. Used as `Arc<dyn PipelineObserver>`.
pub trait PipelineObserver: Send + Sync {
    /// Called once the action has been resolved and the call is accepted.
    fn on_start(&self, _call_id: u64, _action: &str, _transport: Transport) {}

    /// Called on each successful stage transition.
    fn on_stage(&self, _call_id: u64, _action: &str, _stage: Stage) {}

    /// Called after the call produced its response.
    fn on_complete(&self, _call_id: u64, _action: &str, _elapsed: Duration) {}

    /// Called when the call transitions to `Failed`.
    fn on_error(&self, _call_id: u64, _action: &str, _stage: Stage, _error: &InvocationError) {}
}

/// Fans out notifications to multiple observers in registration order.
#[derive(Default, Clone)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn PipelineObserver>>,
}

impl CompositeObserver {
    #[must_use]
    pub fn new(observers: Vec<Arc<dyn PipelineObserver>>) -> Self {
        Self { observers }
    }

    pub fn add(&mut self, observer: Arc<dyn PipelineObserver>) {
        self.observers.push(observer);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.observers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl PipelineObserver for CompositeObserver {
    fn on_start(&self, call_id: u64, action: &str, transport: Transport) {
        for observer in &self.observers {
            observer.on_start(call_id, action, transport);
        }
    }

    fn on_stage(&self, call_id: u64, action: &str, stage: Stage) {
        for observer in &self.observers {
            observer.on_stage(call_id, action, stage);
        }
    }

    fn on_complete(&self, call_id: u64, action: &str, elapsed: Duration) {
        for observer in &self.observers {
            observer.on_complete(call_id, action, elapsed);
        }
    }

    fn on_error(&self, call_id: u64, action: &str, stage: Stage, error: &InvocationError) {
        for observer in &self.observers {
            observer.on_error(call_id, action, stage, error);
        }
    }
}
