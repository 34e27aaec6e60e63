//! Stack composition: wraps the pipeline with the middleware layers inbound
//! transport calls go through.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use actionhub_core::InvocationError;
use serde_json::Value;
use tower::ServiceBuilder;

use super::load_shed::LoadShedLayer;
use super::metrics::MetricsLayer;
use crate::service::operation::Invocation;
use crate::service::pipeline::{InvocationPipeline, PipelineService};

/// Build the dispatch stack around an `InvocationPipeline`.
///
/// Layer order (outermost to innermost):
/// 1. `LoadShedLayer` -- reject when overloaded (fail fast before doing any work)
/// 2. `MetricsLayer` -- record timing and outcome
///
/// Sub-invocations call the pipeline directly and never pass through here.
pub fn build_dispatch_stack(
    pipeline: Arc<InvocationPipeline>,
    load_shed: LoadShedLayer,
) -> impl tower::Service<
    Invocation,
    Response = Value,
    Error = InvocationError,
    Future = Pin<Box<dyn Future<Output = Result<Value, InvocationError>> + Send>>,
> + Send {
    ServiceBuilder::new()
        .layer(load_shed)
        .layer(MetricsLayer)
        .service(PipelineService::new(pipeline))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
