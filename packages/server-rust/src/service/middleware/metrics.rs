//! Metrics middleware for inbound invocations.
//!
//! Records duration and outcome on a `tracing` span and through the
//! `metrics` facade (`actionhub_invocations_total`,
//! `actionhub_invocation_duration_seconds`). Without an installed recorder
//! the facade calls are no-ops.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use actionhub_core::InvocationError;
use serde_json::Value;
use tower::{Layer, Service};
use tracing::{info_span, Instrument};

use crate::service::operation::Invocation;

pub const INVOCATIONS_TOTAL: &str = "actionhub_invocations_total";
pub const INVOCATION_DURATION_SECONDS: &str = "actionhub_invocation_duration_seconds";

// ---------------------------------------------------------------------------
// MetricsLayer
// ---------------------------------------------------------------------------

/// Tower layer that instruments invocations with timing and counting.
#[derive(Debug, Clone)]
pub struct MetricsLayer;

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService { inner }
    }
}

// ---------------------------------------------------------------------------
// MetricsService
// ---------------------------------------------------------------------------

/// Service wrapper that records invocation duration and outcome.
#[derive(Debug, Clone)]
pub struct MetricsService<S> {
    inner: S,
}

impl<S> Service<Invocation> for MetricsService<S>
where
    S: Service<Invocation, Response = Value, Error = InvocationError> + Send,
    S::Future: Send + 'static,
{
    type Response = Value;
    type Error = InvocationError;
    type Future = Pin<Box<dyn Future<Output = Result<Value, InvocationError>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, invocation: Invocation) -> Self::Future {
        let action = invocation.action.clone();
        let transport = invocation.transport.as_str();

        let span = info_span!(
            "invocation",
            action = %action,
            transport = transport,
            duration_ms = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );

        let fut = self.inner.call(invocation);

        Box::pin(
            async move {
                let start = Instant::now();
                let result = fut.await;
                let elapsed = start.elapsed();

                let outcome = match &result {
                    Ok(_) => "ok",
                    Err(err) => err.kind(),
                };

                #[allow(clippy::cast_possible_truncation)]
                let duration_ms = elapsed.as_millis() as u64;
                tracing::Span::current().record("duration_ms", duration_ms);
                tracing::Span::current().record("outcome", outcome);

                metrics::counter!(
                    INVOCATIONS_TOTAL,
                    "action" => action.clone(),
                    "outcome" => outcome
                )
                .increment(1);
                metrics::histogram!(INVOCATION_DURATION_SECONDS, "action" => action.clone())
                    .record(elapsed.as_secs_f64());

                tracing::info!(
                    action = %action,
                    duration_ms = duration_ms,
                    outcome = outcome,
                    "invocation complete"
                );

                result
            }
            .instrument(span),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
