use crate::metrics::RunningGuard;
use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::OwnedSemaphorePermit;
use tokio::time::timeout;
use tracing::{Instrument, Span, debug, warn};

/// Failures raised while the inference collaborator processes a request.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("{0}")]
    Implementation(Cow<'static, str>),

    #[error("Inference did not complete within {} seconds", .0.as_secs_f64())]
    Timeout(Duration),

    #[error("Inference task aborted: {0}")]
    Aborted(String),

    #[error("I/O error during inference: {0}")]
    Io(#[from] std::io::Error),
}

impl HandlerError {
    #[inline]
    pub fn implementation<S: Into<Cow<'static, str>>>(message: S) -> Self {
        Self::Implementation(message.into())
    }
}

/// The inference engine sitting behind the endpoint.
///
/// Implementations receive fully validated requests and either return the produced artifact or
/// fail. They are shared across concurrent requests, hence the `Send + Sync` requirement.
pub trait Handler: Send + Sync + 'static {
    type Request: Send + 'static;
    type Response: Send + 'static;

    fn on_request(
        &self,
        request: Self::Request,
    ) -> impl Future<Output = Result<Self::Response, HandlerError>> + Send;
}

/// Run `request` through `handler` on its own task, bounded by `limit`.
///
/// The permit and the running guard are moved into the task so the concurrency slot and the
/// in-flight counters follow the inference itself, even when the caller stops waiting.
/// Panics are reported as `Aborted`.
pub(crate) async fn execute<H: Handler>(
    handler: Arc<H>,
    request: H::Request,
    limit: Duration,
    permit: OwnedSemaphorePermit,
    running: RunningGuard,
) -> Result<H::Response, HandlerError> {
    let task = tokio::spawn(
        async move {
            let _permit = permit;
            let outcome = match timeout(limit, handler.on_request(request)).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!("Inference exceeded its {:.2?} budget", limit);
                    Err(HandlerError::Timeout(limit))
                }
            };
            running.finish(outcome.is_ok());
            outcome
        }
        .instrument(Span::current()),
    );

    match task.await {
        Ok(outcome) => {
            debug!("Inference task finished (success={})", outcome.is_ok());
            outcome
        }
        Err(err) if err.is_panic() => Err(HandlerError::Aborted(String::from(
            "inference task panicked",
        ))),
        Err(err) => Err(HandlerError::Aborted(err.to_string())),
    }
}
