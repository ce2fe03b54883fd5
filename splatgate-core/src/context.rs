use crate::handler::{Handler, HandlerError, execute};
use crate::jobs::{JobBackend, JobHandle, JobStatus};
use crate::metrics::{InFlightSnapshot, InFlightStats};
use crate::EndpointResult;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, instrument};

/// Outcome of [`EndpointContext::submit`]
#[cfg_attr(debug_assertions, derive(Debug))]
#[derive(Clone, PartialEq, Eq)]
pub enum Submission<T> {
    /// The request ran synchronously and produced this output
    Completed(T),

    /// The request was handed to the job backend and runs in the background
    Spawned(JobHandle),
}

/// Execution limits applied to every unit of work going through an [`EndpointContext`]
#[cfg_attr(debug_assertions, derive(Debug))]
#[derive(Copy, Clone)]
pub struct ExecutionLimits {
    /// Maximum wall-clock duration of a single inference, queueing excluded
    pub timeout: Duration,

    /// Maximum number of inferences running at the same time
    pub max_concurrency: usize,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(900),
            max_concurrency: 1,
        }
    }
}

/// Store everything required to serve requests: the inference handler, the job backend running
/// asynchronous requests and the limits shared by both execution paths.
pub struct EndpointContext<H, B> {
    handler: Arc<H>,
    backend: Arc<B>,
    permits: Arc<Semaphore>,
    timeout: Duration,
    stats: Arc<InFlightStats>,
}

impl<H, B> Clone for EndpointContext<H, B> {
    fn clone(&self) -> Self {
        Self {
            handler: Arc::clone(&self.handler),
            backend: Arc::clone(&self.backend),
            permits: Arc::clone(&self.permits),
            timeout: self.timeout,
            stats: Arc::clone(&self.stats),
        }
    }
}

impl<H, B> EndpointContext<H, B>
where
    H: Handler,
    B: JobBackend<Output = H::Response>,
{
    pub fn new(handler: H, backend: B, limits: ExecutionLimits) -> Self {
        Self {
            handler: Arc::new(handler),
            backend: Arc::new(backend),
            permits: Arc::new(Semaphore::new(limits.max_concurrency.max(1))),
            timeout: limits.timeout,
            stats: Arc::new(InFlightStats::default()),
        }
    }

    #[inline]
    pub fn handler(&self) -> &H {
        &self.handler
    }

    #[inline]
    pub fn stats(&self) -> InFlightSnapshot {
        self.stats.snapshot()
    }

    /// Run `request` inline when `synchronous`, otherwise hand it over to the job backend and
    /// return its handle without waiting.
    #[instrument(skip_all, fields(synchronous = synchronous))]
    pub async fn submit(
        &self,
        request: H::Request,
        synchronous: bool,
    ) -> EndpointResult<Submission<H::Response>> {
        let work = self.work(request);
        if synchronous {
            Ok(Submission::Completed(work.await?))
        } else {
            Ok(Submission::Spawned(self.backend.spawn(work)))
        }
    }

    /// Non-blocking status check of a previously spawned request.
    #[instrument(skip(self))]
    pub fn poll(&self, handle: &JobHandle) -> EndpointResult<JobStatus<H::Response>> {
        self.backend.poll(handle)
    }

    /// Package `request` as a self-contained unit of work. Nothing runs before the returned
    /// future is first polled, so the timeout only covers the inference itself.
    fn work(
        &self,
        request: H::Request,
    ) -> impl Future<Output = Result<H::Response, HandlerError>> + Send + use<H, B> {
        let handler = Arc::clone(&self.handler);
        let permits = Arc::clone(&self.permits);
        let timeout = self.timeout;
        let queued = self.stats.enqueue();

        async move {
            let permit = permits
                .acquire_owned()
                .await
                .map_err(|_| HandlerError::Aborted(String::from("execution pool is closed")))?;

            debug!("Acquired execution slot");
            execute(handler, request, timeout, permit, queued.start()).await
        }
    }
}

/// Boxed future returned by [`JobFacade::submit`]
pub type SubmitFuture<'a, O> =
    Pin<Box<dyn Future<Output = EndpointResult<Submission<O>>> + Send + 'a>>;

/// Object-safe view over an [`EndpointContext`], letting transports hold the facade without
/// knowing the concrete handler and backend types.
pub trait JobFacade<I, O>: Send + Sync {
    fn submit(&self, request: I, synchronous: bool) -> SubmitFuture<'_, O>;

    fn poll(&self, handle: &JobHandle) -> EndpointResult<JobStatus<O>>;

    fn stats(&self) -> InFlightSnapshot;
}

impl<H, B> JobFacade<H::Request, H::Response> for EndpointContext<H, B>
where
    H: Handler,
    B: JobBackend<Output = H::Response>,
{
    fn submit(&self, request: H::Request, synchronous: bool) -> SubmitFuture<'_, H::Response> {
        Box::pin(EndpointContext::submit(self, request, synchronous))
    }

    fn poll(&self, handle: &JobHandle) -> EndpointResult<JobStatus<H::Response>> {
        EndpointContext::poll(self, handle)
    }

    fn stats(&self) -> InFlightSnapshot {
        EndpointContext::stats(self)
    }
}
