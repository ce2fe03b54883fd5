use crate::handler::HandlerError;
use crate::{EndpointResult, Error};
use dashmap::DashMap;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{Instrument, Span, debug, info, warn};
use uuid::Uuid;

/// Prefix of the job identifiers minted by [`LocalJobBackend`], compatible with clients expecting
/// remote function-call identifiers.
pub const JOB_ID_PREFIX: &str = "fc-";

/// Opaque identifier referencing a unit of work submitted asynchronously.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct JobHandle(String);

impl JobHandle {
    /// Mint a new, random, handle
    pub fn generate() -> Self {
        Self(format!("{JOB_ID_PREFIX}{}", Uuid::new_v4().simple()))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for JobHandle {
    #[inline]
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for JobHandle {
    #[inline]
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl Display for JobHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Observable state of a job.
///
/// `Processing` is the only non-terminal state. Once a job reached `Completed` or `Failed`,
/// every later poll returns the same value.
#[cfg_attr(debug_assertions, derive(Debug))]
#[derive(Clone, PartialEq, Eq)]
pub enum JobStatus<T> {
    Processing,
    Completed(T),
    Failed(String),
}

impl<T> JobStatus<T> {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Processing)
    }
}

impl<T> From<Result<T, HandlerError>> for JobStatus<T> {
    fn from(value: Result<T, HandlerError>) -> Self {
        match value {
            Ok(output) => Self::Completed(output),
            Err(err) => Self::Failed(err.to_string()),
        }
    }
}

/// Anything able to run units of work in the background and report on them later.
///
/// The facade only relies on these two operations, so the in-process [`LocalJobBackend`] can be
/// replaced by an external task queue without touching the HTTP layer.
pub trait JobBackend: Send + Sync + 'static {
    type Output: Clone + Send + Sync + 'static;

    /// Start executing `work` and return immediately with a handle to it.
    fn spawn<F>(&self, work: F) -> JobHandle
    where
        F: Future<Output = Result<Self::Output, HandlerError>> + Send + 'static;

    /// Report the current state of `handle` without waiting on the work.
    fn poll(&self, handle: &JobHandle) -> EndpointResult<JobStatus<Self::Output>>;
}

struct JobRecord<T> {
    status: JobStatus<T>,
    finished_at: Option<Instant>,
}

/// In-process [`JobBackend`] running every unit of work on the tokio runtime.
///
/// Records are kept in memory and terminal ones are dropped once older than `retention`,
/// after which their handle is reported as unknown.
pub struct LocalJobBackend<T> {
    jobs: Arc<DashMap<JobHandle, JobRecord<T>>>,
    retention: Duration,
}

impl<T> LocalJobBackend<T> {
    pub fn new(retention: Duration) -> Self {
        Self {
            jobs: Arc::new(DashMap::new()),
            retention,
        }
    }

    /// Number of records currently tracked, terminal or not
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    fn evict_expired(&self) {
        let retention = self.retention;
        self.jobs.retain(|handle, record| match record.finished_at {
            Some(finished_at) if finished_at.elapsed() >= retention => {
                debug!("Evicting expired job {handle}");
                false
            }
            _ => true,
        });
    }
}

impl<T> JobBackend for LocalJobBackend<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Output = T;

    fn spawn<F>(&self, work: F) -> JobHandle
    where
        F: Future<Output = Result<T, HandlerError>> + Send + 'static,
    {
        self.evict_expired();

        let handle = JobHandle::generate();
        self.jobs.insert(
            handle.clone(),
            JobRecord {
                status: JobStatus::Processing,
                finished_at: None,
            },
        );

        let jobs = Arc::clone(&self.jobs);
        let key = handle.clone();
        tokio::spawn(
            async move {
                // Nested task so a panicking unit of work still settles its record
                let status = match tokio::spawn(work.in_current_span()).await {
                    Ok(outcome) => JobStatus::from(outcome),
                    Err(err) if err.is_panic() => {
                        JobStatus::Failed(String::from("Inference task aborted: task panicked"))
                    }
                    Err(err) => JobStatus::Failed(format!("Inference task aborted: {err}")),
                };

                match &status {
                    JobStatus::Failed(reason) => warn!("Job {key} failed: {reason}"),
                    _ => info!("Job {key} completed"),
                }

                jobs.insert(
                    key,
                    JobRecord {
                        status,
                        finished_at: Some(Instant::now()),
                    },
                );
            }
            .instrument(Span::current()),
        );

        info!("Spawned job {handle}");
        handle
    }

    fn poll(&self, handle: &JobHandle) -> EndpointResult<JobStatus<T>> {
        self.evict_expired();
        self.jobs
            .get(handle)
            .map(|record| record.status.clone())
            .ok_or_else(|| Error::UnknownJob(handle.to_string()))
    }
}
