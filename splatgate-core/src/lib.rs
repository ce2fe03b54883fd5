mod context;
pub mod environ;
mod handler;
pub mod jobs;
mod metrics;
mod model;

pub use context::{EndpointContext, ExecutionLimits, JobFacade, SubmitFuture, Submission};
pub use handler::{Handler, HandlerError};
pub use jobs::{JobBackend, JobHandle, JobStatus, LocalJobBackend};
pub use metrics::{InFlightSnapshot, InFlightStats};
pub use model::ModelCell;
use std::borrow::Cow;

use crate::environ::EnvironmentError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Environment(#[from] EnvironmentError),

    #[error("{0}")]
    Handler(#[from] HandlerError),

    #[error("Unknown job: {0}")]
    UnknownJob(String),

    #[error("{0}")]
    Runtime(Cow<'static, str>),
}

/// Result with predefined splatgate-core::Error as the Error type
pub type EndpointResult<T> = Result<T, Error>;
