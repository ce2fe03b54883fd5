use splatgate_core::environ::EnvironmentError;
use splatgate_http::HttpError;
use splatgate_tasks::image_to_3d::TaskError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Environment(#[from] EnvironmentError),

    #[error("{0}")]
    Endpoint(#[from] splatgate_core::Error),

    #[error("{0}")]
    Http(#[from] HttpError),

    #[error("{0}")]
    Task(#[from] TaskError),

    #[error("Image not found: {}", .0.display())]
    ImageNotFound(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
