use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use base64::DecodeError;
use serde::Serialize;
use splatgate_core::{Error as EndpointError, HandlerError};
use splatgate_tasks::image_to_3d::TaskError;
use std::time::Duration;
use thiserror::Error;
use tokio::io::Error as TokioIoError;
use tower::BoxError;
use tower::timeout::error::Elapsed;
use utoipa::ToSchema;

/// Define all the possible errors returned by the HTTP surface
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("{0}")]
    Endpoint(#[from] EndpointError),

    #[error("I/O Error occurred: {0}")]
    Io(#[from] TokioIoError),

    #[error("{0}")]
    Validation(String),

    #[error("No image provided")]
    MissingImage,

    #[error("call_id query parameter required")]
    MissingCallId,

    #[error("Request did not complete within {} seconds", .0.as_secs_f64())]
    RequestTimeout(Duration),

    #[error("Request failed: {0}")]
    Middleware(String),
}

impl HttpError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Endpoint(EndpointError::UnknownJob(_)) => StatusCode::NOT_FOUND,
            Self::Endpoint(EndpointError::Handler(HandlerError::Timeout(_))) => {
                StatusCode::GATEWAY_TIMEOUT
            }
            Self::RequestTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Endpoint(_) | Self::Io(_) | Self::Middleware(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Validation(_) | Self::MissingImage | Self::MissingCallId => {
                StatusCode::BAD_REQUEST
            }
        }
    }

    /// Map a failure raised by the tower middleware stack, `limit` being the request timeout
    pub fn from_middleware(err: BoxError, limit: Duration) -> Self {
        if err.is::<Elapsed>() {
            Self::RequestTimeout(limit)
        } else {
            Self::Middleware(err.to_string())
        }
    }
}

impl From<JsonRejection> for HttpError {
    #[inline]
    fn from(value: JsonRejection) -> Self {
        Self::Validation(format!("Invalid JSON payload: {}", value.body_text()))
    }
}

impl From<QueryRejection> for HttpError {
    #[inline]
    fn from(value: QueryRejection) -> Self {
        Self::Validation(format!("Invalid query string: {}", value.body_text()))
    }
}

impl From<DecodeError> for HttpError {
    #[inline]
    fn from(value: DecodeError) -> Self {
        Self::Validation(format!("Invalid base64 image payload: {value}"))
    }
}

impl From<TaskError> for HttpError {
    #[inline]
    fn from(value: TaskError) -> Self {
        match value {
            TaskError::EmptyImage => Self::MissingImage,
        }
    }
}

/// Body of every non-2xx response
#[cfg_attr(debug_assertions, derive(Debug))]
#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Human readable description of what went wrong
    pub error: String,
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.to_string(),
        };

        (status, Json(body)).into_response()
    }
}
