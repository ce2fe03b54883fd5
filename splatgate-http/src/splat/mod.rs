mod codec;

pub use codec::{decode_image, encode_ply};

use crate::context::Context;
use crate::headers::RequestId;
use crate::{HttpError, HttpResult, SPLAT_TAG, SplatFacade};
use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{DefaultBodyLimit, Query, State};
use axum::response::{IntoResponse, Response};
use axum_extra::TypedHeader;
use serde::{Deserialize, Serialize};
use splatgate_core::{JobHandle, JobStatus, Submission};
use splatgate_tasks::image_to_3d::{ImageInput, ImageTo3dParams, ImageTo3dRequest, PlyOutput};
use tracing::{info, instrument};
use utoipa::{IntoParams, ToSchema};
use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

/// Base64 encoded images are about 4/3 the size of the original file
pub const MAX_BODY_SIZE: usize = 64 * 1024 * 1024;

/// Turn a single image into a Gaussian splat.
#[cfg_attr(debug_assertions, derive(Debug))]
#[derive(Deserialize, ToSchema)]
pub struct ProcessRequest {
    /// Base64 encoded image, optionally as a `data:` URL
    image: Option<String>,

    /// Name of the uploaded file, only used for its extension
    #[schema(example = "image.jpg")]
    filename: Option<String>,

    /// Optional text conditioning, ignored by engines without text support
    prompt: Option<String>,

    /// Camera elevation in degrees
    #[schema(example = 20)]
    elevation: Option<i32>,

    /// Return a `call_id` right away instead of waiting for the point cloud
    #[serde(rename = "async")]
    asynchronous: Option<bool>,
}

impl ProcessRequest {
    /// Validate the payload, returning the inference request and whether to wait for it.
    fn into_request(self) -> HttpResult<(ImageTo3dRequest, bool)> {
        let encoded = self
            .image
            .filter(|image| !image.trim().is_empty())
            .ok_or(HttpError::MissingImage)?;

        let image = ImageInput::new(decode_image(&encoded)?, self.filename)?;
        let parameters = ImageTo3dParams::new(self.prompt, self.elevation);
        let synchronous = !self.asynchronous.unwrap_or(false);

        Ok((ImageTo3dRequest::new(image, parameters), synchronous))
    }
}

#[cfg_attr(debug_assertions, derive(Debug))]
#[derive(Serialize, ToSchema)]
#[serde(untagged)]
pub enum ProcessResponse {
    /// The inference ran to completion
    Completed {
        success: bool,

        /// Base64 encoded PLY file
        ply: String,
    },

    /// The inference was scheduled, poll `/status` with the `call_id`
    Spawned {
        success: bool,
        call_id: String,

        /// Always `processing`
        status: String,
    },
}

impl From<Submission<PlyOutput>> for ProcessResponse {
    fn from(value: Submission<PlyOutput>) -> Self {
        match value {
            Submission::Completed(output) => Self::Completed {
                success: true,
                ply: encode_ply(output.as_bytes()),
            },
            Submission::Spawned(handle) => Self::Spawned {
                success: true,
                call_id: handle.to_string(),
                status: String::from("processing"),
            },
        }
    }
}

impl IntoResponse for ProcessResponse {
    #[inline]
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

#[cfg_attr(debug_assertions, derive(Debug))]
#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StatusQuery {
    /// Identifier returned by an asynchronous `/process` call
    call_id: Option<String>,
}

#[cfg_attr(debug_assertions, derive(Debug))]
#[derive(Serialize, ToSchema)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum StatusResponse {
    Processing,
    Completed {
        /// Base64 encoded PLY file
        ply: String,
    },
    Failed {
        error: String,
    },
}

impl From<JobStatus<PlyOutput>> for StatusResponse {
    fn from(value: JobStatus<PlyOutput>) -> Self {
        match value {
            JobStatus::Processing => Self::Processing,
            JobStatus::Completed(output) => Self::Completed {
                ply: encode_ply(output.as_bytes()),
            },
            JobStatus::Failed(error) => Self::Failed { error },
        }
    }
}

impl IntoResponse for StatusResponse {
    #[inline]
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

#[utoipa::path(
    post,
    path = "/process",
    tag = SPLAT_TAG,
    request_body(content = ProcessRequest, content_type = "application/json"),
    responses(
        (status = OK, description = "Point cloud, or the call_id of the scheduled inference", body = ProcessResponse),
        (status = BAD_REQUEST, description = "Malformed request", body = crate::error::ErrorResponse),
        (status = INTERNAL_SERVER_ERROR, description = "The inference failed", body = crate::error::ErrorResponse),
        (status = GATEWAY_TIMEOUT, description = "The inference did not complete in time", body = crate::error::ErrorResponse),
    )
)]
#[instrument(skip(state, request_id, payload))]
pub async fn process(
    State(state): State<SplatFacade>,
    request_id: TypedHeader<RequestId>,
    payload: Result<Json<ProcessRequest>, JsonRejection>,
) -> HttpResult<ProcessResponse> {
    // Create request context
    let ctx = Context::new(request_id.0);

    // Decode request, nothing reaches the facade unless it is well-formed
    let Json(payload) = payload?;
    let (request, synchronous) = payload.into_request()?;
    info!(
        "[{}] Received {} ({} bytes), synchronous: {synchronous}",
        ctx.request_id(),
        request.inputs.filename(),
        request.inputs.len()
    );

    let submission = state.submit(request, synchronous).await?;
    info!("[{}] Served in {:.2?}", ctx.request_id(), ctx.elapsed());
    Ok(ProcessResponse::from(submission))
}

#[utoipa::path(
    get,
    path = "/status",
    tag = SPLAT_TAG,
    params(StatusQuery),
    responses(
        (status = OK, description = "Current state of the inference", body = StatusResponse),
        (status = BAD_REQUEST, description = "Missing call_id", body = crate::error::ErrorResponse),
        (status = NOT_FOUND, description = "Unknown or expired call_id", body = crate::error::ErrorResponse),
    )
)]
#[instrument(skip(state, query))]
pub async fn status(
    State(state): State<SplatFacade>,
    query: Result<Query<StatusQuery>, QueryRejection>,
) -> HttpResult<StatusResponse> {
    let Query(query) = query?;
    let call_id = query
        .call_id
        .filter(|id| !id.trim().is_empty())
        .ok_or(HttpError::MissingCallId)?;

    let status = state.poll(&JobHandle::from(call_id.trim()))?;
    Ok(StatusResponse::from(status))
}

/// Helper factory to build the image-to-3D routes over a job facade
#[derive(Clone)]
pub struct SplatRouter(pub SplatFacade);

impl From<SplatRouter> for OpenApiRouter {
    fn from(value: SplatRouter) -> Self {
        OpenApiRouter::new()
            .routes(routes!(process))
            .routes(routes!(status))
            .with_state(value.0)
            .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(value: serde_json::Value) -> ProcessRequest {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_missing_image() {
        for payload in [json!({}), json!({"image": null}), json!({"image": ""})] {
            let error = request(payload).into_request().unwrap_err();
            assert!(matches!(error, HttpError::MissingImage));
        }
    }

    #[test]
    fn test_defaults() {
        let (request, synchronous) = request(json!({"image": "aGVsbG8="})).into_request().unwrap();
        assert!(synchronous);
        assert_eq!(request.inputs.filename(), "image.jpg");
        assert_eq!(request.parameters().elevation(), 20);
        assert_eq!(request.parameters().prompt(), None);
    }

    #[test]
    fn test_async_flag_and_parameters() {
        let (request, synchronous) = request(json!({
            "image": "aGVsbG8=",
            "filename": "chair.png",
            "prompt": "a wooden chair",
            "elevation": 30,
            "async": true
        }))
        .into_request()
        .unwrap();

        assert!(!synchronous);
        assert_eq!(request.inputs.extension(), Some("png"));
        assert_eq!(request.parameters().prompt(), Some("a wooden chair"));
        assert_eq!(request.parameters().elevation(), 30);
    }

    #[test]
    fn test_invalid_base64() {
        let error = request(json!({"image": "%%%"})).into_request().unwrap_err();
        assert!(error.to_string().starts_with("Invalid base64 image payload"));
    }

    #[test]
    fn test_status_serialization() {
        let processing = serde_json::to_value(StatusResponse::from(JobStatus::Processing)).unwrap();
        assert_eq!(processing, json!({"status": "processing"}));

        let failed = StatusResponse::from(JobStatus::Failed(String::from("boom")));
        assert_eq!(
            serde_json::to_value(failed).unwrap(),
            json!({"status": "failed", "error": "boom"})
        );

        let completed = StatusResponse::from(JobStatus::Completed(PlyOutput::from(b"ply".to_vec())));
        assert_eq!(
            serde_json::to_value(completed).unwrap(),
            json!({"status": "completed", "ply": "cGx5"})
        );
    }

    #[test]
    fn test_spawned_serialization() {
        let response = ProcessResponse::from(Submission::Spawned(JobHandle::from("fc-123")));
        assert_eq!(
            serde_json::to_value(response).unwrap(),
            json!({"success": true, "call_id": "fc-123", "status": "processing"})
        );
    }
}
