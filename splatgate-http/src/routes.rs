use crate::environ::ServiceName;
use crate::{STATUS_TAG, SplatFacade};
use axum::Json;
use axum::extract::State;
use serde::Serialize;
use splatgate_core::InFlightSnapshot;
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

/// Liveness report
#[cfg_attr(debug_assertions, derive(Debug))]
#[derive(Serialize, ToSchema)]
pub struct Health {
    /// Always `ok` when the process serves requests
    status: &'static str,

    /// Name of the model served by this process
    service: String,

    /// Always `healthy`, kept for existing clients
    endpoint: &'static str,
}

/// Counters about the inferences going through the endpoint
#[cfg_attr(debug_assertions, derive(Debug))]
#[derive(Serialize, ToSchema)]
pub struct Stats {
    /// Inferences waiting for an execution slot
    in_queue: u64,

    /// Inferences currently running
    in_flight: u64,

    /// Inferences which produced a point cloud
    completed: u64,

    /// Inferences which ended in an error
    failed: u64,
}

impl From<InFlightSnapshot> for Stats {
    fn from(value: InFlightSnapshot) -> Self {
        Self {
            in_queue: value.in_queue,
            in_flight: value.in_flight,
            completed: value.completed,
            failed: value.failed,
        }
    }
}

#[derive(Clone)]
struct StatusState {
    service: Arc<str>,
    facade: SplatFacade,
}

#[utoipa::path(
    method(get, head),
    path = "/health",
    tag = STATUS_TAG,
    responses(
        (status = OK, description = "Success", body = Health, content_type = "application/json")
    )
)]
#[instrument(skip(state))]
async fn health(State(state): State<StatusState>) -> Json<Health> {
    Json(Health {
        status: "ok",
        service: state.service.to_string(),
        endpoint: "healthy",
    })
}

#[utoipa::path(
    get,
    path = "/stats",
    tag = STATUS_TAG,
    responses(
        (status = OK, description = "Snapshot of the in-flight counters", body = Stats)
    )
)]
#[instrument(skip(state))]
async fn stats(State(state): State<StatusState>) -> Json<Stats> {
    Json(Stats::from(state.facade.stats()))
}

/// Provides all the routes to report status
pub struct StatusRouter {
    pub service: ServiceName,
    pub facade: SplatFacade,
}

impl From<StatusRouter> for OpenApiRouter {
    fn from(value: StatusRouter) -> Self {
        let state = StatusState {
            service: Arc::from(value.service.0),
            facade: value.facade,
        };

        OpenApiRouter::new()
            .routes(routes!(health))
            .routes(routes!(stats))
            .with_state(state)
    }
}
