use crate::headers::X_REQUEST_ID_NAME;
use axum::Router;
use axum::error_handling::HandleErrorLayer;
use std::fmt::Debug;
use std::sync::Arc;
use tokio::net::{TcpListener, ToSocketAddrs};
use tower::timeout::TimeoutLayer;
use tower::{BoxError, ServiceBuilder};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, instrument, warn};
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;
use utoipa_scalar::{Scalar, Servable};

mod api;
mod context;
pub mod environ;
pub mod error;
pub mod headers;
mod routes;
pub mod splat;

use crate::api::ApiDoc;
use crate::environ::HttpSettings;
use crate::routes::StatusRouter;
use crate::splat::SplatRouter;
pub use context::Context;
pub use error::HttpError;
use splatgate_core::JobFacade;
use splatgate_tasks::image_to_3d::{ImageTo3dRequest, PlyOutput};

pub type HttpResult<T> = Result<T, HttpError>;

/// Facade shared by every route, type-erased over the handler and job backend
pub type SplatFacade = Arc<dyn JobFacade<ImageTo3dRequest, PlyOutput>>;

const STATUS_TAG: &str = "Status";
const STATUS_DESC: &str = "Healthiness and monitoring of the endpoint";

pub const SPLAT_TAG: &str = "Image-to-3D";
pub const SPLAT_DESC: &str =
    "Turn a single image into a Gaussian splat point cloud, synchronously or as a background job.";

/// Assemble every route, the documentation and the middleware stack around `facade`.
pub fn router(facade: SplatFacade, settings: &HttpSettings) -> Router {
    let status = StatusRouter {
        service: settings.service.clone(),
        facade: Arc::clone(&facade),
    };

    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .merge(OpenApiRouter::from(SplatRouter(facade)))
        .merge(OpenApiRouter::from(status))
        .split_for_parts();

    // Elapsed requests answer with the same JSON body as any other failure
    let limit = settings.timeout.duration;
    let on_middleware_error =
        move |err: BoxError| async move { HttpError::from_middleware(err, limit) };

    // Documentation route
    let router = router.merge(Scalar::with_url("/docs", api)).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(PropagateRequestIdLayer::new(X_REQUEST_ID_NAME.clone()))
            .layer(HandleErrorLayer::new(on_middleware_error))
            .layer::<TimeoutLayer>(settings.timeout.into()),
    );

    match settings.cors.layer() {
        Some(cors) => router.layer(cors),
        None => router,
    }
}

#[instrument(skip(router))]
pub async fn serve_http<A>(interface: A, router: Router) -> HttpResult<()>
where
    A: ToSocketAddrs + Debug,
{
    let listener = TcpListener::bind(interface).await?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("Unable to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received, draining connections");
}
