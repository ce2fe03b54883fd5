pub mod config;
pub mod engine;
mod error;

use crate::config::ServiceConfig;
use crate::engine::CommandHandler;
pub use error::Error;
use splatgate_core::{EndpointContext, ExecutionLimits, LocalJobBackend, Submission};
use splatgate_http::{SplatFacade, router, serve_http};
use splatgate_tasks::image_to_3d::{ImageInput, ImageTo3dHandler, ImageTo3dParams, ImageTo3dRequest};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// High-level object containing all the information required to run the actual endpoint
pub trait Endpoint {
    /// Main entrypoint for running the actual endpoint
    fn run(&self) -> impl Future<Output = Result<(), Error>> + Send;
}

/// Serves the subprocess engine over HTTP
pub struct SplatEndpoint {
    host: String,
    port: u16,
    config: ServiceConfig,
}

impl SplatEndpoint {
    pub fn new(host: String, port: u16, config: ServiceConfig) -> Self {
        Self { host, port, config }
    }
}

impl Endpoint for SplatEndpoint {
    #[instrument(skip(self), fields(host = %self.host, port = self.port))]
    async fn run(&self) -> Result<(), Error> {
        let handler = CommandHandler::new(self.config.engine.clone());

        // Pay the cold start now rather than on the first request, a failure is retried later
        if let Err(err) = handler.warmup().await {
            warn!("Engine warmup failed: {err}");
        }

        let facade = facade(handler, self.config.limits, self.config.retention);
        let router = router(facade, &self.config.http);

        info!("Starting endpoint at {}:{}", self.host, self.port);
        serve_http((self.host.as_str(), self.port), router).await?;
        Ok(())
    }
}

/// Wrap `handler` in a facade backed by the in-process job backend
pub fn facade<H: ImageTo3dHandler>(
    handler: H,
    limits: ExecutionLimits,
    retention: Duration,
) -> SplatFacade {
    Arc::new(EndpointContext::new(
        handler,
        LocalJobBackend::new(retention),
        limits,
    ))
}

/// Where `run_once` writes the point cloud when no output is given: next to the image
pub fn default_output_path(image: &Path) -> PathBuf {
    image.with_extension("ply")
}

/// Run a single synchronous inference on the image at `image` and save the point cloud.
#[instrument(skip(handler, limits, params))]
pub async fn run_once<H: ImageTo3dHandler>(
    handler: H,
    limits: ExecutionLimits,
    image: &Path,
    params: ImageTo3dParams,
    output: Option<PathBuf>,
) -> Result<PathBuf, Error> {
    let bytes = match tokio::fs::read(image).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::ImageNotFound(image.to_path_buf()));
        }
        Err(err) => return Err(err.into()),
    };

    let filename = image
        .file_name()
        .map(|name| name.to_string_lossy().into_owned());
    let input = ImageInput::new(bytes, filename)?;

    let context = EndpointContext::new(handler, LocalJobBackend::new(Duration::ZERO), limits);
    let request = ImageTo3dRequest::new(input, params);

    let output = output.unwrap_or_else(|| default_output_path(image));
    match context.submit(request, true).await? {
        Submission::Completed(ply) => {
            tokio::fs::write(&output, ply.as_bytes()).await?;
            Ok(output)
        }
        Submission::Spawned(handle) => Err(splatgate_core::Error::Runtime(
            format!("inference unexpectedly scheduled as {handle}").into(),
        )
        .into()),
    }
}

/// Install the global `tracing` subscriber, honoring `RUST_LOG` and defaulting to `info`
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .try_init();
}
