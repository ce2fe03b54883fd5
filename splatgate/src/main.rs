use clap::{Parser, Subcommand};
use splatgate::config::{EngineConfig, ServiceConfig, limits_from_env};
use splatgate::engine::CommandHandler;
use splatgate::{Endpoint, Error, SplatEndpoint, init_tracing, run_once};
use splatgate_tasks::image_to_3d::ImageTo3dParams;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;

/// Serve an image-to-3D Gaussian splatting engine over HTTP
#[derive(Parser)]
#[command(name = "splatgate")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP service
    Serve {
        /// Interface to bind
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        /// Port to listen on
        #[arg(short, long, default_value_t = 8000)]
        port: u16,
    },

    /// Turn a single image into a PLY file, without going through HTTP
    Run {
        /// Image to lift to 3D
        image: PathBuf,

        /// Optional text conditioning
        #[arg(long)]
        prompt: Option<String>,

        /// Camera elevation in degrees
        #[arg(long, allow_hyphen_values = true)]
        elevation: Option<i32>,

        /// Where to write the point cloud, defaults to the image path with a .ply extension
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

async fn serve(host: String, port: u16) -> Result<(), Error> {
    let config = ServiceConfig::try_from_env()?;
    SplatEndpoint::new(host, port, config).run().await
}

async fn run(
    image: PathBuf,
    prompt: Option<String>,
    elevation: Option<i32>,
    output: Option<PathBuf>,
) -> Result<(), Error> {
    let engine = EngineConfig::try_from_env()?;
    let limits = limits_from_env()?;

    println!("Processing {} ...", image.display());
    let params = ImageTo3dParams::new(prompt, elevation);
    let saved = run_once(CommandHandler::new(engine), limits, &image, params, output).await?;
    println!("Saved PLY to {}", saved.display());
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_tracing();

    let result = match Cli::parse().command {
        Commands::Serve { host, port } => serve(host, port).await,
        Commands::Run {
            image,
            prompt,
            elevation,
            output,
        } => run(image, prompt, elevation, output).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}
