use crate::config::EngineConfig;
use splatgate_core::{Handler, HandlerError, ModelCell};
use splatgate_tasks::image_to_3d::{ImageTo3dParams, ImageTo3dRequest, PlyOutput};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Instant;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{ChildStdout, Command};
use tracing::{debug, info, instrument, warn};

/// Name of the point cloud the engine is asked to write
pub const OUTPUT_FILENAME: &str = "gaussians.ply";

/// Amount of stderr kept in error messages
const STDERR_TAIL_BYTES: usize = 2048;

/// Engine resolved and ready to be launched, loaded once per process.
#[cfg_attr(debug_assertions, derive(Debug))]
pub struct EngineRuntime {
    program: PathBuf,
    args: Vec<String>,
    env: Vec<(&'static str, PathBuf)>,
}

impl EngineRuntime {
    /// Resolve the engine program and prepare the weights caches.
    pub async fn load(config: &EngineConfig) -> Result<Self, HandlerError> {
        let program = config.program.clone();
        let program = blocking(move || resolve_program(&program)).await?;

        let huggingface = config.cache_dir.join("huggingface");
        let env = vec![
            ("TORCH_HOME", config.cache_dir.join("torch")),
            ("HF_DATASETS_CACHE", huggingface.join("datasets")),
            ("HF_HOME", huggingface),
        ];

        for (_, directory) in &env {
            tokio::fs::create_dir_all(directory).await?;
        }

        info!(
            "Engine {} ready, caches under {}",
            program.display(),
            config.cache_dir.display()
        );
        Ok(Self {
            program,
            args: config.args.clone(),
            env,
        })
    }

    #[inline]
    pub fn program(&self) -> &Path {
        &self.program
    }

    fn command(&self, input: &Path, output: &Path, params: &ImageTo3dParams) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg("--input")
            .arg(input)
            .arg("--output")
            .arg(output)
            .arg("--elevation")
            .arg(params.elevation().to_string());

        if let Some(prompt) = params.prompt() {
            command.arg("--prompt").arg(prompt);
        }

        command
            .envs(self.env.iter().map(|(key, value)| (*key, value)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

/// Find `program` either as a path or in one of the `PATH` directories
fn resolve_program(program: &str) -> Result<PathBuf, HandlerError> {
    let candidate = Path::new(program);
    if candidate.is_absolute() || candidate.components().count() > 1 {
        return if candidate.is_file() {
            Ok(candidate.to_path_buf())
        } else {
            Err(HandlerError::implementation(format!(
                "engine program not found: {program}"
            )))
        };
    }

    std::env::var_os("PATH")
        .iter()
        .flat_map(std::env::split_paths)
        .map(|directory| directory.join(program))
        .find(|path| path.is_file())
        .ok_or_else(|| {
            HandlerError::implementation(format!("engine program not found in PATH: {program}"))
        })
}

fn stderr_tail(stderr: &[u8]) -> String {
    let start = stderr.len().saturating_sub(STDERR_TAIL_BYTES);
    String::from_utf8_lossy(&stderr[start..]).trim().to_string()
}

/// Run filesystem work off the async workers
async fn blocking<T, F>(work: F) -> Result<T, HandlerError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, HandlerError> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| HandlerError::Aborted(err.to_string()))?
}

/// Forward the engine progress to the logs, line by line
async fn log_stdout(stdout: Option<ChildStdout>) {
    if let Some(stdout) = stdout {
        let mut lines = BufReader::new(stdout).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!("[engine] {line}");
        }
    }
}

/// Drain `stream`, keeping only its last bytes in memory
async fn read_tail<R: AsyncRead + Unpin>(stream: Option<R>) -> String {
    let mut tail = Vec::with_capacity(2 * STDERR_TAIL_BYTES);
    if let Some(mut stream) = stream {
        let mut chunk = [0u8; 4096];
        loop {
            match stream.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(read) => {
                    tail.extend_from_slice(&chunk[..read]);
                    if tail.len() > 2 * STDERR_TAIL_BYTES {
                        tail.drain(..tail.len() - STDERR_TAIL_BYTES);
                    }
                }
            }
        }
    }
    stderr_tail(&tail)
}

/// Spawn the engine and wait for it, returning its exit status and the tail of its stderr
async fn run_engine(mut command: Command) -> Result<(ExitStatus, String), HandlerError> {
    let mut child = command.spawn()?;
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let (status, (), tail) = tokio::join!(child.wait(), log_stdout(stdout), read_tail(stderr));
    Ok((status?, tail))
}

/// Runs an external inference program once per request.
///
/// The image is written in a scratch directory, the program is asked to write its point cloud
/// next to it and the directory is removed once the output was read back. A timeout drops the
/// running future, which kills the child process.
pub struct CommandHandler {
    config: EngineConfig,
    runtime: ModelCell<EngineRuntime>,
}

impl CommandHandler {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            runtime: ModelCell::new(),
        }
    }

    /// Load the engine ahead of the first request
    pub async fn warmup(&self) -> Result<(), HandlerError> {
        self.runtime()
            .await
            .map(|runtime| debug!("Engine {} warmed up", runtime.program().display()))
    }

    async fn runtime(&self) -> Result<Arc<EngineRuntime>, HandlerError> {
        self.runtime
            .get_or_load(|| EngineRuntime::load(&self.config))
            .await
    }
}

impl Handler for CommandHandler {
    type Request = ImageTo3dRequest;
    type Response = PlyOutput;

    #[instrument(skip_all, fields(filename = request.inputs.filename()))]
    async fn on_request(&self, request: ImageTo3dRequest) -> Result<PlyOutput, HandlerError> {
        let runtime = self.runtime().await?;
        let workdir = blocking(|| Ok(tempfile::Builder::new().prefix("splatgate-").tempdir()?)).await?;

        let outcome = self.infer(&runtime, &workdir, request).await;

        // A cancelled inference removes the directory when dropped instead
        if let Err(err) = blocking(move || Ok(workdir.close()?)).await {
            warn!("Unable to remove scratch directory: {err}");
        }
        outcome
    }
}

impl CommandHandler {
    async fn infer(
        &self,
        runtime: &Arc<EngineRuntime>,
        workdir: &TempDir,
        request: ImageTo3dRequest,
    ) -> Result<PlyOutput, HandlerError> {
        let (image, params) = request.into_parts();
        let input = workdir.path().join(image.sanitized_filename());
        let output = workdir.path().join(OUTPUT_FILENAME);
        tokio::fs::write(&input, image.bytes()).await?;

        let started = Instant::now();
        let mut command = runtime.command(&input, &output, &params);
        command.current_dir(workdir.path());

        let (status, stderr) = run_engine(command).await?;
        if !status.success() {
            return Err(HandlerError::implementation(format!(
                "engine exited with {status}: {stderr}"
            )));
        }

        match tokio::fs::read(&output).await {
            Ok(bytes) if bytes.is_empty() => Err(HandlerError::implementation(format!(
                "engine produced an empty PLY file at {}",
                output.display()
            ))),
            Ok(bytes) => {
                info!(
                    "Engine produced {} bytes in {:.2?}",
                    bytes.len(),
                    started.elapsed()
                );
                Ok(PlyOutput::checked(bytes))
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(HandlerError::implementation(format!(
                    "engine did not produce a PLY file at {}",
                    output.display()
                )))
            }
            Err(err) => Err(err.into()),
        }
    }
}
