#![cfg(unix)]

use splatgate::config::EngineConfig;
use splatgate::engine::CommandHandler;
use splatgate::{Error, run_once};
use splatgate_core::{
    EndpointContext, ExecutionLimits, Handler, HandlerError, LocalJobBackend, Submission,
};
use splatgate_tasks::image_to_3d::{ImageInput, ImageTo3dParams, ImageTo3dRequest};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

/// Writes a PLY header listing its arguments and cache location, followed by the input image
const ECHO_ENGINE: &str = r#"
all="$*"
while [ $# -gt 0 ]; do
  case "$1" in
    --input) input="$2"; shift 2 ;;
    --output) output="$2"; shift 2 ;;
    *) shift ;;
  esac
done
printf 'ply\ncomment %s\ncomment hf_home %s\n' "$all" "$HF_HOME" > "$output"
cat "$input" >> "$output"
"#;

const FAILING_ENGINE: &str = r#"
echo "loading weights"
echo "RuntimeError: boom" >&2
exit 3
"#;

const SILENT_ENGINE: &str = "exit 0\n";

/// Creates the output file but never writes to it
const EMPTY_ENGINE: &str = r#"
while [ $# -gt 0 ]; do
  case "$1" in
    --output) output="$2"; shift 2 ;;
    *) shift ;;
  esac
done
: > "$output"
"#;

const SLOW_ENGINE: &str = "sleep 5\n";

struct Sandbox {
    root: TempDir,
}

impl Sandbox {
    fn new() -> Self {
        Self {
            root: tempfile::tempdir().unwrap(),
        }
    }

    fn cache_dir(&self) -> PathBuf {
        self.root.path().join("cache")
    }

    /// Scripts are run through `sh` so they never need the executable bit
    fn engine(&self, script: &str) -> CommandHandler {
        let path = self.root.path().join("engine.sh");
        std::fs::write(&path, script).unwrap();

        CommandHandler::new(EngineConfig {
            program: String::from("sh"),
            args: vec![path.to_string_lossy().into_owned()],
            cache_dir: self.cache_dir(),
        })
    }

    fn image(&self, name: &str, bytes: &[u8]) -> PathBuf {
        let path = self.root.path().join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }
}

fn request(bytes: &[u8], params: ImageTo3dParams) -> ImageTo3dRequest {
    let image = ImageInput::new(bytes.to_vec(), Some(String::from("chair.png"))).unwrap();
    ImageTo3dRequest::new(image, params)
}

fn header(ply: &[u8]) -> String {
    String::from_utf8_lossy(ply).lines().take(3).collect::<Vec<_>>().join("\n")
}

#[tokio::test]
async fn engine_output_is_returned() {
    let sandbox = Sandbox::new();
    let handler = sandbox.engine(ECHO_ENGINE);

    let output = handler
        .on_request(request(b"\xFF\xD8pixels", ImageTo3dParams::default()))
        .await
        .unwrap();

    assert!(output.looks_like_ply());
    assert!(output.as_bytes().ends_with(b"\xFF\xD8pixels"));

    let header = header(output.as_bytes());
    assert!(header.contains("--elevation 20"));
    assert!(header.contains("chair.png"));
    assert!(!header.contains("--prompt"));

    let hf_home = sandbox.cache_dir().join("huggingface");
    assert!(header.contains(&format!("hf_home {}", hf_home.display())));
    assert!(hf_home.join("datasets").is_dir());
    assert!(sandbox.cache_dir().join("torch").is_dir());
}

#[tokio::test]
async fn prompt_and_elevation_are_forwarded() {
    let sandbox = Sandbox::new();
    let handler = sandbox.engine(ECHO_ENGINE);
    let params = ImageTo3dParams::new(Some(String::from("red chair")), Some(-5));

    let output = handler.on_request(request(b"img", params)).await.unwrap();
    let header = header(output.as_bytes());
    assert!(header.contains("--elevation -5"));
    assert!(header.contains("--prompt red chair"));
}

#[tokio::test]
async fn engine_failure_reports_stderr() {
    let sandbox = Sandbox::new();
    let handler = sandbox.engine(FAILING_ENGINE);

    let error = handler
        .on_request(request(b"img", ImageTo3dParams::default()))
        .await
        .unwrap_err();

    assert!(matches!(error, HandlerError::Implementation(_)));
    let message = error.to_string();
    assert!(message.starts_with("engine exited with"));
    assert!(message.ends_with("RuntimeError: boom"));
}

#[tokio::test]
async fn missing_output_is_an_error() {
    let sandbox = Sandbox::new();
    let handler = sandbox.engine(SILENT_ENGINE);

    let error = handler
        .on_request(request(b"img", ImageTo3dParams::default()))
        .await
        .unwrap_err();
    assert!(error.to_string().starts_with("engine did not produce a PLY file at"));
}

#[tokio::test]
async fn empty_output_is_an_error() {
    let sandbox = Sandbox::new();
    let context = EndpointContext::new(
        sandbox.engine(EMPTY_ENGINE),
        LocalJobBackend::new(Duration::from_secs(60)),
        ExecutionLimits::default(),
    );

    let result = context
        .submit(request(b"img", ImageTo3dParams::default()), true)
        .await;
    match result {
        Err(splatgate_core::Error::Handler(HandlerError::Implementation(message))) => {
            assert!(message.starts_with("engine produced an empty PLY file at"));
        }
        other => panic!("Expected an engine failure, got {other:?}"),
    }
    assert_eq!(context.stats().failed, 1);
}

#[tokio::test]
async fn unknown_program_fails_every_request() {
    let sandbox = Sandbox::new();
    let handler = CommandHandler::new(EngineConfig {
        program: String::from("splatgate-engine-that-does-not-exist"),
        args: Vec::new(),
        cache_dir: sandbox.cache_dir(),
    });

    for _ in 0..2 {
        let error = handler
            .on_request(request(b"img", ImageTo3dParams::default()))
            .await
            .unwrap_err();
        assert!(error.to_string().contains("not found"));
    }
}

#[tokio::test]
async fn slow_engine_times_out() {
    let sandbox = Sandbox::new();
    let context = EndpointContext::new(
        sandbox.engine(SLOW_ENGINE),
        LocalJobBackend::new(Duration::from_secs(60)),
        ExecutionLimits {
            timeout: Duration::from_millis(300),
            max_concurrency: 1,
        },
    );

    let result = context
        .submit(request(b"img", ImageTo3dParams::default()), true)
        .await;
    assert!(matches!(
        result,
        Err(splatgate_core::Error::Handler(HandlerError::Timeout(_)))
    ));
}

#[tokio::test]
async fn run_once_saves_next_to_the_image() {
    let sandbox = Sandbox::new();
    let image = sandbox.image("chair.jpg", b"jpeg bytes");

    let saved = run_once(
        sandbox.engine(ECHO_ENGINE),
        ExecutionLimits::default(),
        &image,
        ImageTo3dParams::default(),
        None,
    )
    .await
    .unwrap();

    assert_eq!(saved, sandbox.root.path().join("chair.ply"));
    let ply = std::fs::read(&saved).unwrap();
    assert!(ply.starts_with(b"ply\n"));
    assert!(ply.ends_with(b"jpeg bytes"));
}

#[tokio::test]
async fn run_once_reports_missing_images() {
    let sandbox = Sandbox::new();
    let missing = Path::new("/definitely/not/here.png");

    let result = run_once(
        sandbox.engine(ECHO_ENGINE),
        ExecutionLimits::default(),
        missing,
        ImageTo3dParams::default(),
        None,
    )
    .await;

    assert!(matches!(result, Err(Error::ImageNotFound(path)) if path == missing));
}

#[tokio::test]
async fn asynchronous_jobs_use_the_engine() {
    let sandbox = Sandbox::new();
    let context = EndpointContext::new(
        sandbox.engine(ECHO_ENGINE),
        LocalJobBackend::new(Duration::from_secs(60)),
        ExecutionLimits::default(),
    );

    let Submission::Spawned(handle) = context
        .submit(request(b"async", ImageTo3dParams::default()), false)
        .await
        .unwrap()
    else {
        panic!("Expected a spawned job");
    };

    for _ in 0..500 {
        let status = context.poll(&handle).unwrap();
        if status.is_terminal() {
            match status {
                splatgate_core::JobStatus::Completed(output) => {
                    assert!(output.as_bytes().ends_with(b"async"));
                    return;
                }
                other => panic!("Expected Completed, got {other:?}"),
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {handle} never settled");
}
