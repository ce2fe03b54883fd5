use splatgate_core::ExecutionLimits;
use splatgate_core::environ::{EnvironmentError, parse_or, required, seconds_or};
use splatgate_http::environ::HttpSettings;
use std::path::PathBuf;
use std::time::Duration;

pub const ENGINE_PROGRAM_ENV: &str = "SPLATGATE_ENGINE_PROGRAM";
pub const ENGINE_ARGS_ENV: &str = "SPLATGATE_ENGINE_ARGS";
pub const CACHE_DIR_ENV: &str = "SPLATGATE_CACHE_DIR";
pub const INFERENCE_TIMEOUT_ENV: &str = "SPLATGATE_INFERENCE_TIMEOUT_SEC";
pub const MAX_CONCURRENT_JOBS_ENV: &str = "SPLATGATE_MAX_CONCURRENT_JOBS";
pub const JOB_RETENTION_ENV: &str = "SPLATGATE_JOB_RETENTION_SEC";

const DEFAULT_CACHE_DIR: &str = "/cache";
const DEFAULT_INFERENCE_TIMEOUT_SECS: u64 = 900;
const DEFAULT_JOB_RETENTION_SECS: u64 = 3600;

/// How to launch the inference engine
#[cfg_attr(debug_assertions, derive(Debug))]
#[derive(Clone)]
pub struct EngineConfig {
    /// Program name, looked up in `PATH`, or path to the engine executable
    pub program: String,

    /// Extra arguments put in front of the standard flags
    pub args: Vec<String>,

    /// Root of the weights caches
    pub cache_dir: PathBuf,
}

impl EngineConfig {
    pub fn try_from_env() -> Result<Self, EnvironmentError> {
        let program = required(ENGINE_PROGRAM_ENV)?.trim().to_string();
        let args = std::env::var(ENGINE_ARGS_ENV)
            .map(|raw| raw.split_whitespace().map(String::from).collect())
            .unwrap_or_default();
        let cache_dir = std::env::var(CACHE_DIR_ENV)
            .ok()
            .filter(|dir| !dir.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_DIR));

        Ok(Self {
            program,
            args,
            cache_dir,
        })
    }
}

/// Everything the service reads from the environment
#[cfg_attr(debug_assertions, derive(Debug))]
#[derive(Clone)]
pub struct ServiceConfig {
    pub engine: EngineConfig,
    pub limits: ExecutionLimits,
    pub retention: Duration,
    pub http: HttpSettings,
}

impl ServiceConfig {
    pub fn try_from_env() -> Result<Self, EnvironmentError> {
        Ok(Self {
            engine: EngineConfig::try_from_env()?,
            limits: limits_from_env()?,
            retention: seconds_or(JOB_RETENTION_ENV, DEFAULT_JOB_RETENTION_SECS)?,
            http: HttpSettings::try_from_env()?,
        })
    }
}

/// Inference timeout and concurrency bound
pub fn limits_from_env() -> Result<ExecutionLimits, EnvironmentError> {
    let timeout = seconds_or(INFERENCE_TIMEOUT_ENV, DEFAULT_INFERENCE_TIMEOUT_SECS)?;
    let max_concurrency = parse_or(MAX_CONCURRENT_JOBS_ENV, 1usize)?;
    if max_concurrency == 0 {
        return Err(EnvironmentError::InvalidEnvVar(
            MAX_CONCURRENT_JOBS_ENV.into(),
            String::from("at least one concurrent job is required"),
        ));
    }

    Ok(ExecutionLimits {
        timeout,
        max_concurrency,
    })
}
