use axum::http::{HeaderValue, Method, header};
use splatgate_core::environ::{EnvironmentError, FromEnv, TryFromEnv, seconds_or};
use std::time::Duration;
use tower::timeout::TimeoutLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::debug;

/// Upper bound applied to every HTTP request, in seconds.
///
/// It should stay above the inference timeout so a synchronous request reports the inference
/// failure itself rather than being cut by the transport.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use splatgate_http::environ::Timeout;
///
/// let timeout = Timeout {
///     duration: Duration::from_secs(30),
/// };
/// ```
#[cfg_attr(debug_assertions, derive(Debug))]
#[derive(Copy, Clone)]
pub struct Timeout {
    pub duration: Duration,
}

impl Timeout {
    pub const DEFAULT_SECS: u64 = 960;
}

impl TryFromEnv for Timeout {
    /// Name of the environment variable holding the request timeout, in seconds.
    ///
    /// # Example:
    /// ```
    /// use splatgate_core::environ::TryFromEnv;
    /// use splatgate_http::environ::Timeout;
    ///
    /// assert_eq!(Timeout::ENV_VAR_NAME, "SPLATGATE_REQUEST_TIMEOUT_SEC");
    /// ```
    const ENV_VAR_NAME: &'static str = "SPLATGATE_REQUEST_TIMEOUT_SEC";

    /// Read the timeout from the environment, defaulting to [`Timeout::DEFAULT_SECS`] when the
    /// variable is not defined.
    ///
    /// # Errors
    /// - `EnvironmentError::InvalidEnvVar`: the variable is defined but is not a positive number
    ///   of seconds.
    fn try_from_env() -> Result<Self, EnvironmentError> {
        let duration = seconds_or(Self::ENV_VAR_NAME, Self::DEFAULT_SECS)?;
        Ok(Self { duration })
    }
}

/// Helper conversion from an environment extracted Timeout to `tower::timeout::TimeoutLayer`
impl From<Timeout> for TimeoutLayer {
    fn from(value: Timeout) -> Self {
        TimeoutLayer::new(value.duration)
    }
}

/// Name reported by the health check
#[cfg_attr(debug_assertions, derive(Debug))]
#[derive(Clone)]
pub struct ServiceName(pub String);

impl ServiceName {
    pub const DEFAULT: &'static str = "anysplat";
}

impl FromEnv for ServiceName {
    const ENV_VAR_NAME: &'static str = "SPLATGATE_SERVICE_NAME";

    fn from_env() -> Self {
        match std::env::var(Self::ENV_VAR_NAME) {
            Ok(name) if !name.trim().is_empty() => Self(name.trim().to_string()),
            _ => Self(String::from(Self::DEFAULT)),
        }
    }
}

impl Default for ServiceName {
    fn default() -> Self {
        Self(String::from(Self::DEFAULT))
    }
}

/// Origins allowed to call the API from a browser.
/// CORS is disabled entirely when no origin is configured.
#[cfg_attr(debug_assertions, derive(Debug))]
#[derive(Clone, Default)]
pub struct CorsOrigins(pub Vec<HeaderValue>);

impl CorsOrigins {
    /// Parse a comma separated list of origins, blank entries are skipped.
    /// Credentials are allowed, so the `*` wildcard is refused.
    pub fn parse(raw: &str) -> Result<Self, EnvironmentError> {
        raw.split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(|origin| {
                if origin == "*" {
                    return Err(EnvironmentError::InvalidEnvVar(
                        Self::ENV_VAR_NAME.into(),
                        String::from("wildcard origin is not allowed, list the origins explicitly"),
                    ));
                }
                HeaderValue::from_str(origin).map_err(|err| {
                    EnvironmentError::InvalidEnvVar(
                        Self::ENV_VAR_NAME.into(),
                        format!("{origin}: {err}"),
                    )
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }

    /// Build the CORS layer for these origins, `None` when the list is empty.
    pub fn layer(&self) -> Option<CorsLayer> {
        if self.0.is_empty() {
            return None;
        }

        Some(
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(self.0.iter().cloned()))
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
                .allow_credentials(true)
                .max_age(Duration::from_secs(86400)),
        )
    }
}

impl TryFromEnv for CorsOrigins {
    const ENV_VAR_NAME: &'static str = "SPLATGATE_CORS_ORIGINS";

    fn try_from_env() -> Result<Self, EnvironmentError> {
        match std::env::var(Self::ENV_VAR_NAME) {
            Ok(raw) => {
                let origins = Self::parse(&raw)?;
                debug!("[Environ] CORS enabled for {} origin(s)", origins.0.len());
                Ok(origins)
            }
            Err(_) => Ok(Self::default()),
        }
    }
}

/// Everything the HTTP surface reads from the environment
#[cfg_attr(debug_assertions, derive(Debug))]
#[derive(Clone)]
pub struct HttpSettings {
    pub service: ServiceName,
    pub timeout: Timeout,
    pub cors: CorsOrigins,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            service: ServiceName::default(),
            timeout: Timeout {
                duration: Duration::from_secs(Timeout::DEFAULT_SECS),
            },
            cors: CorsOrigins::default(),
        }
    }
}

impl HttpSettings {
    pub fn try_from_env() -> Result<Self, EnvironmentError> {
        Ok(Self {
            service: ServiceName::from_env(),
            timeout: Timeout::try_from_env()?,
            cors: CorsOrigins::try_from_env()?,
        })
    }
}
