use std::borrow::Cow;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Clone, Error, Debug)]
pub enum EnvironmentError {
    #[error(
        "Required environment variable {0} not found. Please define this variable {0}=... and relaunch the application."
    )]
    MissingEnvVar(String),

    #[error(
        "Found environment variable {0} but validation failed: {1}. Please fix this variable and relaunch the application."
    )]
    InvalidEnvVar(Cow<'static, str>, String),
}

/// Super trait for all variables which can be inferred at runtime, from the environment variables
pub trait FromEnv {
    const ENV_VAR_NAME: &'static str;

    fn from_env() -> Self;
}

/// Super trait for all variables which can be inferred at runtime, from the environment variables
/// but whose extraction may fail
pub trait TryFromEnv {
    const ENV_VAR_NAME: &'static str;

    fn try_from_env() -> Result<Self, EnvironmentError>
    where
        Self: Sized;
}

/// Read `name` from the environment and parse it, falling back to `default` when the variable
/// is not defined. A defined but unparsable value is reported instead of silently defaulted.
pub fn parse_or<T>(name: &'static str, default: T) -> Result<T, EnvironmentError>
where
    T: FromStr + Display,
    T::Err: Display,
{
    match std::env::var(name) {
        Ok(raw) => match T::from_str(raw.trim()) {
            Ok(value) => {
                debug!("[Environ] {name} set to {value}");
                Ok(value)
            }
            Err(err) => Err(EnvironmentError::InvalidEnvVar(name.into(), err.to_string())),
        },
        Err(_) => {
            debug!("[Environ] {name} not set, using default {default}");
            Ok(default)
        }
    }
}

/// Read a number of seconds from `name`, see [`parse_or`].
pub fn seconds_or(name: &'static str, default: u64) -> Result<Duration, EnvironmentError> {
    parse_or(name, default).map(Duration::from_secs)
}

/// Read a mandatory variable, empty values are treated as missing.
pub fn required(name: &'static str) -> Result<String, EnvironmentError> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(EnvironmentError::MissingEnvVar(name.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_parse_or_uses_default_when_unset() {
        unsafe {
            env::remove_var("SPLATGATE_TEST_PARSE_UNSET");
        }
        let value: u32 = parse_or("SPLATGATE_TEST_PARSE_UNSET", 42).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn test_parse_or_reads_value() {
        unsafe {
            env::set_var("SPLATGATE_TEST_PARSE_SET", " 7 ");
        }
        let value: u32 = parse_or("SPLATGATE_TEST_PARSE_SET", 42).unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn test_parse_or_with_invalid_string() {
        unsafe {
            env::set_var("SPLATGATE_TEST_PARSE_INVALID", "invalid");
        }
        let result: Result<u32, _> = parse_or("SPLATGATE_TEST_PARSE_INVALID", 42);
        assert!(matches!(result, Err(EnvironmentError::InvalidEnvVar(_, _))));
    }

    #[test]
    fn test_seconds_or() {
        unsafe {
            env::set_var("SPLATGATE_TEST_SECONDS", "5");
        }
        let duration = seconds_or("SPLATGATE_TEST_SECONDS", 120).unwrap();
        assert_eq!(duration, Duration::from_secs(5));
    }

    #[test]
    fn test_required_rejects_empty() {
        unsafe {
            env::set_var("SPLATGATE_TEST_REQUIRED_EMPTY", "  ");
        }
        let result = required("SPLATGATE_TEST_REQUIRED_EMPTY");
        assert!(matches!(result, Err(EnvironmentError::MissingEnvVar(_))));
    }
}
