//! Environment-driven configuration.
//!
//! Environment variables:
//! - `APP_ENV` - `production` (case-insensitive) or anything else for development
//! - `AWS_REGION`, `AWS_PROFILE` - credential resolution in development
//! - `SES_FROM_ARN` - verified sending identity ARN (optional)
//! - `ATTACHMENT_DIR` - where fetched attachments are written (default: OS temp dir)
//! - `ATTACHMENT_CLEANUP` - `fetched` (default) or `all`
//! - `HTTP_TIMEOUT_SECS` - attachment download timeout (default: 30)
//! - `ERROR_REPORT_URL` - failure webhook (optional)

use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Configuration error type
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Environment variable '{0}' is required but not set")]
    MissingEnvVar(String),

    #[error("Failed to parse environment variable '{key}': {details}")]
    ParseError { key: String, details: String },
}

/// Execution mode of the dispatcher
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Environment {
    /// Local testing: explicit AWS profile, attachments kept on disk
    Development,
    /// Deployed: default credential chain, attachments cleaned up
    Production,
}

impl Environment {
    pub fn from_env() -> Self {
        let app_env = env_or_default("APP_ENV", "development");

        if app_env.eq_ignore_ascii_case("production") {
            Environment::Production
        } else {
            Environment::Development
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }

    pub fn is_development(&self) -> bool {
        matches!(self, Environment::Development)
    }
}

/// Which attachments are deleted after the message has been serialized.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CleanupScope {
    /// Only files the dispatcher downloaded itself
    #[default]
    Fetched,
    /// Downloaded files and caller-supplied local files
    All,
}

impl std::str::FromStr for CleanupScope {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fetched" | "" => Ok(CleanupScope::Fetched),
            "all" => Ok(CleanupScope::All),
            other => Err(ConfigError::ParseError {
                key: "ATTACHMENT_CLEANUP".to_string(),
                details: format!("expected 'fetched' or 'all', got '{}'", other),
            }),
        }
    }
}

/// Trait for configuration that can be loaded from environment variables
pub trait FromEnv: Sized {
    fn from_env() -> Result<Self, ConfigError>;
}

/// Dispatcher configuration, built once per process.
#[derive(Clone, Debug)]
pub struct DispatchConfig {
    pub environment: Environment,
    pub aws_region: Option<String>,
    pub aws_profile: Option<String>,
    pub from_arn: Option<String>,
    pub attachment_dir: PathBuf,
    pub cleanup: CleanupScope,
    pub http_timeout: Duration,
    pub error_report_url: Option<String>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            aws_region: None,
            aws_profile: None,
            from_arn: None,
            attachment_dir: env::temp_dir(),
            cleanup: CleanupScope::Fetched,
            http_timeout: Duration::from_secs(30),
            error_report_url: None,
        }
    }
}

impl DispatchConfig {
    /// Materialized attachments are kept on disk in development.
    pub fn retain_attachments(&self) -> bool {
        self.environment.is_development()
    }
}

impl FromEnv for DispatchConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let timeout_raw = env_or_default("HTTP_TIMEOUT_SECS", "30");
        let http_timeout = timeout_raw
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|e| ConfigError::ParseError {
                key: "HTTP_TIMEOUT_SECS".to_string(),
                details: e.to_string(),
            })?;

        let attachment_dir = env_optional("ATTACHMENT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(env::temp_dir);

        Ok(Self {
            environment: Environment::from_env(),
            aws_region: env_optional("AWS_REGION"),
            aws_profile: env_optional("AWS_PROFILE"),
            from_arn: env_optional("SES_FROM_ARN"),
            attachment_dir,
            cleanup: env_or_default("ATTACHMENT_CLEANUP", "fetched").parse()?,
            http_timeout,
            error_report_url: env_optional("ERROR_REPORT_URL"),
        })
    }
}

/// Helper to load and parse environment variable with a default value
pub fn env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Unset and empty variables are both treated as absent.
fn env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}
