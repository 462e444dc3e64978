//! Runtime configuration.
//!
//! Everything is read from environment variables, with defaults matching the
//! in-cluster deployment (certificates mounted at `/etc/webhook-secret/`).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

/// Default path to webhook TLS certificate
pub const DEFAULT_CERT_PATH: &str = "/etc/webhook-secret/tls.crt";
/// Default path to webhook TLS private key
pub const DEFAULT_KEY_PATH: &str = "/etc/webhook-secret/tls.key";
/// Default webhook server port
pub const DEFAULT_WEBHOOK_PORT: u16 = 8443;
/// Default health server port
pub const DEFAULT_HEALTH_PORT: u16 = 8080;
/// Default per-request timeout
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

pub const ENV_CERT_PATH: &str = "WEBHOOK_CERT_PATH";
pub const ENV_KEY_PATH: &str = "WEBHOOK_KEY_PATH";
pub const ENV_WEBHOOK_PORT: &str = "WEBHOOK_PORT";
pub const ENV_HEALTH_PORT: &str = "HEALTH_PORT";
pub const ENV_VERBOSE: &str = "WEBHOOK_VERBOSE";
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "WEBHOOK_REQUEST_TIMEOUT_SECS";

/// Configuration errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Settings for the webhook binary
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WebhookConfig {
    /// PEM certificate served on the webhook listener
    pub cert_path: PathBuf,
    /// PEM private key for `cert_path`
    pub key_path: PathBuf,
    pub webhook_port: u16,
    pub health_port: u16,
    /// Log full request and response bodies
    pub verbose: bool,
    /// Budget for handling a single admission request
    pub request_timeout: Duration,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            cert_path: PathBuf::from(DEFAULT_CERT_PATH),
            key_path: PathBuf::from(DEFAULT_KEY_PATH),
            webhook_port: DEFAULT_WEBHOOK_PORT,
            health_port: DEFAULT_HEALTH_PORT,
            verbose: true,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl WebhookConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// Unset or empty variables fall back to their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        Ok(Self {
            cert_path: get(ENV_CERT_PATH)
                .map(PathBuf::from)
                .unwrap_or(defaults.cert_path),
            key_path: get(ENV_KEY_PATH)
                .map(PathBuf::from)
                .unwrap_or(defaults.key_path),
            webhook_port: parse_or(ENV_WEBHOOK_PORT, get(ENV_WEBHOOK_PORT), defaults.webhook_port)?,
            health_port: parse_or(ENV_HEALTH_PORT, get(ENV_HEALTH_PORT), defaults.health_port)?,
            verbose: match get(ENV_VERBOSE) {
                Some(value) => parse_bool(ENV_VERBOSE, &value)?,
                None => defaults.verbose,
            },
            request_timeout: parse_or(
                ENV_REQUEST_TIMEOUT_SECS,
                get(ENV_REQUEST_TIMEOUT_SECS),
                DEFAULT_REQUEST_TIMEOUT_SECS,
            )
            .map(Duration::from_secs)?,
        })
    }

    /// Address the TLS webhook listener binds to
    pub fn webhook_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.webhook_port))
    }

    /// Address the plain-HTTP health listener binds to
    pub fn health_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.health_port))
    }
}

fn parse_or<T>(var: &'static str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        Some(raw) => raw.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
            var,
            value: raw.clone(),
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            var,
            value: value.to_string(),
            reason: "expected a boolean".to_string(),
        }),
    }
}
