use std::time::Duration;

use url::Url;

const DEFAULT_QB_URL: &str = "http://localhost:8810";
const DEFAULT_QB_USER: &str = "admin";
/// Default timeout for a single HTTP request to QuickBuild (30 seconds).
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_RETRY_BACKOFF_MS: u64 = 1000;
/// Default bound for a whole tool call, retries included (120 seconds).
const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 120;
const DEFAULT_LOG_LEVEL: &str = "INFO";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("QB_PASSWORD environment variable is required")]
    MissingPassword,
    #[error("QB_URL is not a valid http(s) URL: {0}")]
    InvalidUrl(String),
    #[error("{name} must be {expected}, got {value:?}")]
    InvalidNumber {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub base_url: Url,
    pub username: String,
    pub password: String,
    pub request_timeout: Duration,
    pub max_retries: u32,
    pub retry_backoff: Duration,
    pub tool_timeout: Duration,
    pub log_level: String,
}

impl ServerConfig {
    /// Load configuration from the process environment.
    ///
    /// - `QB_URL` (optional, default `http://localhost:8810`)
    /// - `QB_USER` (optional, default `admin`)
    /// - `QB_PASSWORD` (required)
    /// - `QB_REQUEST_TIMEOUT_SECS` (optional, default 30)
    /// - `QB_MAX_RETRIES` (optional, default 3, at least 1)
    /// - `QB_RETRY_BACKOFF_MS` (optional, default 1000)
    /// - `QB_TOOL_TIMEOUT_SECS` (optional, default 120)
    /// - `LOG_LEVEL` (optional, default `INFO`)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw_url = lookup("QB_URL").unwrap_or_else(|| DEFAULT_QB_URL.to_string());
        let base_url = parse_base_url(&raw_url)?;

        let username = lookup("QB_USER").unwrap_or_else(|| DEFAULT_QB_USER.to_string());
        let password = lookup("QB_PASSWORD")
            .filter(|p| !p.is_empty())
            .ok_or(ConfigError::MissingPassword)?;

        let request_timeout_secs = parse_u64(
            &lookup,
            "QB_REQUEST_TIMEOUT_SECS",
            DEFAULT_REQUEST_TIMEOUT_SECS,
        )?;
        let retry_backoff_ms = parse_u64(&lookup, "QB_RETRY_BACKOFF_MS", DEFAULT_RETRY_BACKOFF_MS)?;
        let tool_timeout_secs =
            parse_u64(&lookup, "QB_TOOL_TIMEOUT_SECS", DEFAULT_TOOL_TIMEOUT_SECS)?;

        let max_retries = match lookup("QB_MAX_RETRIES") {
            Some(val) => match val.trim().parse::<u32>() {
                Ok(n) if n >= 1 => n,
                _ => {
                    return Err(ConfigError::InvalidNumber {
                        name: "QB_MAX_RETRIES",
                        expected: "an integer of at least 1",
                        value: val,
                    })
                }
            },
            None => DEFAULT_MAX_RETRIES,
        };

        Ok(Self {
            base_url,
            username,
            password,
            request_timeout: Duration::from_secs(request_timeout_secs),
            max_retries,
            retry_backoff: Duration::from_millis(retry_backoff_ms),
            tool_timeout: Duration::from_secs(tool_timeout_secs),
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
        })
    }
}

fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw.trim()).map_err(|e| ConfigError::InvalidUrl(format!("{raw}: {e}")))?;
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(ConfigError::InvalidUrl(format!("{raw}: unsupported scheme {other}"))),
    }
    if url.cannot_be_a_base() {
        return Err(ConfigError::InvalidUrl(raw.to_string()));
    }
    Ok(url)
}

fn parse_u64<F>(lookup: &F, name: &'static str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(val) => val.trim().parse::<u64>().map_err(|_| ConfigError::InvalidNumber {
            name,
            expected: "a non-negative integer",
            value: val,
        }),
        None => Ok(default),
    }
}
