//! Environment-driven configuration

use crate::types::{GpuScoutError, Result};
use std::time::Duration;

pub const VASTAI_API_KEY_ENV: &str = "VAST_API_KEY";
pub const RUNPOD_API_KEY_ENV: &str = "RUNPOD_API_KEY";

const VASTAI_URL_ENV: &str = "GPUSCOUT_VASTAI_URL";
const RUNPOD_URL_ENV: &str = "GPUSCOUT_RUNPOD_URL";
const TIMEOUT_ENV: &str = "GPUSCOUT_TIMEOUT_SECS";
const REFRESH_ENV: &str = "GPUSCOUT_REFRESH_SECS";
const MAX_BACKOFF_ENV: &str = "GPUSCOUT_MAX_BACKOFF_SECS";

pub const DEFAULT_VASTAI_URL: &str = "https://console.vast.ai/api/v0";
pub const DEFAULT_RUNPOD_URL: &str = "https://api.runpod.io";

/// Per-request and per-source timeout in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Scheduler interval in seconds (5 minutes)
const DEFAULT_REFRESH_SECS: u64 = 300;

/// Backoff ceiling in seconds (30 minutes)
const DEFAULT_MAX_BACKOFF_SECS: u64 = 1800;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub vastai_api_key: Option<String>,
    pub runpod_api_key: Option<String>,
    pub vastai_base_url: String,
    pub runpod_base_url: String,
    pub request_timeout: Duration,
    pub refresh_interval: Duration,
    pub max_backoff: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            vastai_api_key: None,
            runpod_api_key: None,
            vastai_base_url: DEFAULT_VASTAI_URL.to_string(),
            runpod_base_url: DEFAULT_RUNPOD_URL.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            refresh_interval: Duration::from_secs(DEFAULT_REFRESH_SECS),
            max_backoff: Duration::from_secs(DEFAULT_MAX_BACKOFF_SECS),
        }
    }
}

impl Config {
    /// Load from process environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary variable lookup (for testing)
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let value = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        Ok(Self {
            vastai_api_key: value(VASTAI_API_KEY_ENV),
            runpod_api_key: value(RUNPOD_API_KEY_ENV),
            vastai_base_url: value(VASTAI_URL_ENV).unwrap_or(defaults.vastai_base_url),
            runpod_base_url: value(RUNPOD_URL_ENV).unwrap_or(defaults.runpod_base_url),
            request_timeout: parse_secs(TIMEOUT_ENV, value(TIMEOUT_ENV))?
                .unwrap_or(defaults.request_timeout),
            refresh_interval: parse_secs(REFRESH_ENV, value(REFRESH_ENV))?
                .unwrap_or(defaults.refresh_interval),
            max_backoff: parse_secs(MAX_BACKOFF_ENV, value(MAX_BACKOFF_ENV))?
                .unwrap_or(defaults.max_backoff),
        })
    }

    pub fn configured_sources(&self) -> usize {
        [&self.vastai_api_key, &self.runpod_api_key]
            .iter()
            .filter(|k| k.is_some())
            .count()
    }
}

fn parse_secs(key: &str, raw: Option<String>) -> Result<Option<Duration>> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let secs: u64 = raw.parse().map_err(|_| {
        GpuScoutError::Config(format!(
            "{} must be a whole number of seconds, got {:?}",
            key, raw
        ))
    })?;
    if secs == 0 {
        return Err(GpuScoutError::Config(format!("{} must be positive", key)));
    }
    Ok(Some(Duration::from_secs(secs)))
}
