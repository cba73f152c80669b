//! Service configuration.
//!
//! Everything is read from environment variables (a `.env` file is loaded
//! first by `main`), falling back to defaults suited to a local deployment
//! next to the request server.

use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::api::server::ApiServerConfig;
use crate::media::MediaTools;
use crate::pipeline::{EngineConfig, PriorityWindow};
use crate::{Error, Result};

/// Default request server base URL (share lookups and status updates).
pub const DEFAULT_REQUEST_SERVER_URL: &str = "http://127.0.0.1:7799";

/// Default log directory.
pub const DEFAULT_LOG_DIR: &str = "logs";

fn default_request_server_url() -> String {
    DEFAULT_REQUEST_SERVER_URL.to_string()
}

fn default_http_timeout() -> u64 {
    30
}

fn default_log_dir() -> String {
    DEFAULT_LOG_DIR.to_string()
}

/// Top-level service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP listener for the submission API.
    #[serde(default)]
    pub api: ApiServerConfig,
    /// Scheduler settings.
    #[serde(default)]
    pub engine: EngineConfig,
    /// External media tools.
    #[serde(default)]
    pub tools: MediaTools,
    /// Base URL of the request server.
    #[serde(default = "default_request_server_url")]
    pub request_server_url: String,
    /// Timeout for calls to the request server, in seconds.
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,
    /// Directory for rolling log files.
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api: ApiServerConfig::default(),
            engine: EngineConfig::default(),
            tools: MediaTools::default(),
            request_server_url: default_request_server_url(),
            http_timeout_secs: default_http_timeout(),
            log_dir: default_log_dir(),
        }
    }
}

impl AppConfig {
    /// Load the configuration from environment variables.
    ///
    /// Supported env vars:
    /// - `TASKD_BIND_ADDRESS`, `TASKD_PORT`
    /// - `TASKD_REQUEST_SERVER_URL`, `TASKD_HTTP_TIMEOUT_SECS`
    /// - `TASKD_MAX_CONCURRENT_TASKS`, `TASKD_SHUTDOWN_GRACE_SECS`
    /// - `TASKD_PRIORITY_HIGHEST`, `TASKD_PRIORITY_DEFAULT`, `TASKD_PRIORITY_LOWEST`
    /// - `FFMPEG_PATH`, `FFPROBE_PATH`
    /// - `TASKD_LOG_DIR`
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load the configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(bind_address) = get("TASKD_BIND_ADDRESS") {
            config.api.bind_address = bind_address;
        }
        if let Some(port) = parse_var(&get, "TASKD_PORT")? {
            config.api.port = port;
        }
        if let Some(url) = get("TASKD_REQUEST_SERVER_URL") {
            config.request_server_url = url.trim_end_matches('/').to_string();
        }
        if let Some(timeout) = parse_var(&get, "TASKD_HTTP_TIMEOUT_SECS")? {
            config.http_timeout_secs = timeout;
        }
        if let Some(max) = parse_var(&get, "TASKD_MAX_CONCURRENT_TASKS")? {
            config.engine.max_concurrent_tasks = max;
        }
        if let Some(grace) = parse_var(&get, "TASKD_SHUTDOWN_GRACE_SECS")? {
            config.engine.shutdown_grace_secs = grace;
        }
        if let Some(highest) = parse_var(&get, "TASKD_PRIORITY_HIGHEST")? {
            config.engine.priority.highest = highest;
        }
        if let Some(default) = parse_var(&get, "TASKD_PRIORITY_DEFAULT")? {
            config.engine.priority.default = default;
        }
        if let Some(lowest) = parse_var(&get, "TASKD_PRIORITY_LOWEST")? {
            config.engine.priority.lowest = lowest;
        }
        if let Some(ffmpeg) = get("FFMPEG_PATH") {
            config.tools.ffmpeg = PathBuf::from(ffmpeg);
        }
        if let Some(ffprobe) = get("FFPROBE_PATH") {
            config.tools.ffprobe = PathBuf::from(ffprobe);
        }
        if let Some(log_dir) = get("TASKD_LOG_DIR") {
            config.log_dir = log_dir;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        if self.engine.max_concurrent_tasks == 0 {
            return Err(Error::config("max_concurrent_tasks must be at least 1"));
        }

        let PriorityWindow {
            highest,
            default,
            lowest,
        } = self.engine.priority;
        if highest > default || default > lowest {
            return Err(Error::config(format!(
                "priority window must satisfy highest <= default <= lowest (got {highest}, {default}, {lowest})"
            )));
        }

        if !self.request_server_url.starts_with("http://")
            && !self.request_server_url.starts_with("https://")
        {
            return Err(Error::config(format!(
                "request server URL must be http(s): {}",
                self.request_server_url
            )));
        }

        Ok(())
    }
}

fn parse_var<T, G>(get: &G, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| Error::config(format!("invalid value for {key} ({raw:?}): {e}"))),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<AppConfig> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.api.bind_address, "127.0.0.1");
        assert_eq!(config.api.port, 7798);
        assert_eq!(config.request_server_url, DEFAULT_REQUEST_SERVER_URL);
        assert_eq!(config.engine.max_concurrent_tasks, 3);
        assert_eq!(config.engine.priority, PriorityWindow::default());
        assert_eq!(config.tools.ffmpeg, PathBuf::from("ffmpeg"));
        assert_eq!(config.log_dir, DEFAULT_LOG_DIR);
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("TASKD_PORT", "9000"),
            ("TASKD_MAX_CONCURRENT_TASKS", "8"),
            ("TASKD_REQUEST_SERVER_URL", "http://10.0.0.5:7799/"),
            ("FFMPEG_PATH", "/opt/ffmpeg/bin/ffmpeg"),
            ("TASKD_PRIORITY_LOWEST", "20"),
        ])
        .unwrap();

        assert_eq!(config.api.port, 9000);
        assert_eq!(config.engine.max_concurrent_tasks, 8);
        assert_eq!(config.request_server_url, "http://10.0.0.5:7799");
        assert_eq!(config.tools.ffmpeg, PathBuf::from("/opt/ffmpeg/bin/ffmpeg"));
        assert_eq!(config.engine.priority.lowest, 20);
    }

    #[test]
    fn test_blank_values_are_ignored() {
        let config = load(&[("TASKD_PORT", "  ")]).unwrap();
        assert_eq!(config.api.port, 7798);
    }

    #[test]
    fn test_invalid_number() {
        let err = load(&[("TASKD_PORT", "not-a-port")]).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_invalid_priority_window() {
        let err = load(&[("TASKD_PRIORITY_DEFAULT", "11")]).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        assert!(load(&[("TASKD_MAX_CONCURRENT_TASKS", "0")]).is_err());
    }
}
