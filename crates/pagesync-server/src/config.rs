//! Server configuration and its loader.
//!
//! Loading flow:
//! 1. Start with compiled [`ServerConfig::default()`]
//! 2. If a JSON config file is given and exists, deep-merge it over the defaults
//! 3. Apply `PAGESYNC_*` environment variable overrides (highest priority)

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

/// Config loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config value: {0}")]
    Invalid(String),
}

/// Tracing output format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Configuration for the pagesync server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind, `0` for auto-assign.
    pub port: u16,
    /// Route path of the WebSocket namespace.
    pub namespace: String,
    /// Outbound frames buffered per connection before sends are dropped.
    pub max_send_queue: usize,
    pub heartbeat_interval_secs: u64,
    /// Clients silent for longer than this are removed.
    pub client_timeout_secs: u64,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Decoded inbound messages buffered per connection ahead of dispatch.
    pub dispatch_queue: usize,
    /// Grace period for dispatching already-read messages after a disconnect
    /// or during shutdown.
    pub drain_timeout_secs: u64,
    pub log_format: LogFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 9847,
            namespace: "/pagesync".into(),
            max_send_queue: 256,
            heartbeat_interval_secs: 30,
            client_timeout_secs: 90,
            max_message_size: 1024 * 1024,
            dispatch_queue: 64,
            drain_timeout_secs: 5,
            log_format: LogFormat::Pretty,
        }
    }
}

impl ServerConfig {
    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.namespace.starts_with('/') || self.namespace.len() < 2 {
            return Err(ConfigError::Invalid(format!(
                "namespace must be a non-root path starting with '/', got {:?}",
                self.namespace
            )));
        }
        if matches!(self.namespace.as_str(), "/health" | "/metrics") {
            return Err(ConfigError::Invalid(format!(
                "namespace {:?} collides with a built-in route",
                self.namespace
            )));
        }
        if self.max_send_queue == 0 || self.dispatch_queue == 0 {
            return Err(ConfigError::Invalid("queue sizes must be non-zero".into()));
        }
        if self.heartbeat_interval_secs == 0 {
            return Err(ConfigError::Invalid("heartbeat interval must be non-zero".into()));
        }
        if self.client_timeout_secs <= self.heartbeat_interval_secs {
            return Err(ConfigError::Invalid(
                "client timeout must exceed the heartbeat interval".into(),
            ));
        }
        Ok(())
    }
}

/// Load config from an optional JSON file plus environment overrides.
///
/// A missing file yields the defaults; invalid JSON is an error.
pub fn load_config(path: Option<&Path>) -> Result<ServerConfig, ConfigError> {
    load_config_with(path, |name| std::env::var(name).ok())
}

/// [`load_config`] with an injectable environment lookup.
pub fn load_config_with(
    path: Option<&Path>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<ServerConfig, ConfigError> {
    let defaults = serde_json::to_value(ServerConfig::default())?;

    let merged = match path {
        Some(path) if path.exists() => {
            debug!(?path, "loading config from file");
            let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            let user: Value = serde_json::from_str(&content)?;
            deep_merge(defaults, user)
        }
        Some(path) => {
            debug!(?path, "config file not found, using defaults");
            defaults
        }
        None => defaults,
    };

    let mut config: ServerConfig = serde_json::from_value(merged)?;
    apply_env_overrides(&mut config, env);
    config.validate()?;
    Ok(config)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `PAGESYNC_*` overrides. Invalid values are ignored with a warning.
pub fn apply_env_overrides(config: &mut ServerConfig, env: impl Fn(&str) -> Option<String>) {
    let read = |name: &str| env(name).filter(|v| !v.is_empty());

    if let Some(v) = read("PAGESYNC_HOST") {
        config.host = v;
    }
    if let Some(v) = read("PAGESYNC_PORT") {
        match parse_u16_range(&v, 0, 65535) {
            Some(port) => config.port = port,
            None => warn!(key = "PAGESYNC_PORT", value = %v, "invalid u16 env var, ignoring"),
        }
    }
    if let Some(v) = read("PAGESYNC_NAMESPACE") {
        config.namespace = v;
    }
    if let Some(v) = read("PAGESYNC_MAX_SEND_QUEUE") {
        match parse_usize_range(&v, 1, 1_000_000) {
            Some(n) => config.max_send_queue = n,
            None => warn!(key = "PAGESYNC_MAX_SEND_QUEUE", value = %v, "invalid usize env var, ignoring"),
        }
    }
    if let Some(v) = read("PAGESYNC_HEARTBEAT_INTERVAL") {
        match parse_u64_range(&v, 1, 3600) {
            Some(n) => config.heartbeat_interval_secs = n,
            None => warn!(key = "PAGESYNC_HEARTBEAT_INTERVAL", value = %v, "invalid u64 env var, ignoring"),
        }
    }
    if let Some(v) = read("PAGESYNC_LOG_FORMAT") {
        match parse_log_format(&v) {
            Some(format) => config.log_format = format,
            None => warn!(key = "PAGESYNC_LOG_FORMAT", value = %v, "invalid log format, ignoring"),
        }
    }
}

pub fn parse_log_format(val: &str) -> Option<LogFormat> {
    match val.to_lowercase().as_str() {
        "pretty" => Some(LogFormat::Pretty),
        "json" => Some(LogFormat::Json),
        _ => None,
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}
