//! Connection configuration
//!
//! Process-wide model server address and per-call timeout. Every transport
//! call reads a snapshot when it starts, so changes never reach in-flight
//! requests.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{ManagerError, Result};

pub const DEFAULT_HOST: &str = "http://localhost:11434";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_TIMEOUT_MS: u64 = DEFAULT_TIMEOUT_SECS * 1000;

const HOST_ENV: &str = "OLLAMA_HOST";
const TIMEOUT_ENV: &str = "OLLAMA_MANAGER_TIMEOUT_SECS";

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionSettings {
    pub host: String,
    /// Unary calls must finish within this; streaming calls must see headers
    /// and then each body chunk within it.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl ConnectionSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

/// Shared handle; clones see the same settings.
#[derive(Debug, Clone, Default)]
pub struct ConnectionConfig {
    inner: Arc<RwLock<ConnectionSettings>>,
}

impl ConnectionConfig {
    pub fn new(host: &str) -> Result<Self> {
        let config = Self::default();
        config.set_host(host)?;
        Ok(config)
    }

    pub fn from_settings(settings: ConnectionSettings) -> Result<Self> {
        let host = normalize_host(&settings.host)?;
        Ok(Self {
            inner: Arc::new(RwLock::new(ConnectionSettings { host, ..settings })),
        })
    }

    /// Reads `OLLAMA_HOST` and `OLLAMA_MANAGER_TIMEOUT_SECS`, falling back to
    /// the defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        let mut settings = ConnectionSettings::default();
        if let Ok(host) = std::env::var(HOST_ENV) {
            if !host.trim().is_empty() {
                settings.host = host;
            }
        }
        if let Ok(raw) = std::env::var(TIMEOUT_ENV) {
            let timeout = raw
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
                .ok_or_else(|| {
                    ManagerError::InvalidArgument(format!("{TIMEOUT_ENV} must be seconds, got {raw:?}"))
                })?;
            settings.timeout_ms = millis(timeout);
        }
        Self::from_settings(settings)
    }

    pub fn snapshot(&self) -> ConnectionSettings {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn host(&self) -> String {
        self.snapshot().host
    }

    pub fn set_host(&self, host: &str) -> Result<()> {
        let host = normalize_host(host)?;
        info!(%host, "Model server host reconfigured");
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .host = host;
        Ok(())
    }

    /// Kept at millisecond precision, never below one millisecond.
    pub fn set_timeout(&self, timeout: Duration) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .timeout_ms = millis(timeout);
    }
}

fn millis(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX).max(1)
}

/// Accepts `host:port` shorthand the way the Ollama CLI does.
fn normalize_host(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ManagerError::InvalidArgument("host must not be empty".into()));
    }
    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    };
    let url = Url::parse(&candidate)
        .map_err(|e| ManagerError::InvalidArgument(format!("invalid host {raw:?}: {e}")))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ManagerError::InvalidArgument(format!(
            "unsupported scheme {:?} in host {raw:?}",
            url.scheme()
        )));
    }
    Ok(candidate.trim_end_matches('/').to_string())
}
