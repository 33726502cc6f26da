//! Configuration loading and reconciliation
//!
//! Raw configs arrive as loosely typed JSON objects (from a file, or pushed
//! by the host). [`reconcile`] turns them into a [`DeviceConfig`] snapshot,
//! and [`ConfigAdapter`] retries a not-yet-ready config transport with
//! exponential backoff before handing snapshots to the poller.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use miao_transport::types::{DEFAULT_POLL_INTERVAL_SECS, MIN_POLL_INTERVAL_SECS};
use miao_transport::{parse_usb_id, DeviceConfig};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::poller::PollerHandle;

/// First retry delay
pub const BACKOFF_BASE_MS: u64 = 1000;
/// Retry delay cap
pub const BACKOFF_MAX_MS: u64 = 10_000;

pub type RawConfig = Value;

#[derive(Debug, Error)]
pub enum ConfigError {
    /// The channel used to fetch configuration is not established yet
    #[error("config transport not ready")]
    TransportNotReady,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    /// Only a missing transport is worth retrying
    pub fn is_transient(&self) -> bool {
        matches!(self, ConfigError::TransportNotReady)
    }
}

/// Where raw configs come from
#[async_trait]
pub trait ConfigSource: Send + Sync {
    async fn fetch(&self) -> Result<RawConfig, ConfigError>;
}

/// TOML config file; a missing file means "all defaults"
pub struct FileConfigSource {
    path: PathBuf,
}

impl FileConfigSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `~/.config/miao-battery/config.toml`
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("miao-battery")
            .join("config.toml")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ConfigSource for FileConfigSource {
    async fn fetch(&self) -> Result<RawConfig, ConfigError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No config at {}, using defaults", self.path.display());
                return Ok(Value::Object(Map::new()));
            }
            Err(e) => return Err(e.into()),
        };
        let table: toml::Value = toml::from_str(&content)?;
        serde_json::to_value(table).map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}

/// Look up a field by its camelCase or snake_case name
fn field<'a>(raw: &'a RawConfig, camel: &str, snake: &str) -> Option<&'a Value> {
    raw.get(camel)
        .or_else(|| raw.get(snake))
        .filter(|v| !v.is_null())
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn usb_id(raw: &RawConfig, camel: &str, snake: &str) -> Option<u16> {
    let value = field(raw, camel, snake)?;
    let parsed = match value {
        Value::Number(n) => n
            .as_u64()
            .and_then(|n| u16::try_from(n).ok())
            .ok_or_else(|| format!("{n} is not a USB id")),
        Value::String(s) if s.trim().is_empty() => return None,
        Value::String(s) => parse_usb_id(s),
        other => Err(format!("unexpected value {other}")),
    };
    match parsed {
        Ok(id) => Some(id),
        Err(e) => {
            warn!("Ignoring {}: {}", camel, e);
            None
        }
    }
}

/// Build a config snapshot from a raw object
///
/// Missing or malformed values fall back to defaults. The poll interval is
/// floored at 5 seconds and the retry count raised to at least 1.
pub fn reconcile(raw: &RawConfig) -> DeviceConfig {
    let defaults = DeviceConfig::default();

    let hid_path = field(raw, "hidPath", "hid_path")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string);

    let poll_interval_seconds = field(raw, "pollIntervalSeconds", "poll_interval_seconds")
        .and_then(as_number)
        .filter(|secs| secs.is_finite() && *secs > 0.0)
        .map(|secs| secs.max(MIN_POLL_INTERVAL_SECS))
        .unwrap_or(DEFAULT_POLL_INTERVAL_SECS);

    let init_delay_ms = field(raw, "initDelayMs", "init_delay_ms")
        .and_then(as_number)
        .filter(|ms| ms.is_finite() && *ms >= 0.0)
        .map(|ms| ms.round() as u64)
        .unwrap_or(defaults.init_delay_ms);

    let retry_count = field(raw, "retryCount", "retry_count")
        .and_then(as_number)
        .filter(|n| n.is_finite())
        .map(|n| n.floor().clamp(1.0, u32::MAX as f64) as u32)
        .unwrap_or(defaults.retry_count);

    DeviceConfig {
        hid_path,
        vendor_id: usb_id(raw, "vendorId", "vendor_id"),
        product_id: usb_id(raw, "productId", "product_id"),
        poll_interval_seconds,
        init_delay_ms,
        retry_count,
    }
}

/// Delay before retry number `attempt` (0-based): `min(1s × 2^attempt, 10s)`
pub fn backoff_delay(attempt: u32) -> Duration {
    let factor = 2u64.saturating_pow(attempt);
    Duration::from_millis(BACKOFF_BASE_MS.saturating_mul(factor).min(BACKOFF_MAX_MS))
}

/// Retry timer state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffState {
    Idle,
    Waiting { attempt: u32, deadline: Instant },
}

/// Result of one load attempt
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    Loaded(DeviceConfig),
    /// Transport not ready; retry scheduled after `delay`
    Retrying { attempt: u32, delay: Duration },
    /// Non-transient failure; defaults apply
    Defaulted(DeviceConfig),
}

impl LoadOutcome {
    fn into_config(self) -> Option<DeviceConfig> {
        match self {
            LoadOutcome::Loaded(config) | LoadOutcome::Defaulted(config) => Some(config),
            LoadOutcome::Retrying { .. } => None,
        }
    }
}

/// Events delivered to a running [`ConfigAdapter`]
#[derive(Debug, Clone)]
pub enum ConfigUpdate {
    /// Host pushed a new raw config; supersedes any pending retry
    Pushed(RawConfig),
    /// Fetch again from the source (e.g. on SIGHUP)
    Reload,
}

pub struct ConfigAdapter<C: ConfigSource> {
    source: C,
    state: BackoffState,
    next_attempt: u32,
}

impl<C: ConfigSource> ConfigAdapter<C> {
    pub fn new(source: C) -> Self {
        Self {
            source,
            state: BackoffState::Idle,
            next_attempt: 0,
        }
    }

    pub fn state(&self) -> BackoffState {
        self.state
    }

    /// Back to `Idle` with the attempt counter cleared
    pub fn reset(&mut self) {
        self.state = BackoffState::Idle;
        self.next_attempt = 0;
    }

    /// Fetch once and update the backoff state
    pub async fn load_once(&mut self) -> LoadOutcome {
        match self.source.fetch().await {
            Ok(raw) => {
                self.reset();
                let config = reconcile(&raw);
                debug!("Loaded config {:?}", config);
                LoadOutcome::Loaded(config)
            }
            Err(e) if e.is_transient() => {
                let attempt = self.next_attempt;
                let delay = backoff_delay(attempt);
                self.state = BackoffState::Waiting {
                    attempt,
                    deadline: Instant::now() + delay,
                };
                self.next_attempt = attempt.saturating_add(1);
                info!("Config not ready, retry #{} in {:?}", attempt + 1, delay);
                LoadOutcome::Retrying { attempt, delay }
            }
            Err(e) => {
                warn!("Config load failed ({}), using defaults", e);
                self.reset();
                LoadOutcome::Defaulted(DeviceConfig::default())
            }
        }
    }

    /// Reconcile a pushed config, cancelling any pending retry
    pub fn on_pushed(&mut self, raw: &RawConfig) -> DeviceConfig {
        self.reset();
        reconcile(raw)
    }

    /// Load at startup, then follow updates until the channel closes
    pub async fn run(
        mut self,
        mut updates: mpsc::UnboundedReceiver<ConfigUpdate>,
        poller: PollerHandle,
    ) {
        if let Some(config) = self.load_once().await.into_config() {
            poller.update_config(config);
        }

        let mut updates_open = true;
        loop {
            let deadline = match self.state {
                BackoffState::Waiting { deadline, .. } => Some(deadline),
                BackoffState::Idle if !updates_open => break,
                BackoffState::Idle => None,
            };

            tokio::select! {
                update = updates.recv(), if updates_open => match update {
                    Some(ConfigUpdate::Pushed(raw)) => {
                        info!("Config update received");
                        poller.update_config(self.on_pushed(&raw));
                    }
                    Some(ConfigUpdate::Reload) => {
                        info!("Reloading config");
                        if let Some(config) = self.load_once().await.into_config() {
                            poller.update_config(config);
                        }
                    }
                    None => updates_open = false,
                },
                _ = sleep_until(deadline) => {
                    if let Some(config) = self.load_once().await.into_config() {
                        poller.update_config(config);
                    }
                }
            }
        }

        debug!("Config adapter stopped");
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
