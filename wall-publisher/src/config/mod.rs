//! Application configuration.
//!
//! Loaded from a TOML file; every section and field has a default, so a
//! partial file is enough. A few deployment-specific values can be overridden
//! from the environment (see [`AppConfig::apply_env_overrides`]).

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::credentials::{BootstrapPolicy, DEFAULT_COOKIE_DOMAIN, SessionPolicy};
use crate::logging::{DEFAULT_LOG_FILTER, DEFAULT_RETENTION_DAYS};
use crate::publisher::{RetryPolicy, WorkerPoolConfig};
use crate::{Error, Result};

pub const ENV_DATABASE_URL: &str = "WALL_DATABASE_URL";
pub const ENV_GATEWAY_URL: &str = "WALL_GATEWAY_URL";
pub const ENV_RENDER_URL: &str = "WALL_RENDER_URL";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub worker: WorkerConfig,
    pub session: SessionConfig,
    pub bootstrap: BootstrapConfig,
    pub bots: BotsConfig,
    pub render: RenderConfig,
    pub wall: WallConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite URL, e.g. `sqlite:wall.db?mode=rwc`.
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:wall.db?mode=rwc".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub filter: String,
    /// Directory for rotated log files; console only when unset.
    pub dir: Option<String>,
    pub retention_days: i64,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
            dir: Some("logs".to_string()),
            retention_days: DEFAULT_RETENTION_DAYS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub workers: usize,
    pub poll_interval_ms: u64,
    /// Minimum spacing between successful publishes.
    pub rate_limit_secs: u64,
    pub retry_count: u32,
    pub retry_delay_secs: u64,
    /// A claim older than this is handed out again.
    pub claim_ttl_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            poll_interval_ms: 5_000,
            rate_limit_secs: 30,
            retry_count: 2,
            retry_delay_secs: 5,
            claim_ttl_secs: 600,
        }
    }
}

impl WorkerConfig {
    pub fn pool_config(&self) -> WorkerPoolConfig {
        WorkerPoolConfig {
            workers: self.workers,
            poll_interval_ms: self.poll_interval_ms,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            retry_count: self.retry_count,
            retry_delay: Duration::from_secs(self.retry_delay_secs),
        }
    }

    pub fn rate_limit(&self) -> Duration {
        Duration::from_secs(self.rate_limit_secs)
    }

    pub fn claim_ttl(&self) -> Duration {
        Duration::from_secs(self.claim_ttl_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Base URL of the publish gateway.
    pub gateway_url: String,
    pub timeout_secs: u64,
    pub max_retry: u32,
    /// Keep-alive check interval; `0` disables the monitor.
    pub keep_alive_secs: u64,
    pub cookie_domain: String,
    pub startup_recheck_delay_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            gateway_url: "http://127.0.0.1:8090".to_string(),
            timeout_secs: 30,
            max_retry: 2,
            keep_alive_secs: 600,
            cookie_domain: DEFAULT_COOKIE_DOMAIN.to_string(),
            startup_recheck_delay_ms: 500,
        }
    }
}

impl SessionConfig {
    pub fn policy(&self) -> SessionPolicy {
        SessionPolicy {
            timeout: Duration::from_secs(self.timeout_secs),
            max_retry: self.max_retry,
        }
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    pub warmup_secs: u64,
    pub bot_attempts: u32,
    pub bot_retry_delay_ms: u64,
    pub qr_poll_interval_secs: u64,
    pub qr_max_polls: u32,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            warmup_secs: 2,
            bot_attempts: 5,
            bot_retry_delay_ms: 1_000,
            qr_poll_interval_secs: 2,
            qr_max_polls: 120,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BotEndpointConfig {
    /// OneBot v11 HTTP API base URL.
    pub url: String,
    pub access_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotsConfig {
    pub endpoints: Vec<BotEndpointConfig>,
    /// Group receiving operator alerts; `0` disables them.
    pub manage_group: i64,
    pub probe_interval_secs: u64,
    pub timeout_secs: u64,
}

impl Default for BotsConfig {
    fn default() -> Self {
        Self {
            endpoints: vec![BotEndpointConfig {
                url: "http://127.0.0.1:3000".to_string(),
                access_token: None,
            }],
            manage_group: 0,
            probe_interval_secs: 10,
            timeout_secs: 10,
        }
    }
}

impl BotsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Render service URL; publishing fails while unset.
    pub url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WallConfig {
    /// Prefix non-anonymous posts with the author's name.
    pub show_author: bool,
}

/// Result of [`AppConfig::load_or_init`].
#[derive(Debug)]
pub enum LoadOutcome {
    Loaded(Box<AppConfig>),
    /// No file existed; a default one was written at this path.
    Created,
}

impl AppConfig {
    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| Error::config(format!("invalid config: {e}")))
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::config(format!("cannot serialize config: {e}")))
    }

    /// Read `path`, or write a default file there when it does not exist.
    pub fn load_or_init(path: &Path) -> Result<LoadOutcome> {
        if !path.exists() {
            write_default(path)?;
            return Ok(LoadOutcome::Created);
        }
        let raw = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml(&raw)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(LoadOutcome::Loaded(Box::new(config)))
    }

    /// Override deployment-specific values; `lookup` is usually `std::env::var`.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(url) = non_empty(ENV_DATABASE_URL) {
            self.database.url = url;
        }
        if let Some(url) = non_empty(ENV_GATEWAY_URL) {
            self.session.gateway_url = url;
        }
        if let Some(url) = non_empty(ENV_RENDER_URL) {
            self.render.url = Some(url);
        }
    }

    /// Bootstrap schedule; the startup re-check delay lives under `[session]`.
    pub fn bootstrap_policy(&self) -> BootstrapPolicy {
        BootstrapPolicy {
            warmup: Duration::from_secs(self.bootstrap.warmup_secs),
            bot_attempts: self.bootstrap.bot_attempts.max(1),
            bot_retry_delay: Duration::from_millis(self.bootstrap.bot_retry_delay_ms),
            startup_recheck_delay: Duration::from_millis(self.session.startup_recheck_delay_ms),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.worker.workers == 0 {
            return Err(Error::config("worker.workers must be at least 1"));
        }
        if self.worker.poll_interval_ms == 0 {
            return Err(Error::config("worker.poll_interval_ms must be positive"));
        }
        if self.database.url.trim().is_empty() {
            return Err(Error::config("database.url must be set"));
        }
        if self.session.gateway_url.trim().is_empty() {
            return Err(Error::config("session.gateway_url must be set"));
        }
        if self.bots.endpoints.iter().any(|e| e.url.trim().is_empty()) {
            return Err(Error::config("bots.endpoints entries need a url"));
        }
        let min_claim_ttl = self.min_claim_ttl();
        if self.worker.claim_ttl() <= min_claim_ttl {
            return Err(Error::config(format!(
                "worker.claim_ttl_secs must exceed {}s, the longest a worker can go without renewing its claim",
                min_claim_ttl.as_secs()
            )));
        }
        Ok(())
    }

    /// Worst-case gap between two claim renewals of one submission.
    ///
    /// Claims are renewed once the rate-limit permit is held. Between two
    /// renewals a worker spends one attempt and the retry delay, then waits
    /// for the permit behind every other worker's attempt.
    pub fn min_claim_ttl(&self) -> Duration {
        let attempt = self.render.timeout_secs
            + self.session.timeout_secs * (u64::from(self.session.max_retry) + 1);
        let others = self.worker.workers.saturating_sub(1) as u64;
        let secs = attempt
            + self.worker.retry_delay_secs
            + others * (self.worker.rate_limit_secs + attempt)
            + self.worker.rate_limit_secs;
        Duration::from_secs(secs)
    }
}

const DEFAULT_HEADER: &str = "\
# wall-publisher configuration.
# Edit the values below, then start wall-publisher again.
# WALL_DATABASE_URL, WALL_GATEWAY_URL and WALL_RENDER_URL override the
# matching settings when set.

";

fn write_default(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let body = AppConfig::default().to_toml()?;
    std::fs::write(path, format!("{DEFAULT_HEADER}{body}"))?;
    Ok(())
}
