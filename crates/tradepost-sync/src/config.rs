//! # Application Configuration
//!
//! Configuration for the marketplace mirror.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     TRADEPOST_API_URL=https://api.example-market.com/api/v2            │
//! │     TRADEPOST_DAILY_AT=04:30                                           │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/tradepost/tradepost.toml (Linux)                         │
//! │     ~/Library/Application Support/com.tradepost.tradepost/ (macOS)     │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [marketplace]
//! base_url = "https://api.example-market.com/api/v2"
//! api_token = "..."
//!
//! [resilience]
//! timeout_secs = 30
//! max_retries = 3
//! initial_backoff_secs = 2
//! backoff_multiplier = 2.0
//! breaker_failure_threshold = 5
//! breaker_open_secs = 30
//!
//! [scheduler]
//! enabled = true
//! daily_at = "03:00"
//!
//! [webhook]
//! secret = "..."
//! apply_test_events = false
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Marketplace Settings
// =============================================================================

/// Where and how to reach the marketplace API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketplaceSettings {
    /// API root; endpoint paths are appended to it.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Bearer token for the seller account.
    #[serde(default)]
    pub api_token: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_base_url() -> String {
    "https://api.cardtrader.com/api/v2".to_string()
}

fn default_user_agent() -> String {
    format!("tradepost/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for MarketplaceSettings {
    fn default() -> Self {
        MarketplaceSettings {
            base_url: default_base_url(),
            api_token: String::new(),
            user_agent: default_user_agent(),
        }
    }
}

impl MarketplaceSettings {
    /// Parses `base_url`, forcing a trailing slash so relative joins keep
    /// the path prefix.
    pub fn parsed_base_url(&self) -> SyncResult<Url> {
        let mut raw = self.base_url.trim().to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        let url = Url::parse(&raw)?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(SyncError::InvalidUrl(format!(
                "Marketplace URL must use http or https, got: {}",
                other
            ))),
        }
    }
}

// =============================================================================
// Resilience Settings
// =============================================================================

/// Timeout, retry and circuit breaker parameters for outbound calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResilienceSettings {
    /// Per-attempt timeout.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Retries after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_secs: u64,

    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Consecutive failed calls that open an endpoint's circuit.
    #[serde(default = "default_breaker_threshold")]
    pub breaker_failure_threshold: u32,

    /// How long an open circuit rejects calls.
    #[serde(default = "default_breaker_open")]
    pub breaker_open_secs: u64,
}

fn default_timeout() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}
fn default_initial_backoff() -> u64 {
    2
}
fn default_backoff_multiplier() -> f64 {
    2.0
}
fn default_breaker_threshold() -> u32 {
    5
}
fn default_breaker_open() -> u64 {
    30
}

impl Default for ResilienceSettings {
    fn default() -> Self {
        ResilienceSettings {
            timeout_secs: default_timeout(),
            max_retries: default_max_retries(),
            initial_backoff_secs: default_initial_backoff(),
            backoff_multiplier: default_backoff_multiplier(),
            breaker_failure_threshold: default_breaker_threshold(),
            breaker_open_secs: default_breaker_open(),
        }
    }
}

impl ResilienceSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_secs(self.initial_backoff_secs)
    }

    pub fn breaker_open(&self) -> Duration {
        Duration::from_secs(self.breaker_open_secs)
    }
}

// =============================================================================
// Scheduler Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Local wall-clock time of the daily inventory sync, `HH:MM`.
    #[serde(default = "default_daily_at")]
    pub daily_at: String,

    /// Pause after a failed scheduled run before computing the next one.
    #[serde(default = "default_error_cooldown")]
    pub error_cooldown_secs: u64,
}

fn default_true() -> bool {
    true
}
fn default_daily_at() -> String {
    "03:00".to_string()
}
fn default_error_cooldown() -> u64 {
    300
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        SchedulerSettings {
            enabled: true,
            daily_at: default_daily_at(),
            error_cooldown_secs: default_error_cooldown(),
        }
    }
}

impl SchedulerSettings {
    pub fn error_cooldown(&self) -> Duration {
        Duration::from_secs(self.error_cooldown_secs)
    }
}

// =============================================================================
// Webhook Settings
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookSettings {
    /// Shared secret for the `Signature` header. Required.
    #[serde(default)]
    pub secret: String,

    /// Apply deliveries flagged `mode = "test"` instead of only logging them.
    #[serde(default)]
    pub apply_test_events: bool,
}

// =============================================================================
// Database Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file. Defaults to `tradepost.db` in the platform data dir.
    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: None,
            max_connections: default_max_connections(),
        }
    }
}

impl DatabaseSettings {
    /// Returns the configured path or the platform default.
    pub fn resolved_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(|| {
            project_dirs()
                .map(|dirs| dirs.data_dir().join("tradepost.db"))
                .unwrap_or_else(|| PathBuf::from("tradepost.db"))
        })
    }
}

// =============================================================================
// Server Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}

impl Default for ServerSettings {
    fn default() -> Self {
        ServerSettings {
            bind_addr: default_bind_addr(),
            port: default_port(),
        }
    }
}

impl ServerSettings {
    /// Returns the full bind address.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

// =============================================================================
// Logging Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Default filter directive; `RUST_LOG` wins when set.
    #[serde(default = "default_level")]
    pub level: String,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        LoggingSettings {
            level: default_level(),
        }
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub marketplace: MarketplaceSettings,

    #[serde(default)]
    pub resilience: ResilienceSettings,

    #[serde(default)]
    pub scheduler: SchedulerSettings,

    #[serde(default)]
    pub webhook: WebhookSettings,

    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}

impl AppConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (tradepost.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents).map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;

        info!(?path, "Config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        self.marketplace.parsed_base_url()?;

        tradepost_core::validation::parse_daily_time(&self.scheduler.daily_at)
            .map_err(|e| SyncError::InvalidConfig(e.to_string()))?;

        if self.webhook.secret.trim().is_empty() {
            return Err(SyncError::InvalidConfig(
                "webhook.secret must be set (TRADEPOST_WEBHOOK_SECRET)".into(),
            ));
        }

        let r = &self.resilience;
        if r.timeout_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "timeout_secs must be greater than 0".into(),
            ));
        }
        if r.breaker_failure_threshold == 0 {
            return Err(SyncError::InvalidConfig(
                "breaker_failure_threshold must be greater than 0".into(),
            ));
        }
        if r.backoff_multiplier < 1.0 {
            return Err(SyncError::InvalidConfig(
                "backoff_multiplier must be at least 1.0".into(),
            ));
        }

        if self.database.max_connections == 0 {
            return Err(SyncError::InvalidConfig(
                "max_connections must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Applies `TRADEPOST_*` environment variable overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies overrides from any key lookup.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("TRADEPOST_API_URL") {
            debug!(url = %url, "Overriding marketplace URL from environment");
            self.marketplace.base_url = url;
        }

        if let Some(token) = lookup("TRADEPOST_API_TOKEN") {
            self.marketplace.api_token = token;
        }

        if let Some(secret) = lookup("TRADEPOST_WEBHOOK_SECRET") {
            self.webhook.secret = secret;
        }

        if let Some(at) = lookup("TRADEPOST_DAILY_AT") {
            debug!(daily_at = %at, "Overriding schedule from environment");
            self.scheduler.daily_at = at;
        }

        if let Some(enabled) = lookup("TRADEPOST_SCHEDULER_ENABLED") {
            match enabled.to_lowercase().as_str() {
                "1" | "true" | "yes" => self.scheduler.enabled = true,
                "0" | "false" | "no" => self.scheduler.enabled = false,
                _ => warn!(value = %enabled, "Unknown scheduler flag in environment"),
            }
        }

        if let Some(path) = lookup("TRADEPOST_DATABASE_PATH") {
            self.database.path = Some(PathBuf::from(path));
        }

        if let Some(addr) = lookup("TRADEPOST_BIND_ADDR") {
            self.server.bind_addr = addr;
        }

        if let Some(port) = lookup("TRADEPOST_PORT") {
            if let Ok(p) = port.parse::<u16>() {
                debug!(port = p, "Overriding server port from environment");
                self.server.port = p;
            }
        }

        if let Some(level) = lookup("TRADEPOST_LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join("tradepost.toml"))
    }
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("com", "tradepost", "tradepost")
}
