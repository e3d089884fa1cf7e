//! Server configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use stratus_core::openweather::{DEFAULT_BASE_URL, DEFAULT_GEO_URL, DEFAULT_HISTORY_URL};
use stratus_core::{ConflictPolicy, OpenWeatherConfig, RateLimitConfig, SyncSettings};

/// Server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server settings.
    pub server: ServerConfig,
    /// Storage settings.
    pub storage: StorageConfig,
    /// Weather provider settings.
    pub provider: ProviderConfig,
    /// Scheduler and sync settings.
    pub sync: SyncConfig,
    /// Inbound request protection.
    pub security: SecurityConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Save configuration to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Write {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Validate the configuration and return every error found.
    ///
    /// # Example
    ///
    /// ```
    /// use stratus_service::Config;
    ///
    /// let config = Config::default();
    /// config.validate().expect("Default config should be valid");
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();
        errors.extend(self.server.validate());
        errors.extend(self.storage.validate());
        errors.extend(self.provider.validate());
        errors.extend(self.sync.validate());
        errors.extend(self.security.validate());

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Apply command-line overrides, then validate the merged result.
    pub fn with_overrides(
        mut self,
        bind: Option<String>,
        database: Option<PathBuf>,
    ) -> Result<Self, ConfigError> {
        if let Some(bind) = bind {
            self.server.bind = bind;
        }
        if let Some(path) = database {
            self.storage.path = path;
        }
        self.validate()?;
        Ok(self)
    }

    /// Engine settings derived from this file, before stored preferences
    /// are applied.
    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings::default()
            .conflict(self.sync.conflict_policy())
            .provider_timeout(self.provider.timeout())
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "127.0.0.1:8080").
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}

impl ServerConfig {
    /// Validate server configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.bind.is_empty() {
            errors.push(ValidationError::new(
                "server.bind",
                "bind address cannot be empty",
            ));
            return errors;
        }

        match self.bind.rsplit_once(':') {
            None => errors.push(ValidationError::new(
                "server.bind",
                format!(
                    "invalid bind address '{}': expected format 'host:port'",
                    self.bind
                ),
            )),
            Some((_, port)) => match port.parse::<u16>() {
                Ok(0) => errors.push(ValidationError::new("server.bind", "port cannot be 0")),
                Err(_) => errors.push(ValidationError::new(
                    "server.bind",
                    format!("invalid port '{port}': must be a number 1-65535"),
                )),
                Ok(_) => {}
            },
        }

        errors
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file path.
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: stratus_store::default_db_path(),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.path.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "storage.path",
                "database path cannot be empty",
            ));
        }

        errors
    }
}

/// Weather provider configuration.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// API key. Takes precedence over `api_key_env`.
    pub api_key: Option<String>,
    /// Environment variable read when `api_key` is unset.
    pub api_key_env: String,
    /// Current weather and forecast endpoint.
    pub base_url: String,
    /// Geocoding endpoint.
    pub geo_url: String,
    /// One Call endpoint used for history.
    pub history_url: String,
    /// Per-call timeout in seconds.
    pub timeout_secs: u64,
    /// Outbound calls allowed per window, across all locations.
    pub rate_limit_requests: u32,
    /// Outbound window length in seconds.
    pub rate_limit_window_secs: u64,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("api_key_env", &self.api_key_env)
            .field("base_url", &self.base_url)
            .field("geo_url", &self.geo_url)
            .field("history_url", &self.history_url)
            .field("timeout_secs", &self.timeout_secs)
            .field("rate_limit_requests", &self.rate_limit_requests)
            .field("rate_limit_window_secs", &self.rate_limit_window_secs)
            .finish()
    }
}

/// Default environment variable holding the provider key.
pub const DEFAULT_API_KEY_ENV: &str = "OPENWEATHER_API_KEY";

impl Default for ProviderConfig {
    fn default() -> Self {
        let outbound = RateLimitConfig::outbound_default();
        Self {
            api_key: None,
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            geo_url: DEFAULT_GEO_URL.to_string(),
            history_url: DEFAULT_HISTORY_URL.to_string(),
            timeout_secs: 30,
            rate_limit_requests: outbound.max_requests,
            rate_limit_window_secs: outbound.window.as_secs(),
        }
    }
}

impl ProviderConfig {
    /// Validate provider configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        for (field, url) in [
            ("provider.base_url", &self.base_url),
            ("provider.geo_url", &self.geo_url),
            ("provider.history_url", &self.history_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                errors.push(ValidationError::new(
                    field,
                    format!("'{url}' must start with http:// or https://"),
                ));
            }
        }

        if !(1..=300).contains(&self.timeout_secs) {
            errors.push(ValidationError::new(
                "provider.timeout_secs",
                format!("timeout {} must be between 1 and 300 seconds", self.timeout_secs),
            ));
        }
        if self.rate_limit_requests == 0 {
            errors.push(ValidationError::new(
                "provider.rate_limit_requests",
                "must be at least 1",
            ));
        }
        if self.rate_limit_window_secs == 0 {
            errors.push(ValidationError::new(
                "provider.rate_limit_window_secs",
                "must be at least 1",
            ));
        }

        errors
    }

    /// The API key from the file, or from `api_key_env` when the file has none.
    ///
    /// Surrounding whitespace and quotes are stripped; an empty key counts as
    /// missing.
    pub fn resolve_api_key(&self) -> Option<String> {
        let raw = match &self.api_key {
            Some(key) => key.clone(),
            None => std::env::var(&self.api_key_env).ok()?,
        };
        let key = raw.trim().trim_matches(|c| c == '"' || c == '\'');
        (!key.is_empty()).then(|| key.to_string())
    }

    /// Per-call timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Client settings for the OpenWeatherMap gateway.
    pub fn openweather_config(&self) -> OpenWeatherConfig {
        OpenWeatherConfig {
            api_key: self.resolve_api_key(),
            base_url: self.base_url.trim_end_matches('/').to_string(),
            geo_url: self.geo_url.trim_end_matches('/').to_string(),
            history_url: self.history_url.trim_end_matches('/').to_string(),
            timeout: self.timeout(),
        }
    }

    /// Global outbound budget.
    pub fn outbound_limit(&self) -> RateLimitConfig {
        RateLimitConfig::new(
            self.rate_limit_requests,
            Duration::from_secs(self.rate_limit_window_secs),
        )
    }
}

/// Minimum scheduler tick in seconds.
pub const MIN_TICK_SECS: u64 = 5;
/// Maximum scheduler tick in seconds (1 hour).
pub const MAX_TICK_SECS: u64 = 3600;

/// Scheduler and sync configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Scheduler cadence in seconds.
    pub tick_secs: u64,
    /// Temperature shift in metric degrees that produces a conflict note.
    pub conflict_temperature_delta: f64,
    /// Prior snapshots older than this are not compared.
    pub conflict_window_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        let conflict = ConflictPolicy::default();
        Self {
            tick_secs: stratus_core::DEFAULT_TICK.as_secs(),
            conflict_temperature_delta: conflict.temperature_delta,
            conflict_window_secs: conflict.window_secs,
        }
    }
}

impl SyncConfig {
    /// Validate sync configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.tick_secs < MIN_TICK_SECS {
            errors.push(ValidationError::new(
                "sync.tick_secs",
                format!(
                    "tick {} is too short (minimum {} seconds)",
                    self.tick_secs, MIN_TICK_SECS
                ),
            ));
        } else if self.tick_secs > MAX_TICK_SECS {
            errors.push(ValidationError::new(
                "sync.tick_secs",
                format!(
                    "tick {} is too long (maximum {} seconds / 1 hour)",
                    self.tick_secs, MAX_TICK_SECS
                ),
            ));
        }

        if !(self.conflict_temperature_delta.is_finite() && self.conflict_temperature_delta > 0.0) {
            errors.push(ValidationError::new(
                "sync.conflict_temperature_delta",
                "must be a positive number of degrees",
            ));
        }
        if self.conflict_window_secs == 0 {
            errors.push(ValidationError::new(
                "sync.conflict_window_secs",
                "must be at least 1",
            ));
        }

        errors
    }

    /// Scheduler cadence.
    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_secs)
    }

    /// Conflict thresholds.
    pub fn conflict_policy(&self) -> ConflictPolicy {
        ConflictPolicy {
            temperature_delta: self.conflict_temperature_delta,
            window_secs: self.conflict_window_secs,
        }
    }
}

/// Inbound request protection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Rate limit requests per client address.
    pub rate_limit_enabled: bool,
    /// Requests allowed per window.
    pub rate_limit_requests: u32,
    /// Window length in seconds.
    pub rate_limit_window_secs: u64,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        let inbound = RateLimitConfig::inbound_default();
        Self {
            rate_limit_enabled: true,
            rate_limit_requests: inbound.max_requests,
            rate_limit_window_secs: inbound.window.as_secs(),
        }
    }
}

impl SecurityConfig {
    /// Validate security configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.rate_limit_enabled {
            if self.rate_limit_requests == 0 {
                errors.push(ValidationError::new(
                    "security.rate_limit_requests",
                    "must be at least 1 when rate limiting is enabled",
                ));
            }
            if self.rate_limit_window_secs == 0 {
                errors.push(ValidationError::new(
                    "security.rate_limit_window_secs",
                    "must be at least 1 when rate limiting is enabled",
                ));
            }
        }

        errors
    }

    /// Per-client inbound budget.
    pub fn inbound_limit(&self) -> RateLimitConfig {
        RateLimitConfig::new(
            self.rate_limit_requests,
            Duration::from_secs(self.rate_limit_window_secs),
        )
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field path (e.g., `server.bind` or `sync.tick_secs`).
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("stratus")
        .join("server.toml")
}
