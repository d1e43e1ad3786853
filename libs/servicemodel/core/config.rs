use crate::core::address::EndpointAddress;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config file: {0}")]
    FileError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

pub const WATERMARK_ENV: &str = "SERVICEMODEL_CACHE_WATERMARK";
pub const CACHE_SETTING_ENV: &str = "SERVICEMODEL_CACHE_SETTING";

/// Whether clients of a channel type share cached channel factories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheSetting {
    /// Share cached factories for every endpoint source
    #[default]
    Default,
    /// Same sharing as `Default`; kept so configurations can pin it explicitly
    AlwaysOn,
    /// Never touch the cache; every client owns a private factory
    AlwaysOff,
}

impl std::str::FromStr for CacheSetting {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "default" => Ok(Self::Default),
            "always_on" | "alwayson" => Ok(Self::AlwaysOn),
            "always_off" | "alwaysoff" => Ok(Self::AlwaysOff),
            other => Err(ConfigError::ValidationError(format!(
                "unknown cache setting '{}'",
                other
            ))),
        }
    }
}

/// Root configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceModelConfig {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub client: ClientSection,
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Entries per channel type before least-recently-used trimming starts
    #[serde(default = "default_watermark")]
    pub watermark: usize,
    /// Setting used for channel types that never set their own
    #[serde(default)]
    pub default_setting: CacheSetting,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            watermark: default_watermark(),
            default_setting: CacheSetting::Default,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_timeout_secs")]
    pub open_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub close_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            open_secs: default_timeout_secs(),
            close_secs: default_timeout_secs(),
        }
    }
}

impl TimeoutConfig {
    pub fn open(&self) -> Duration {
        Duration::from_secs(self.open_secs)
    }

    pub fn close(&self) -> Duration {
        Duration::from_secs(self.close_secs)
    }
}

/// Named client endpoints
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientSection {
    #[serde(default)]
    pub endpoints: Vec<EndpointConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub name: String,
    pub address: String,
    /// Binding name, looked up in the binding table at registry build time
    pub binding: String,
    /// Contract name the endpoint serves
    pub contract: String,
}

fn default_watermark() -> usize {
    32
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_log_level() -> String {
    "info".to_string()
}

impl ServiceModelConfig {
    /// Load configuration from a YAML file, then apply environment overrides
    pub fn load(config_path: impl AsRef<Path>) -> Result<Self> {
        let yaml_content = std::fs::read_to_string(config_path)?;
        let mut config = Self::from_yaml_str(&yaml_content)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse without environment overrides or validation
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(watermark) = std::env::var(WATERMARK_ENV) {
            info!("Overriding cache watermark from environment variable");
            self.cache.watermark = watermark.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!("{} must be a positive integer", WATERMARK_ENV))
            })?;
        }
        if let Ok(setting) = std::env::var(CACHE_SETTING_ENV) {
            info!("Overriding default cache setting from environment variable");
            self.cache.default_setting = setting.parse()?;
        }
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.cache.watermark == 0 {
            return Err(ConfigError::ValidationError(
                "cache.watermark must be at least 1".to_string(),
            ));
        }

        if self.timeouts.open_secs == 0 || self.timeouts.close_secs == 0 {
            return Err(ConfigError::ValidationError(
                "timeouts must be greater than 0".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for endpoint in &self.client.endpoints {
            if endpoint.name.is_empty() {
                return Err(ConfigError::ValidationError(
                    "endpoint name must not be empty".to_string(),
                ));
            }
            if !names.insert(endpoint.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate endpoint name '{}'",
                    endpoint.name
                )));
            }
            EndpointAddress::parse(&endpoint.address)
                .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "log_level must be one of: {}",
                valid_levels.join(", ")
            )));
        }

        Ok(())
    }

    /// Log configuration summary
    pub fn log(&self) {
        info!("Configuration loaded:");
        info!("  Cache watermark: {}", self.cache.watermark);
        info!("  Default cache setting: {:?}", self.cache.default_setting);
        info!("  Open timeout: {}s", self.timeouts.open_secs);
        info!("  Close timeout: {}s", self.timeouts.close_secs);
        info!("  Endpoints: {}", self.client.endpoints.len());
    }
}
