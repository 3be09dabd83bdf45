//! Application configuration.
//!
//! Aggregates configuration from all modules into a single Config struct
//! that can be loaded from YAML files or environment variables.

mod server;
mod storage;

pub use server::{ReconciliationConfig, RetryConfig, ServerConfig, TimeoutConfig};
pub use storage::{SqliteConfig, StorageConfig, StorageType};

use serde::Deserialize;

use crate::blob_store::BlobStoreConfig;
use crate::identity::IdentityConfig;
use crate::tier::TierPolicy;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "PHOTOLINK_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "PHOTOLINK";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "PHOTOLINK_LOG";
/// Environment variable selecting log output format (`json` or text).
pub const LOG_FORMAT_ENV_VAR: &str = "PHOTOLINK_LOG_FORMAT";

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("Tier table is empty")]
    NoTiers,

    #[error("Timeout '{0}' must be greater than zero")]
    ZeroTimeout(&'static str),

    #[error("Invalid public base URL '{0}'")]
    InvalidBaseUrl(String),
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server configuration.
    pub server: ServerConfig,
    /// Document store configuration.
    pub storage: StorageConfig,
    /// Image blob store configuration.
    pub blob_store: BlobStoreConfig,
    /// Bearer credential verification.
    pub identity: IdentityConfig,
    /// Monthly issuance limit per tier.
    pub tiers: TierPolicy,
    pub timeouts: TimeoutConfig,
    pub retry: RetryConfig,
    pub reconciliation: ReconciliationConfig,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `config.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the services cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tiers.is_empty() {
            return Err(ConfigError::NoTiers);
        }
        for (name, value) in [
            ("store_ms", self.timeouts.store_ms),
            ("upload_ms", self.timeouts.upload_ms),
            ("identity_ms", self.timeouts.identity_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroTimeout(name));
            }
        }
        let base = &self.server.public_base_url;
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(ConfigError::InvalidBaseUrl(base.clone()));
        }
        Ok(())
    }

    /// Create config for testing: memory storage and blob store, default tiers.
    pub fn for_test() -> Self {
        Self {
            storage: StorageConfig {
                storage_type: StorageType::Memory,
                ..Default::default()
            },
            blob_store: BlobStoreConfig {
                store_type: crate::blob_store::BlobStoreType::Memory,
                ..Default::default()
            },
            ..Default::default()
        }
    }
}
