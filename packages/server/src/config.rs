//! Server configuration.
//!
//! The defaults are embedded from `config/default.toml`. A file named by
//! `INVESTMTL_CONFIG` replaces them, and `BIND_ADDR`, `PORT`, and
//! `DATABASE_PATH` override individual fields.

use std::path::PathBuf;

use investmtl_scoring::weights::WeightResolver;
use investmtl_scoring_models::{ClassificationMode, WeightVector};
use serde::Deserialize;

const DEFAULT_TOML: &str = include_str!("../config/default.toml");

/// Environment variable naming an alternate config file.
pub const CONFIG_ENV: &str = "INVESTMTL_CONFIG";

/// Errors that can occur while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid TOML for [`ServerConfig`].
    #[error("Failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),

    /// A value is out of range.
    #[error("Invalid config: {message}")]
    Invalid {
        /// Description of the problem.
        message: String,
    },
}

/// `Cache-Control` max-age per response kind, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Single-area score with default weights.
    pub score_default: u32,
    /// Single-area score with custom weights.
    pub score_custom: u32,
    /// Comparison.
    pub compare: u32,
    /// Ranked list, area list, and summary.
    pub ranked: u32,
    /// Static legend.
    pub legend: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            score_default: 3600,
            score_custom: 300,
            compare: 1800,
            ranked: 7200,
            legend: 86400,
        }
    }
}

/// Runtime configuration of the API server.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind.
    pub bind_addr: String,
    /// Port to bind.
    pub port: u16,
    /// Score database file. Defaults to `data/investmtl.duckdb` under the
    /// project root.
    pub database_path: Option<PathBuf>,
    /// Maximum duration of a repository read, in milliseconds.
    pub repository_timeout_ms: u64,
    /// Number of pooled score repository connections.
    pub read_connections: usize,
    /// Ranked list length when the request gives none.
    pub ranked_default_limit: usize,
    /// Upper bound on the ranked list length.
    pub ranked_max_limit: usize,
    /// Classification mode when the request gives none.
    pub classification: ClassificationMode,
    /// Weights used when a request overrides none.
    pub default_weights: WeightVector,
    /// Cache lifetimes.
    pub cache: CacheConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1".to_string(),
            port: 8080,
            database_path: None,
            repository_timeout_ms: 5000,
            read_connections: 4,
            ranked_default_limit: 10,
            ranked_max_limit: 100,
            classification: ClassificationMode::Empirical,
            default_weights: WeightVector::DEFAULT,
            cache: CacheConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the document is malformed or fails
    /// validation.
    pub fn from_toml(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Returns the embedded default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the embedded file is invalid.
    pub fn embedded() -> Result<Self, ConfigError> {
        Self::from_toml(DEFAULT_TOML)
    }

    /// Loads the configuration from the embedded defaults or
    /// `INVESTMTL_CONFIG`, then applies environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed, or an
    /// override is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var(CONFIG_ENV) {
            Ok(path) => {
                log::info!("Loading config from {path}");
                Self::from_toml(&std::fs::read_to_string(path)?)?
            }
            Err(_) => Self::embedded()?,
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Applies `BIND_ADDR`, `PORT`, and `DATABASE_PATH` from `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `PORT` is not a port number.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(addr) = lookup("BIND_ADDR") {
            self.bind_addr = addr;
        }
        if let Some(port) = lookup("PORT") {
            self.port = port.trim().parse().map_err(|_| ConfigError::Invalid {
                message: format!("PORT '{port}' is not a valid port"),
            })?;
        }
        if let Some(path) = lookup("DATABASE_PATH") {
            self.database_path = Some(PathBuf::from(path));
        }
        Ok(())
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: &str| {
            Err(ConfigError::Invalid {
                message: message.to_string(),
            })
        };

        let weights = self.default_weights;
        let components = [
            weights.growth,
            weights.supply,
            weights.tension,
            weights.access,
            weights.returns,
        ];
        if components.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return invalid("default_weights must be finite and non-negative");
        }
        if weights.sum() <= 0.0 {
            return invalid("default_weights must not all be zero");
        }
        if self.ranked_default_limit == 0 || self.ranked_max_limit == 0 {
            return invalid("ranked limits must be at least 1");
        }
        if self.ranked_default_limit > self.ranked_max_limit {
            return invalid("ranked_default_limit must not exceed ranked_max_limit");
        }
        if self.repository_timeout_ms == 0 {
            return invalid("repository_timeout_ms must be positive");
        }
        if self.read_connections == 0 {
            return invalid("read_connections must be at least 1");
        }
        Ok(())
    }

    /// Score database path, falling back to the project default.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(investmtl_database::paths::database_path)
    }

    /// Weight resolver seeded with [`Self::default_weights`].
    #[must_use]
    pub fn resolver(&self) -> WeightResolver {
        WeightResolver::new(self.default_weights)
    }
}
