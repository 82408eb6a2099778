//! Configuration management for docboot
//!
//! Handles loading, saving, and validating configuration from TOML files.
//! The `[db]` table mirrors what host services already pass around:
//!
//! ```toml
//! [db]
//! name = "beer_garden"
//!
//! [db.connection]
//! host = "localhost"
//! port = 27017
//! username = "admin"
//! password_env = "DOCBOOT_DB_PASSWORD"
//! ```

mod defaults;

pub use defaults::*;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Characters MongoDB refuses in database names
const FORBIDDEN_DB_NAME_CHARS: &[char] = &[
    '/', '\\', '.', ' ', '"', '$', '*', '<', '>', ':', '|', '?',
];

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Database name and connection parameters
    #[serde(default)]
    pub db: DbConfig,

    /// Liveness probe configuration
    #[serde(default)]
    pub liveness: LivenessConfig,

    /// Index reconciliation configuration
    #[serde(default)]
    pub indexes: IndexConfig,

    /// Role seeding configuration
    #[serde(default)]
    pub roles: RoleSeedConfig,

    /// Paths configuration (internal, not user-editable)
    #[serde(skip)]
    pub paths: PathsConfig,
}

/// Database selection plus how to reach it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbConfig {
    /// Database name
    #[serde(default = "default_db_name")]
    pub name: String,

    /// Connection parameters
    #[serde(default)]
    pub connection: ConnectionConfig,
}

/// Connection parameters for the database cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default = "default_db_host")]
    pub host: String,

    #[serde(default = "default_db_port")]
    pub port: u16,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Inline password. Prefer `password_env` for anything checked in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Environment variable holding the password
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,
}

/// Liveness probe configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivenessConfig {
    /// Server-selection and socket timeout for the probe connection
    #[serde(default = "default_liveness_timeout_ms")]
    pub timeout_ms: u64,
}

/// Index reconciliation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Live index names that never count as stale (the implicit `_id_` index)
    #[serde(default = "default_ignored_indexes")]
    pub ignored: Vec<String>,
}

/// Role seeding configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoleSeedConfig {
    /// How many uniqueness violations a single seeding pass absorbs as lost
    /// races before the next one is fatal. Unset means no limit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_race_losses: Option<usize>,
}

/// Internal paths configuration
#[derive(Debug, Clone, Default)]
pub struct PathsConfig {
    /// Base directory for docboot data
    pub base_dir: PathBuf,

    /// Path to config file
    pub config_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db: DbConfig::default(),
            liveness: LivenessConfig::default(),
            indexes: IndexConfig::default(),
            roles: RoleSeedConfig::default(),
            paths: PathsConfig::default(),
        }
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            name: default_db_name(),
            connection: ConnectionConfig::default(),
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: default_db_host(),
            port: default_db_port(),
            username: None,
            password: None,
            password_env: None,
        }
    }
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_liveness_timeout_ms(),
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            ignored: default_ignored_indexes(),
        }
    }
}

impl ConnectionConfig {
    /// Password to authenticate with: the inline value wins over `password_env`
    pub fn resolved_password(&self) -> Option<String> {
        if self.password.is_some() {
            return self.password.clone();
        }
        self.password_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
    }
}

impl LivenessConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Config {
    /// Get the default base directory for docboot (~/.docboot)
    pub fn default_base_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".docboot")
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        Self::default_base_dir().join("config.toml")
    }

    /// Initialize paths configuration
    pub(crate) fn init_paths(&mut self, base_dir: Option<PathBuf>) {
        let base = base_dir.unwrap_or_else(Self::default_base_dir);
        self.paths = PathsConfig {
            config_file: base.join("config.toml"),
            base_dir: base,
        };
    }

    /// Load configuration from a specific file path
    pub fn load(config_path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", config_path);

        if !config_path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                config_path.display()
            )));
        }

        let content = std::fs::read_to_string(config_path)?;
        let mut config: Config = toml::from_str(&content)?;

        let base = config_path.parent().unwrap_or(Path::new(".")).to_path_buf();
        config.paths = PathsConfig {
            config_file: config_path.to_path_buf(),
            base_dir: base,
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific base directory, falling back to defaults
    pub fn load_from(base_dir: Option<PathBuf>) -> Result<Self> {
        let mut config = Config::default();
        config.init_paths(base_dir);

        if config.paths.config_file.exists() {
            debug!("Loading config from {:?}", config.paths.config_file);
            let content = std::fs::read_to_string(&config.paths.config_file)?;
            let mut loaded: Config = toml::from_str(&content)?;
            loaded.paths = config.paths;
            config = loaded;
        } else {
            debug!("No config file found, using defaults");
        }

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.paths.config_file.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&self.paths.config_file, content)?;
        info!("Saved config to {:?}", self.paths.config_file);
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.db.name.is_empty() {
            return Err(Error::Config("db.name must not be empty".to_string()));
        }

        if let Some(c) = self.db.name.chars().find(|c| FORBIDDEN_DB_NAME_CHARS.contains(c)) {
            return Err(Error::Config(format!(
                "db.name '{}' contains forbidden character '{}'",
                self.db.name, c
            )));
        }

        if self.db.connection.host.is_empty() {
            return Err(Error::Config(
                "db.connection.host must not be empty".to_string(),
            ));
        }

        if self.db.connection.port == 0 {
            return Err(Error::Config(
                "db.connection.port must be non-zero".to_string(),
            ));
        }

        if self.db.connection.password.is_some() && self.db.connection.password_env.is_some() {
            return Err(Error::Config(
                "set only one of db.connection.password and db.connection.password_env"
                    .to_string(),
            ));
        }

        if self.liveness.timeout_ms == 0 {
            return Err(Error::Config(
                "liveness.timeout_ms must be positive".to_string(),
            ));
        }

        Ok(())
    }
}
