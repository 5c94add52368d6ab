//! Daemon configuration
//!
//! TOML file layered over defaults. The core sections (`vault`, `acme`,
//! `scheduler`, ...) sit at the top level next to `database` and `logging`:
//!
//! ```toml
//! [database]
//! path = "/var/lib/zonekeeper/zonekeeper.db"
//!
//! [logging]
//! level = "debug"
//!
//! [vault]
//! keys = ["primary-passphrase"]
//!
//! [scheduler]
//! auto_renew_at = "02:30"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use zonekeeper_core::error::{CoreError, CoreResult};
use zonekeeper_core::CoreConfig;

/// Explicit config file path
pub const CONFIG_ENV: &str = "ZONEKEEPER_CONFIG";
/// Comma-separated vault keys, replaces `vault.keys`
pub const VAULT_KEYS_ENV: &str = "ZONEKEEPER_VAULT_KEYS";

const APP_DIR: &str = "zonekeeper";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(flatten)]
    pub core: CoreConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        let dir = dirs::data_local_dir().map_or_else(|| PathBuf::from("."), |d| d.join(APP_DIR));
        Self {
            path: dir.join("zonekeeper.db"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    pub level: String,
    /// One JSON object per line instead of the human format
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Resolve, read and validate the configuration.
    ///
    /// Lookup order: `$ZONEKEEPER_CONFIG`, then `<config dir>/zonekeeper/config.toml`,
    /// then built-in defaults. A path named by the env var must exist.
    ///
    /// # Errors
    /// `CoreError::ConfigError` for unreadable files, bad TOML or invalid values.
    pub fn load() -> CoreResult<Self> {
        let mut config = match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => match default_config_path() {
                Some(path) if path.is_file() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };

        if let Ok(keys) = std::env::var(VAULT_KEYS_ENV) {
            config.override_vault_keys(&keys);
        }

        config.core.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CoreError::ConfigError(format!("Failed to read {}: {e}", path.display()))
        })?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| CoreError::ConfigError(format!("{}: {e}", path.display())))?;
        log::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> CoreResult<Self> {
        toml::from_str(content).map_err(|e| CoreError::ConfigError(e.to_string()))
    }

    /// Replace `vault.keys` with a comma-separated list. Blank entries are dropped.
    pub fn override_vault_keys(&mut self, raw: &str) {
        self.core.vault.keys = raw
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(String::from)
            .collect();
    }
}

/// `<config dir>/zonekeeper/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR).join("config.toml"))
}
