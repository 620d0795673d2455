//! Bootstrap configuration loading and path resolution
//!
//! Configuration file priority order:
//! 1. Command-line argument (highest priority)
//! 2. `BOOKPLAYER_CONFIG` environment variable
//! 3. Platform config directory (`~/.config/bookplayer/config.toml` on Linux)
//!
//! A missing file at the platform location is not an error: compiled
//! defaults are used and the caller is told so through [`LoadedConfig`].
//! A file named explicitly (argument or environment) must exist, and any
//! file that exists must parse.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming the configuration file
pub const CONFIG_ENV_VAR: &str = "BOOKPLAYER_CONFIG";

const PROCESSED_FOLDER: &str = "processed_audiobooks";
const FINGERPRINT_STORE_FILE: &str = "fingerprints.json";
const DATABASE_FILE: &str = "bookplayer.db";

/// Bootstrap configuration loaded from TOML
///
/// Every field has a default, so a partial file (or none at all) is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// Directory watched for new audiobook files
    pub audiobook_directory: PathBuf,

    /// Directory holding processed output, the database and watcher state
    pub application_directory: PathBuf,

    /// Seconds between directory scans
    pub scan_interval_secs: u64,

    /// File extension (without dot) of media files to ingest
    pub media_extension: String,

    /// SQLite database file; defaults to `<application_directory>/bookplayer.db`
    pub database_path: Option<PathBuf>,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Default for TomlConfig {
    fn default() -> Self {
        let application_directory = default_application_directory();
        Self {
            audiobook_directory: application_directory.join("inbox"),
            application_directory,
            scan_interval_secs: 30,
            media_extension: "m4b".to_string(),
            database_path: None,
            logging: LoggingConfig::default(),
        }
    }
}

impl TomlConfig {
    /// Root directory that receives one subdirectory per processed audiobook
    pub fn processed_directory(&self) -> PathBuf {
        self.application_directory.join(PROCESSED_FOLDER)
    }

    /// File holding the directory watcher's fingerprint table
    pub fn fingerprint_store_path(&self) -> PathBuf {
        self.application_directory.join(FINGERPRINT_STORE_FILE)
    }

    /// Effective SQLite database path
    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| self.application_directory.join(DATABASE_FILE))
    }

    /// Scan interval as a Duration
    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs)
    }

    /// Check values that deserialize fine but cannot run
    pub fn validate(&self) -> Result<()> {
        if self.scan_interval_secs == 0 {
            return Err(Error::Config(
                "scan_interval_secs must be greater than zero".to_string(),
            ));
        }
        let ext = self.media_extension.trim();
        if ext.is_empty() || ext.starts_with('.') {
            return Err(Error::Config(format!(
                "media_extension must be a bare extension such as \"m4b\", got {:?}",
                self.media_extension
            )));
        }
        if self.audiobook_directory.as_os_str().is_empty() {
            return Err(Error::Config("audiobook_directory is empty".to_string()));
        }
        if self.application_directory.as_os_str().is_empty() {
            return Err(Error::Config("application_directory is empty".to_string()));
        }
        Ok(())
    }
}

/// Where the configuration path came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    /// `--config` argument
    CommandLine,
    /// `BOOKPLAYER_CONFIG` environment variable
    Environment,
    /// Platform config directory
    PlatformDefault,
}

/// Resolve the configuration file path by priority
///
/// Returns None only when no platform config directory can be determined.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<(PathBuf, ConfigSource)> {
    if let Some(path) = cli_arg {
        return Some((path.to_path_buf(), ConfigSource::CommandLine));
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some((PathBuf::from(path), ConfigSource::Environment));
        }
    }

    dirs::config_dir().map(|d| {
        (
            d.join("bookplayer").join("config.toml"),
            ConfigSource::PlatformDefault,
        )
    })
}

/// Configuration plus where it came from
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Effective configuration
    pub config: TomlConfig,
    /// File that was read, None when compiled defaults were used
    pub path: Option<PathBuf>,
    /// How the file path was chosen
    pub source: Option<ConfigSource>,
}

/// Load configuration following the resolution priority
///
/// Does not log: callers typically initialize logging from the result.
pub fn load_config(cli_arg: Option<&Path>) -> Result<LoadedConfig> {
    let Some((path, source)) = resolve_config_path(cli_arg) else {
        return Ok(LoadedConfig {
            config: TomlConfig::default(),
            path: None,
            source: None,
        });
    };

    if !path.exists() {
        if source == ConfigSource::PlatformDefault {
            return Ok(LoadedConfig {
                config: TomlConfig::default(),
                path: None,
                source: Some(source),
            });
        }
        return Err(Error::Config(format!(
            "Config file not found: {} (from {:?})",
            path.display(),
            source
        )));
    }

    let config = load_toml_config(&path)?;
    Ok(LoadedConfig {
        config,
        path: Some(path),
        source: Some(source),
    })
}

/// Read, parse and validate a TOML configuration file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if path.is_dir() {
        return Err(Error::Config(format!(
            "Config path {} is a directory",
            path.display()
        )));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;

    config.validate()?;
    Ok(config)
}

/// Write configuration to disk atomically
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize config failed: {}", e)))?;
    crate::atomic::write_atomic(path, content.as_bytes())
}

/// OS-dependent default application directory
fn default_application_directory() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("bookplayer"))
        .unwrap_or_else(|| PathBuf::from("./bookplayer_data"))
}
