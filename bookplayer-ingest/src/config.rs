//! Runtime configuration for the ingest service
//!
//! Resolved from the TOML bootstrap file with command-line / environment
//! overrides on top:
//!
//! **Priority:** CLI flag → environment variable → TOML → compiled default

use bookplayer_common::config::TomlConfig;
use bookplayer_common::{Error, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Values supplied on the command line or through the environment
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub audiobook_directory: Option<PathBuf>,
    pub application_directory: Option<PathBuf>,
    pub scan_interval_secs: Option<u64>,
}

/// Fully resolved settings the binary builds the pipeline from
#[derive(Debug, Clone, PartialEq)]
pub struct IngestConfig {
    pub audiobook_directory: PathBuf,
    pub processed_directory: PathBuf,
    pub fingerprint_store: PathBuf,
    pub database_path: PathBuf,
    pub media_extension: String,
    pub scan_interval: Duration,
}

impl IngestConfig {
    pub fn resolve(toml: &TomlConfig, overrides: &Overrides) -> Result<Self> {
        let mut merged = toml.clone();
        if let Some(dir) = &overrides.audiobook_directory {
            merged.audiobook_directory = dir.clone();
        }
        if let Some(dir) = &overrides.application_directory {
            merged.application_directory = dir.clone();
        }
        if let Some(secs) = overrides.scan_interval_secs {
            merged.scan_interval_secs = secs;
        }
        merged.validate()?;

        let media_extension = merged.media_extension.trim().to_ascii_lowercase();
        if media_extension.contains(&['/', '\\'][..]) {
            return Err(Error::Config(format!(
                "media_extension {:?} contains a path separator",
                merged.media_extension
            )));
        }

        Ok(Self {
            audiobook_directory: merged.audiobook_directory.clone(),
            processed_directory: merged.processed_directory(),
            fingerprint_store: merged.fingerprint_store_path(),
            database_path: merged.database_path(),
            media_extension,
            scan_interval: merged.scan_interval(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> TomlConfig {
        TomlConfig {
            audiobook_directory: PathBuf::from("/data/inbox"),
            application_directory: PathBuf::from("/data/app"),
            ..TomlConfig::default()
        }
    }

    #[test]
    fn test_paths_derive_from_application_directory() {
        let config = IngestConfig::resolve(&base(), &Overrides::default()).unwrap();

        assert_eq!(config.audiobook_directory, PathBuf::from("/data/inbox"));
        assert_eq!(config.processed_directory, PathBuf::from("/data/app/processed_audiobooks"));
        assert_eq!(config.fingerprint_store, PathBuf::from("/data/app/fingerprints.json"));
        assert_eq!(config.database_path, PathBuf::from("/data/app/bookplayer.db"));
        assert_eq!(config.scan_interval, Duration::from_secs(30));
    }

    #[test]
    fn test_overrides_win() {
        let overrides = Overrides {
            audiobook_directory: Some(PathBuf::from("/elsewhere")),
            application_directory: Some(PathBuf::from("/state")),
            scan_interval_secs: Some(5),
        };
        let config = IngestConfig::resolve(&base(), &overrides).unwrap();

        assert_eq!(config.audiobook_directory, PathBuf::from("/elsewhere"));
        assert_eq!(config.fingerprint_store, PathBuf::from("/state/fingerprints.json"));
        assert_eq!(config.scan_interval, Duration::from_secs(5));
    }

    #[test]
    fn test_zero_interval_override_rejected() {
        let overrides = Overrides {
            scan_interval_secs: Some(0),
            ..Overrides::default()
        };
        assert!(matches!(
            IngestConfig::resolve(&base(), &overrides),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_extension_normalized_to_lowercase() {
        let toml = TomlConfig {
            media_extension: "M4B".to_string(),
            ..base()
        };
        let config = IngestConfig::resolve(&toml, &Overrides::default()).unwrap();
        assert_eq!(config.media_extension, "m4b");
    }
}
