//! Configuration file handling for ~/.tilefetch/config.ini.
//!
//! Loads user configuration on top of the built-in defaults. Parsing lives
//! in [`super::parser`].

use ini::Ini;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::fetch::HttpConfig;
use crate::loader::LoaderConfig;
use crate::provider::OpenStreetMapConfig;
use crate::retry::RetryConfig;

/// Name of the configuration directory under the home directory.
pub const CONFIG_DIR_NAME: &str = ".tilefetch";

/// Name of the configuration file.
pub const CONFIG_FILE_NAME: &str = "config.ini";

/// Configuration file errors.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] ini::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {section}.{key} = '{value}' - {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },
}

/// All settings read from the configuration file.
///
/// Sections:
///
/// ```text
/// [provider]   url, file_extension, retina, minimum_level, maximum_level,
///              rectangle (west,south,east,north in degrees), credit
/// [scheduler]  max_requests, max_requests_per_server
/// [loader]     cross_origin, flip_y
/// [retry]      max_retries, initial_delay_ms, max_delay_secs, multiplier
/// [http]       timeout_secs, user_agent, origin
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigFile {
    /// Tile server settings
    pub provider: OpenStreetMapConfig,
    /// Scheduler limits and loading options
    pub loader: LoaderConfig,
    /// Retry behaviour
    pub retry: RetryConfig,
    /// HTTP client settings
    pub http: HttpConfig,
}

impl ConfigFile {
    /// Load configuration from the default path (~/.tilefetch/config.ini).
    ///
    /// If the file doesn't exist, returns defaults.
    pub fn load() -> Result<Self, ConfigFileError> {
        Self::load_from(&config_file_path())
    }

    /// Load configuration from a specific path.
    ///
    /// If the file doesn't exist, returns defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigFileError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let ini = Ini::load_from_file(path)?;
        super::parser::parse_ini(&ini)
    }

    /// Parse configuration from INI text.
    pub fn from_ini_str(content: &str) -> Result<Self, ConfigFileError> {
        let ini = Ini::load_from_str(content).map_err(ini::Error::Parse)?;
        super::parser::parse_ini(&ini)
    }
}

/// Get the configuration directory path (~/.tilefetch).
///
/// Falls back to the current directory when no home directory is known.
pub fn config_directory() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR_NAME)
}

/// Get the configuration file path (~/.tilefetch/config.ini).
pub fn config_file_path() -> PathBuf {
    config_directory().join(CONFIG_FILE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::Rectangle;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_config_file_path() {
        let path = config_file_path();
        assert!(path.ends_with(".tilefetch/config.ini"));
    }

    #[test]
    fn test_missing_file_returns_defaults() {
        let dir = TempDir::new().unwrap();
        let config = ConfigFile::load_from(&dir.path().join("absent.ini")).unwrap();
        assert_eq!(config, ConfigFile::default());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[provider]\n\
             url = https://tile.example.com/\n\
             retina = true\n\
             minimum_level = 1\n\
             maximum_level = 17\n\
             rectangle = -10, -10, 10, 10\n\
             \n\
             [scheduler]\n\
             max_requests = 8\n\
             max_requests_per_server = 2\n\
             \n\
             [loader]\n\
             cross_origin = yes\n\
             \n\
             [retry]\n\
             max_retries = 3\n\
             initial_delay_ms = 250\n\
             \n\
             [http]\n\
             timeout_secs = 10\n\
             origin = https://map.example.com"
        )
        .unwrap();

        let config = ConfigFile::load_from(file.path()).unwrap();

        assert_eq!(config.provider.url(), "https://tile.example.com/");
        assert!(config.provider.retina());
        assert_eq!(config.provider.minimum_level(), 1);
        assert_eq!(config.provider.maximum_level(), Some(17));
        assert_eq!(
            config.provider.rectangle(),
            Some(Rectangle::from_degrees(-10.0, -10.0, 10.0, 10.0))
        );
        assert_eq!(config.loader.scheduler().max_requests(), 8);
        assert_eq!(config.loader.scheduler().max_requests_per_server(), 2);
        assert!(config.loader.cross_origin());
        assert_eq!(config.retry.max_retries(), 3);
        assert_eq!(config.retry.initial_delay_ms(), 250);
        assert_eq!(config.http.timeout_secs(), 10);
        assert_eq!(config.http.origin(), Some("https://map.example.com"));
    }

    #[test]
    fn test_invalid_value_is_reported() {
        let err = ConfigFile::from_ini_str("[scheduler]\nmax_requests = lots\n").unwrap_err();
        match err {
            ConfigFileError::InvalidValue {
                section,
                key,
                value,
                ..
            } => {
                assert_eq!(section, "scheduler");
                assert_eq!(key, "max_requests");
                assert_eq!(value, "lots");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_error_display() {
        let err = ConfigFileError::InvalidValue {
            section: "retry".to_string(),
            key: "multiplier".to_string(),
            value: "fast".to_string(),
            reason: "expected a number".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid configuration: retry.multiplier = 'fast' - expected a number"
        );
    }
}
