//! CLI error handling with user-friendly messages.
//!
//! Centralizes error handling for the CLI, providing consistent formatting
//! and appropriate exit codes.

use std::fmt;
use std::process;

use tilefetch::config::ConfigFileError;
use tilefetch::fetch::FetchError;
use tilefetch::loader::LoaderError;
use tilefetch::provider::ConfigError;
use tilefetch::TileCoord;

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(String),
    /// Configuration file could not be read or parsed
    ConfigFile(ConfigFileError),
    /// Provider settings were rejected
    Provider(ConfigError),
    /// Failed to create the HTTP client
    HttpClient(FetchError),
    /// Failed to start the async runtime
    Runtime(std::io::Error),
    /// The loader refused an operation
    Loader(LoaderError),
    /// The tile could not be fetched
    Fetch { coord: TileCoord, reason: FetchError },
    /// The provider does not serve the requested tile
    InvalidTile(TileCoord),
    /// Failed to write output file
    FileWrite {
        path: String,
        error: image::ImageError,
    },
}

impl CliError {
    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        match self {
            CliError::Fetch { .. } => {
                eprintln!();
                eprintln!("Common issues:");
                eprintln!("  1. The tile server is unreachable: check --url and your network");
                eprintln!("  2. The server is rate limiting: retry later or pass --retries");
            }
            CliError::InvalidTile(_) => {
                eprintln!();
                eprintln!("Check the level limits and rectangle in the [provider] section");
            }
            _ => {}
        }

        process::exit(1)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(msg) => write!(f, "Failed to initialize logging: {}", msg),
            CliError::ConfigFile(e) => write!(f, "Configuration error: {}", e),
            CliError::Provider(e) => write!(f, "Invalid provider settings: {}", e),
            CliError::HttpClient(e) => write!(f, "Failed to create HTTP client: {}", e),
            CliError::Runtime(e) => write!(f, "Failed to start async runtime: {}", e),
            CliError::Loader(e) => write!(f, "Tile loader error: {}", e),
            CliError::Fetch { coord, reason } => {
                write!(f, "Failed to fetch tile {}: {}", coord, reason)
            }
            CliError::InvalidTile(coord) => {
                write!(f, "Tile {} is not served by this provider", coord)
            }
            CliError::FileWrite { path, error } => {
                write!(f, "Failed to write file '{}': {}", path, error)
            }
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::ConfigFile(e) => Some(e),
            CliError::Provider(e) => Some(e),
            CliError::HttpClient(e) => Some(e),
            CliError::Runtime(e) => Some(e),
            CliError::Loader(e) => Some(e),
            CliError::Fetch { reason, .. } => Some(reason),
            CliError::FileWrite { error, .. } => Some(error),
            _ => None,
        }
    }
}

impl From<ConfigFileError> for CliError {
    fn from(e: ConfigFileError) -> Self {
        CliError::ConfigFile(e)
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Provider(e)
    }
}

impl From<LoaderError> for CliError {
    fn from(e: LoaderError) -> Self {
        CliError::Loader(e)
    }
}
