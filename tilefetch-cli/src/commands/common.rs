//! Common types and utilities shared across CLI commands.

use std::path::PathBuf;

use tilefetch::config::ConfigFile;
use tilefetch::provider::{OpenStreetMapConfig, OpenStreetMapProvider};
use tilefetch::TileCoord;

use crate::error::CliError;

/// Tile address and server overrides accepted by every tile command.
#[derive(Debug, Clone, Default)]
pub struct TileArgs {
    pub level: u32,
    pub row: u32,
    pub column: u32,
    pub url: Option<String>,
    pub retina: bool,
    pub config: Option<PathBuf>,
}

impl TileArgs {
    /// The addressed tile.
    pub fn coord(&self) -> TileCoord {
        TileCoord::new(self.level, self.row, self.column)
    }
}

/// Load the configuration file named on the command line, or the default one.
pub fn load_config(path: Option<&PathBuf>) -> Result<ConfigFile, CliError> {
    let config = match path {
        Some(path) => ConfigFile::load_from(path)?,
        None => ConfigFile::load()?,
    };
    Ok(config)
}

/// Apply command-line overrides on top of the configured provider settings.
pub fn resolve_provider_config(args: &TileArgs, config: &ConfigFile) -> OpenStreetMapConfig {
    let mut provider = config.provider.clone();
    if let Some(url) = &args.url {
        provider = provider.with_url(url.clone());
    }
    if args.retina {
        provider = provider.with_retina(true);
    }
    provider
}

/// Build the provider for `args`, validating its settings.
pub fn build_provider(
    args: &TileArgs,
    config: &ConfigFile,
) -> Result<OpenStreetMapProvider, CliError> {
    let provider = OpenStreetMapProvider::new(resolve_provider_config(args, config))?;
    Ok(provider)
}
