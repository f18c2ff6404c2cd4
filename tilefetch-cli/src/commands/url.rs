//! Url command - print the URL a tile would be fetched from.

use tilefetch::provider::ImageryProvider;

use super::common::{build_provider, load_config, TileArgs};
use crate::error::CliError;

/// Run the url command.
pub fn run(args: TileArgs) -> Result<(), CliError> {
    let config = load_config(args.config.as_ref())?;
    let provider = build_provider(&args, &config)?;

    let coord = args.coord();
    if !provider.is_valid_tile(&coord) {
        return Err(CliError::InvalidTile(coord));
    }

    println!("{}", provider.url_for(&coord));
    Ok(())
}
