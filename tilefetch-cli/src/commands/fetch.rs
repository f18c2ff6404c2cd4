//! Fetch command - download a single tile to a PNG file.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tilefetch::fetch::{FetchError, HttpFetcher};
use tilefetch::handle::TileState;
use tilefetch::loader::{TileFailure, TileLoader};
use tilefetch::provider::ImageryProvider;
use tilefetch::{TileCoord, TileRef};
use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::broadcast::Receiver;
use tracing::info;

use super::common::{build_provider, load_config, TileArgs};
use crate::error::CliError;

/// Arguments for the fetch command.
pub struct FetchArgs {
    pub tile: TileArgs,
    pub retries: Option<u32>,
    pub output: Option<PathBuf>,
}

/// Default output file name for a tile.
pub fn default_output(tile: &TileArgs) -> PathBuf {
    PathBuf::from(format!(
        "tile_{}_{}_{}.png",
        tile.level, tile.row, tile.column
    ))
}

/// Run the fetch command.
pub fn run(args: FetchArgs) -> Result<(), CliError> {
    let config = load_config(args.tile.config.as_ref())?;
    let provider = build_provider(&args.tile, &config)?;
    let executor = HttpFetcher::with_config(&config.http).map_err(CliError::HttpClient)?;

    let mut retry = config.retry.clone();
    if let Some(retries) = args.retries {
        retry = retry.with_max_retries(retries);
    }

    let coord = args.tile.coord();
    let output = args.output.unwrap_or_else(|| default_output(&args.tile));

    println!("Fetching tile {}", coord);
    println!("  URL: {}", provider.url_for(&coord));
    println!("  Retries: up to {}", retry.max_retries());
    println!();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)?;

    let loader = TileLoader::new(Arc::new(provider), Arc::new(executor), config.loader)
        .with_retry_policy(retry.policy());
    runtime.block_on(fetch_tile(loader, coord, &output))?;

    info!(path = %output.display(), "Tile saved");
    println!("Saved to {}", output.display());
    Ok(())
}

/// Drive the loader until the tile settles, then save it to `output`.
async fn fetch_tile(
    mut loader: TileLoader<HttpFetcher>,
    coord: TileCoord,
    output: &Path,
) -> Result<(), CliError> {
    let mut failures = loader.subscribe_failures();

    let start = Instant::now();
    let tile = loader.request_tile(coord)?;
    while loader.tick().await {
        report_failures(&mut failures);
    }
    report_failures(&mut failures);

    let outcome = match loader.state(&tile) {
        Some(TileState::Received) => match loader.image(&tile) {
            Some(image) => {
                println!(
                    "Fetched {}x{} image in {:.2}s",
                    image.width(),
                    image.height(),
                    start.elapsed().as_secs_f64()
                );
                image
                    .pixels()
                    .save(output)
                    .map_err(|error| CliError::FileWrite {
                        path: output.display().to_string(),
                        error,
                    })
            }
            None => Err(fetch_failed(&loader, &tile, coord)),
        },
        Some(TileState::Invalid) => Err(CliError::InvalidTile(coord)),
        _ => Err(fetch_failed(&loader, &tile, coord)),
    };

    loader.release(tile)?;
    outcome
}

fn fetch_failed(loader: &TileLoader<HttpFetcher>, tile: &TileRef, coord: TileCoord) -> CliError {
    let reason = loader
        .failure(tile)
        .cloned()
        .unwrap_or_else(|| FetchError::Network("no response".to_string()));
    CliError::Fetch { coord, reason }
}

fn report_failures(failures: &mut Receiver<TileFailure>) {
    loop {
        match failures.try_recv() {
            Ok(failure) => {
                let next = if failure.retrying {
                    "retrying"
                } else {
                    "giving up"
                };
                eprintln!(
                    "  Attempt {} failed: {} ({})",
                    failure.times_retried + 1,
                    failure.reason,
                    next
                );
            }
            Err(TryRecvError::Lagged(skipped)) => {
                eprintln!("  ({} failure reports dropped)", skipped);
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_output_name() {
        let tile = TileArgs {
            level: 3,
            row: 2,
            column: 5,
            ..Default::default()
        };
        assert_eq!(default_output(&tile), PathBuf::from("tile_3_2_5.png"));
    }
}
