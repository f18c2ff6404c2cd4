//! tilefetch CLI - Command-line interface
//!
//! This binary provides a command-line interface to the tilefetch library.

mod commands;
mod error;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tilefetch::config::config_directory;
use tilefetch::logging::{default_log_file, init_logging, LoggingGuard};

use commands::common::TileArgs;
use commands::fetch::FetchArgs;
use error::CliError;

#[derive(Parser)]
#[command(name = "tilefetch")]
#[command(version)]
#[command(about = "Fetch slippy-map imagery tiles with retries", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the URL a tile is fetched from
    Url {
        #[command(flatten)]
        tile: TileOptions,
    },

    /// Fetch a single tile and save it as PNG
    Fetch {
        #[command(flatten)]
        tile: TileOptions,

        /// Retries after the first failure (overrides [retry] max_retries)
        #[arg(long)]
        retries: Option<u32>,

        /// Output file path (default: tile_<level>_<row>_<column>.png)
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Log level used when RUST_LOG is not set
        #[arg(long, default_value = "warn")]
        log_level: String,
    },
}

#[derive(Args)]
struct TileOptions {
    /// Zoom level
    level: u32,

    /// Tile row, counted from the north edge
    row: u32,

    /// Tile column, counted from the west edge
    column: u32,

    /// Tile server base URL (overrides [provider] url)
    #[arg(long)]
    url: Option<String>,

    /// Request high-resolution @2x tiles
    #[arg(long)]
    retina: bool,

    /// Configuration file (default: ~/.tilefetch/config.ini)
    #[arg(long)]
    config: Option<PathBuf>,
}

impl From<TileOptions> for TileArgs {
    fn from(options: TileOptions) -> Self {
        TileArgs {
            level: options.level,
            row: options.row,
            column: options.column,
            url: options.url,
            retina: options.retina,
            config: options.config,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Url { tile } => commands::url::run(tile.into()),
        Commands::Fetch {
            tile,
            retries,
            output,
            log_level,
        } => init_cli_logging(&log_level).and_then(|_guard| {
            commands::fetch::run(FetchArgs {
                tile: tile.into(),
                retries,
                output,
            })
        }),
    };

    if let Err(e) = result {
        e.exit();
    }
}

fn init_cli_logging(level: &str) -> Result<LoggingGuard, CliError> {
    let log_dir = config_directory().join("logs");
    init_logging(&log_dir, default_log_file(), level)
        .map_err(|e| CliError::LoggingInit(e.to_string()))
}
