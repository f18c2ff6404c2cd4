//! Configuration file support
//!
//! Settings are read from `~/.tilefetch/config.ini` (or an explicit path)
//! and overlaid on the defaults of each component's config struct.

mod file;
mod parser;

pub use file::{
    config_directory, config_file_path, ConfigFile, ConfigFileError, CONFIG_DIR_NAME,
    CONFIG_FILE_NAME,
};
