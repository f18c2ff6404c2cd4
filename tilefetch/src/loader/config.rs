//! Tile loader configuration.

use crate::fetch::DecodeOptions;
use crate::scheduler::SchedulerConfig;

/// Default capacity of the failure broadcast channel.
///
/// Subscribers that fall further behind than this miss the oldest events.
pub const DEFAULT_FAILURE_CHANNEL_CAPACITY: usize = 256;

/// Configuration for the [`TileLoader`](super::TileLoader).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderConfig {
    /// Concurrency limits for outbound fetches
    scheduler: SchedulerConfig,
    /// Options passed to the image decoder
    decode: DecodeOptions,
    /// Request cross-origin-safe image data
    cross_origin: bool,
    /// Buffered failure events per subscriber
    failure_channel_capacity: usize,
}

impl LoaderConfig {
    /// Create a new loader configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the scheduler limits.
    pub fn with_scheduler(mut self, scheduler: SchedulerConfig) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Set the decode options.
    pub fn with_decode_options(mut self, decode: DecodeOptions) -> Self {
        self.decode = decode;
        self
    }

    /// Request cross-origin-safe image data for every tile.
    pub fn with_cross_origin(mut self, cross_origin: bool) -> Self {
        self.cross_origin = cross_origin;
        self
    }

    /// Set the failure channel capacity (at least 1).
    pub fn with_failure_channel_capacity(mut self, capacity: usize) -> Self {
        self.failure_channel_capacity = capacity.max(1);
        self
    }

    /// Get the scheduler limits.
    pub fn scheduler(&self) -> SchedulerConfig {
        self.scheduler
    }

    /// Get the decode options.
    pub fn decode_options(&self) -> DecodeOptions {
        self.decode
    }

    /// Get whether cross-origin-safe loading is requested.
    pub fn cross_origin(&self) -> bool {
        self.cross_origin
    }

    /// Get the failure channel capacity.
    pub fn failure_channel_capacity(&self) -> usize {
        self.failure_channel_capacity
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            decode: DecodeOptions::default(),
            cross_origin: false,
            failure_channel_capacity: DEFAULT_FAILURE_CHANNEL_CAPACITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LoaderConfig::default();
        assert_eq!(config.scheduler(), SchedulerConfig::default());
        assert!(!config.cross_origin());
        assert!(!config.decode_options().flip_y);
        assert_eq!(
            config.failure_channel_capacity(),
            DEFAULT_FAILURE_CHANNEL_CAPACITY
        );
    }

    #[test]
    fn test_config_builder() {
        let config = LoaderConfig::new()
            .with_scheduler(SchedulerConfig::new().with_max_requests(4))
            .with_decode_options(DecodeOptions { flip_y: true })
            .with_cross_origin(true)
            .with_failure_channel_capacity(0);

        assert_eq!(config.scheduler().max_requests(), 4);
        assert!(config.decode_options().flip_y);
        assert!(config.cross_origin());
        assert_eq!(config.failure_channel_capacity(), 1);
    }
}
