//! Request scheduler configuration.

/// Default maximum number of concurrently executing requests.
pub const DEFAULT_MAX_REQUESTS: usize = 50;

/// Default maximum number of concurrently executing requests per server.
pub const DEFAULT_MAX_REQUESTS_PER_SERVER: usize = 6;

/// Concurrency limits for the [`RequestScheduler`](super::RequestScheduler).
///
/// # Example
///
/// ```
/// use tilefetch::scheduler::SchedulerConfig;
///
/// let config = SchedulerConfig::default();
/// assert_eq!(config.max_requests(), 50);
/// assert_eq!(config.max_requests_per_server(), 6);
///
/// let config = SchedulerConfig::new()
///     .with_max_requests(8)
///     .with_max_requests_per_server(2);
/// assert_eq!(config.max_requests(), 8);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Maximum number of requests executing at once
    max_requests: usize,
    /// Maximum number of requests executing at once against one server
    max_requests_per_server: usize,
}

impl SchedulerConfig {
    /// Create a new scheduler configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of concurrent requests.
    ///
    /// Values below 1 are raised to 1 so the scheduler can always make progress.
    pub fn with_max_requests(mut self, max: usize) -> Self {
        self.max_requests = max.max(1);
        self
    }

    /// Set the maximum number of concurrent requests per server.
    ///
    /// Values below 1 are raised to 1.
    pub fn with_max_requests_per_server(mut self, max: usize) -> Self {
        self.max_requests_per_server = max.max(1);
        self
    }

    /// Get the maximum number of concurrent requests.
    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    /// Get the maximum number of concurrent requests per server.
    pub fn max_requests_per_server(&self) -> usize {
        self.max_requests_per_server
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_requests: DEFAULT_MAX_REQUESTS,
            max_requests_per_server: DEFAULT_MAX_REQUESTS_PER_SERVER,
        }
    }
}
