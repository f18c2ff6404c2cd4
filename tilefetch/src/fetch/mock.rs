//! Scripted fetch executor for unit tests.

use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::types::{FetchError, FetchExecutor, FetchRequest};

/// Mock executor returning scripted outcomes per URL.
///
/// Outcomes queued with [`MockFetcher::script`] are consumed in order; once
/// a URL's script is empty the fallback outcome is returned. The mock also
/// records every call and the peak number of concurrent fetches.
pub(crate) struct MockFetcher {
    scripts: Mutex<HashMap<String, VecDeque<Result<Bytes, FetchError>>>>,
    fallback: Result<Bytes, FetchError>,
    delay: Duration,
    calls: Mutex<Vec<String>>,
    in_flight_by_url: Mutex<HashMap<String, usize>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    peak_in_flight_per_url: AtomicUsize,
}

impl MockFetcher {
    fn with_fallback(fallback: Result<Bytes, FetchError>) -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            fallback,
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
            in_flight_by_url: Mutex::new(HashMap::new()),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            peak_in_flight_per_url: AtomicUsize::new(0),
        }
    }

    /// Every unscripted fetch returns a valid PNG.
    pub(crate) fn succeeding() -> Self {
        Self::with_fallback(Ok(super::png_bytes()))
    }

    /// Every unscripted fetch fails with a network error.
    pub(crate) fn failing() -> Self {
        Self::with_fallback(Err(FetchError::Network("mock failure".to_string())))
    }

    /// Holds every fetch open for `delay` before answering.
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Queues outcomes for `url`.
    pub(crate) fn script(&self, url: &str, outcomes: Vec<Result<Bytes, FetchError>>) {
        self.scripts
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .extend(outcomes);
    }

    /// URLs fetched so far, in call order.
    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of fetches started so far.
    pub(crate) fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Highest number of simultaneous fetches observed.
    pub(crate) fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneous fetches of one URL observed.
    pub(crate) fn peak_in_flight_per_url(&self) -> usize {
        self.peak_in_flight_per_url.load(Ordering::SeqCst)
    }

    fn next_outcome(&self, url: &str) -> Result<Bytes, FetchError> {
        self.scripts
            .lock()
            .unwrap()
            .get_mut(url)
            .and_then(|queue| queue.pop_front())
            .unwrap_or_else(|| self.fallback.clone())
    }

    fn enter(&self, url: &str) -> InFlight<'_> {
        let total = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(total, Ordering::SeqCst);

        let mut by_url = self.in_flight_by_url.lock().unwrap();
        let count = by_url.entry(url.to_string()).or_insert(0);
        *count += 1;
        self.peak_in_flight_per_url
            .fetch_max(*count, Ordering::SeqCst);

        InFlight {
            fetcher: self,
            url: url.to_string(),
        }
    }
}

/// Decrements the in-flight counters when a fetch finishes or is dropped.
struct InFlight<'a> {
    fetcher: &'a MockFetcher,
    url: String,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.fetcher.in_flight.fetch_sub(1, Ordering::SeqCst);
        if let Ok(mut by_url) = self.fetcher.in_flight_by_url.lock() {
            if let Some(count) = by_url.get_mut(&self.url) {
                *count = count.saturating_sub(1);
            }
        }
    }
}

impl FetchExecutor for MockFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<Bytes, FetchError> {
        let url = request.url();
        self.calls.lock().unwrap().push(url.to_string());

        let _in_flight = self.enter(url);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        self.next_outcome(url)
    }
}
