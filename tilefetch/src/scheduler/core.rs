//! The request scheduler.

use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::config::SchedulerConfig;
use crate::fetch::{FetchError, FetchExecutor, FetchRequest};

/// Identifier of a submitted job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl RequestId {
    /// Creates an identifier from its numeric value.
    ///
    /// Intended for [`JobQueue`] implementations other than the scheduler.
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the numeric identifier.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

/// The single result reported for a submitted job.
#[derive(Debug)]
pub struct Completion {
    /// The job this result belongs to.
    pub id: RequestId,
    /// Raw bytes on success; the failure reason otherwise.
    pub outcome: Result<Bytes, FetchError>,
}

/// Counters describing scheduler activity since creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Jobs submitted.
    pub submitted: u64,
    /// Jobs admitted to the executor.
    pub admitted: u64,
    /// Jobs that completed with bytes.
    pub succeeded: u64,
    /// Jobs that completed with a non-cancellation failure.
    pub failed: u64,
    /// Jobs reported as cancelled.
    pub cancelled: u64,
}

/// The submit/cancel half of the scheduler contract.
///
/// The tile request state machine only needs this much of the scheduler,
/// which keeps it testable without a runtime.
pub trait JobQueue {
    /// Queues a job and returns its identifier.
    fn submit(&mut self, request: FetchRequest) -> RequestId;

    /// Cancels a queued or running job.
    ///
    /// Returns false if the job is unknown or already finished.
    fn cancel(&mut self, id: RequestId) -> bool;
}

struct DeferredJob {
    id: RequestId,
    request: FetchRequest,
    server: String,
    enqueued_at: Instant,
}

struct ActiveJob {
    server: String,
    cancel: CancellationToken,
}

/// Gate limiting the number of concurrent outbound fetches.
///
/// Jobs are queued in submission order by [`submit`](JobQueue::submit) and
/// admitted by [`update`](Self::update) while capacity remains. Admitted
/// jobs run as Tokio tasks that only perform the fetch; their results come
/// back through [`try_next_completion`](Self::try_next_completion) /
/// [`next_completion`](Self::next_completion), which must be drained by the
/// owner's event loop. Every submitted job produces exactly one
/// [`Completion`], cancelled jobs included.
///
/// All bookkeeping happens through `&mut self`, so the concurrency counters
/// are only ever touched from the owning event loop.
pub struct RequestScheduler<E: FetchExecutor> {
    executor: Arc<E>,
    config: SchedulerConfig,
    deferred: VecDeque<DeferredJob>,
    active: HashMap<RequestId, ActiveJob>,
    per_server: HashMap<String, usize>,
    ready: VecDeque<Completion>,
    completion_tx: mpsc::UnboundedSender<Completion>,
    completion_rx: mpsc::UnboundedReceiver<Completion>,
    next_id: u64,
    stats: SchedulerStats,
}

impl<E: FetchExecutor> RequestScheduler<E> {
    /// Creates a scheduler running jobs on `executor`.
    pub fn new(executor: Arc<E>, config: SchedulerConfig) -> Self {
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        Self {
            executor,
            config,
            deferred: VecDeque::new(),
            active: HashMap::new(),
            per_server: HashMap::new(),
            ready: VecDeque::new(),
            completion_tx,
            completion_rx,
            next_id: 0,
            stats: SchedulerStats::default(),
        }
    }

    /// Admits deferred jobs while capacity remains.
    ///
    /// Jobs are considered in submission order. A job whose server is at its
    /// per-server limit keeps its place in the queue. Calling this when
    /// nothing changed admits nothing.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// Returns the number of jobs admitted.
    pub fn update(&mut self) -> usize {
        let mut admitted = 0;
        let mut index = 0;

        while index < self.deferred.len() && self.active.len() < self.config.max_requests() {
            let load = self
                .per_server
                .get(&self.deferred[index].server)
                .copied()
                .unwrap_or(0);
            if load >= self.config.max_requests_per_server() {
                index += 1;
                continue;
            }

            if let Some(job) = self.deferred.remove(index) {
                self.start(job);
                admitted += 1;
            }
        }

        if admitted > 0 {
            debug!(
                admitted,
                active = self.active.len(),
                deferred = self.deferred.len(),
                "Scheduler admitted jobs"
            );
        }

        admitted
    }

    fn start(&mut self, job: DeferredJob) {
        let DeferredJob {
            id,
            request,
            server,
            enqueued_at,
        } = job;

        trace!(
            job = %id,
            url = request.url(),
            waited_ms = enqueued_at.elapsed().as_millis() as u64,
            "Job admitted"
        );

        let token = CancellationToken::new();
        *self.per_server.entry(server.clone()).or_insert(0) += 1;
        self.active.insert(
            id,
            ActiveJob {
                server,
                cancel: token.clone(),
            },
        );
        self.stats.admitted += 1;

        let executor = Arc::clone(&self.executor);
        let completion_tx = self.completion_tx.clone();
        tokio::spawn(async move {
            let outcome = tokio::select! {
                biased;
                _ = token.cancelled() => Err(FetchError::Cancelled),
                result = executor.fetch(&request) => result,
            };
            // The receiver only disappears when the scheduler is dropped.
            let _ = completion_tx.send(Completion { id, outcome });
        });
    }

    /// Returns the next available completion without waiting.
    pub fn try_next_completion(&mut self) -> Option<Completion> {
        if let Some(completion) = self.ready.pop_front() {
            return Some(self.settle(completion));
        }

        match self.completion_rx.try_recv() {
            Ok(completion) => Some(self.settle(completion)),
            Err(_) => None,
        }
    }

    /// Waits for the next completion.
    ///
    /// Returns `None` immediately if no job is running and none is ready;
    /// deferred jobs only start after [`update`](Self::update).
    pub async fn next_completion(&mut self) -> Option<Completion> {
        if let Some(completion) = self.ready.pop_front() {
            return Some(self.settle(completion));
        }
        if self.active.is_empty() {
            return None;
        }

        let completion = self.completion_rx.recv().await?;
        Some(self.settle(completion))
    }

    /// Frees the slot held by a finished job and records its outcome.
    fn settle(&mut self, completion: Completion) -> Completion {
        if let Some(job) = self.active.remove(&completion.id) {
            if let Some(load) = self.per_server.get_mut(&job.server) {
                *load = load.saturating_sub(1);
                if *load == 0 {
                    self.per_server.remove(&job.server);
                }
            }
        }

        match &completion.outcome {
            Ok(_) => self.stats.succeeded += 1,
            Err(FetchError::Cancelled) => self.stats.cancelled += 1,
            Err(_) => self.stats.failed += 1,
        }

        completion
    }

    /// Number of jobs currently executing.
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Number of jobs waiting for admission.
    pub fn deferred_count(&self) -> usize {
        self.deferred.len()
    }

    /// Returns true if nothing is queued, running, or waiting to be drained.
    pub fn is_idle(&self) -> bool {
        self.active.is_empty() && self.deferred.is_empty() && self.ready.is_empty()
    }

    /// Returns true if the job has been submitted and not yet drained.
    pub fn is_pending(&self, id: RequestId) -> bool {
        self.active.contains_key(&id)
            || self.deferred.iter().any(|job| job.id == id)
            || self.ready.iter().any(|c| c.id == id)
    }

    /// Activity counters.
    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }

    /// The scheduler's limits.
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }
}

impl<E: FetchExecutor> JobQueue for RequestScheduler<E> {
    fn submit(&mut self, request: FetchRequest) -> RequestId {
        let id = RequestId(self.next_id);
        self.next_id += 1;
        self.stats.submitted += 1;

        let server = server_key(request.url());
        trace!(job = %id, url = request.url(), server = %server, "Job submitted");

        self.deferred.push_back(DeferredJob {
            id,
            request,
            server,
            enqueued_at: Instant::now(),
        });
        id
    }

    fn cancel(&mut self, id: RequestId) -> bool {
        if let Some(position) = self.deferred.iter().position(|job| job.id == id) {
            self.deferred.remove(position);
            self.ready.push_back(Completion {
                id,
                outcome: Err(FetchError::Cancelled),
            });
            debug!(job = %id, "Cancelled deferred job");
            return true;
        }

        if let Some(job) = self.active.get(&id) {
            job.cancel.cancel();
            debug!(job = %id, "Requested abort of running job");
            return true;
        }

        false
    }
}

impl<E: FetchExecutor> Drop for RequestScheduler<E> {
    fn drop(&mut self) {
        for job in self.active.values() {
            job.cancel.cancel();
        }
    }
}

/// Groups URLs by `host:port` for the per-server limit.
///
/// Relative or unparsable URLs share a single local key.
fn server_key(url: &str) -> String {
    match reqwest::Url::parse(url) {
        Ok(parsed) => match (parsed.host_str(), parsed.port_or_known_default()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            _ => String::new(),
        },
        Err(_) => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::mock::MockFetcher;
    use std::time::Duration;

    fn scheduler(fetcher: &Arc<MockFetcher>, max: usize, per_server: usize) -> RequestScheduler<MockFetcher> {
        RequestScheduler::new(
            Arc::clone(fetcher),
            SchedulerConfig::new()
                .with_max_requests(max)
                .with_max_requests_per_server(per_server),
        )
    }

    async fn drain(scheduler: &mut RequestScheduler<MockFetcher>) -> Vec<Completion> {
        let mut completions = Vec::new();
        loop {
            scheduler.update();
            match scheduler.next_completion().await {
                Some(completion) => completions.push(completion),
                None if scheduler.is_idle() => break,
                None => {}
            }
        }
        completions
    }

    #[test]
    fn test_server_key() {
        assert_eq!(server_key("https://tile.example.com/0/0/0.png"), "tile.example.com:443");
        assert_eq!(server_key("http://localhost:8080/a.png"), "localhost:8080");
        assert_eq!(server_key("made/up/osm/server/0/0/0.png"), "");
    }

    #[test]
    fn test_submit_does_not_start_jobs() {
        let fetcher = Arc::new(MockFetcher::succeeding());
        let mut scheduler = scheduler(&fetcher, 4, 4);

        let id = scheduler.submit(FetchRequest::new("a.png"));
        assert_eq!(scheduler.deferred_count(), 1);
        assert_eq!(scheduler.active_count(), 0);
        assert!(scheduler.is_pending(id));
        assert_eq!(scheduler.stats().submitted, 1);
    }

    #[test]
    fn test_request_id_display() {
        let fetcher = Arc::new(MockFetcher::succeeding());
        let mut scheduler = scheduler(&fetcher, 4, 4);
        let first = scheduler.submit(FetchRequest::new("a.png"));
        let second = scheduler.submit(FetchRequest::new("b.png"));
        assert_eq!(first.to_string(), "job-0");
        assert!(second > first);
    }

    #[tokio::test]
    async fn test_update_respects_max_requests() {
        let fetcher = Arc::new(MockFetcher::succeeding().with_delay(Duration::from_millis(20)));
        let mut scheduler = scheduler(&fetcher, 2, 10);

        for i in 0..5 {
            scheduler.submit(FetchRequest::new(format!("{}.png", i)));
        }

        assert_eq!(scheduler.update(), 2);
        assert_eq!(scheduler.active_count(), 2);
        assert_eq!(scheduler.deferred_count(), 3);

        // Nothing changed, nothing admitted
        assert_eq!(scheduler.update(), 0);
        assert_eq!(scheduler.active_count(), 2);

        let completions = drain(&mut scheduler).await;
        assert_eq!(completions.len(), 5);
        assert!(fetcher.peak_in_flight() <= 2);
    }

    #[tokio::test]
    async fn test_fifo_admission() {
        let fetcher = Arc::new(MockFetcher::succeeding());
        let mut scheduler = scheduler(&fetcher, 1, 1);

        let ids: Vec<_> = ["first.png", "second.png", "third.png"]
            .iter()
            .map(|url| scheduler.submit(FetchRequest::new(*url)))
            .collect();

        let completions = drain(&mut scheduler).await;
        let order: Vec<_> = completions.iter().map(|c| c.id).collect();
        assert_eq!(order, ids);
        assert_eq!(fetcher.calls(), vec!["first.png", "second.png", "third.png"]);
    }

    #[tokio::test]
    async fn test_per_server_limit_keeps_queue_position() {
        let fetcher = Arc::new(MockFetcher::succeeding().with_delay(Duration::from_millis(20)));
        let mut scheduler = scheduler(&fetcher, 10, 1);

        let a1 = scheduler.submit(FetchRequest::new("http://a.test/1.png"));
        let a2 = scheduler.submit(FetchRequest::new("http://a.test/2.png"));
        let b1 = scheduler.submit(FetchRequest::new("http://b.test/1.png"));

        assert_eq!(scheduler.update(), 2);
        assert!(scheduler.is_pending(a2));
        assert_eq!(scheduler.deferred_count(), 1);

        let completions = drain(&mut scheduler).await;
        let ids: Vec<_> = completions.iter().map(|c| c.id).collect();
        assert!(ids.contains(&a1) && ids.contains(&a2) && ids.contains(&b1));
        assert_eq!(fetcher.calls().last().map(String::as_str), Some("http://a.test/2.png"));
    }

    #[tokio::test]
    async fn test_cancel_deferred_job() {
        let fetcher = Arc::new(MockFetcher::succeeding());
        let mut scheduler = scheduler(&fetcher, 1, 1);

        let id = scheduler.submit(FetchRequest::new("a.png"));
        assert!(scheduler.cancel(id));
        assert_eq!(scheduler.deferred_count(), 0);

        let completion = scheduler.try_next_completion().unwrap();
        assert_eq!(completion.id, id);
        assert_eq!(completion.outcome.unwrap_err(), FetchError::Cancelled);

        // Exactly once
        assert!(scheduler.try_next_completion().is_none());
        assert_eq!(scheduler.update(), 0);
        assert_eq!(fetcher.call_count(), 0);
        assert_eq!(scheduler.stats().cancelled, 1);
        assert!(scheduler.is_idle());
    }

    #[tokio::test]
    async fn test_cancel_running_job() {
        let fetcher = Arc::new(MockFetcher::succeeding().with_delay(Duration::from_secs(30)));
        let mut scheduler = scheduler(&fetcher, 1, 1);

        let id = scheduler.submit(FetchRequest::new("slow.png"));
        scheduler.update();
        assert_eq!(scheduler.active_count(), 1);

        assert!(scheduler.cancel(id));
        let completion = tokio::time::timeout(Duration::from_secs(5), scheduler.next_completion())
            .await
            .expect("cancelled job should report promptly")
            .unwrap();

        assert_eq!(completion.id, id);
        assert!(matches!(completion.outcome, Err(FetchError::Cancelled)));
        assert_eq!(scheduler.active_count(), 0);
        assert!(scheduler.is_idle());
    }

    #[tokio::test]
    async fn test_cancel_unknown_job() {
        let fetcher = Arc::new(MockFetcher::succeeding());
        let mut scheduler = scheduler(&fetcher, 1, 1);

        let id = scheduler.submit(FetchRequest::new("a.png"));
        let completions = drain(&mut scheduler).await;
        assert_eq!(completions.len(), 1);

        assert!(!scheduler.cancel(id));
    }

    #[tokio::test]
    async fn test_failures_are_reported_not_raised() {
        let fetcher = Arc::new(MockFetcher::failing());
        let mut scheduler = scheduler(&fetcher, 1, 1);

        scheduler.submit(FetchRequest::new("a.png"));
        let completions = drain(&mut scheduler).await;

        assert_eq!(completions.len(), 1);
        assert!(matches!(completions[0].outcome, Err(FetchError::Network(_))));
        assert_eq!(scheduler.stats().failed, 1);
        assert_eq!(scheduler.stats().admitted, 1);
    }

    #[tokio::test]
    async fn test_next_completion_without_running_jobs() {
        let fetcher = Arc::new(MockFetcher::succeeding());
        let mut scheduler = scheduler(&fetcher, 1, 1);

        scheduler.submit(FetchRequest::new("a.png"));
        // Deferred but not admitted
        assert!(scheduler.next_completion().await.is_none());
        assert!(!scheduler.is_idle());
    }
}
