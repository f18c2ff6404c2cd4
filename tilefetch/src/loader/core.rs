//! The tile loader event loop.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, trace, warn};

use super::config::LoaderConfig;
use crate::coord::TileCoord;
use crate::fetch::{DecodedImage, FetchError, FetchExecutor, FetchRequest, ImageDecoder, RasterDecoder};
use crate::handle::{HandleError, Release, TileHandle, TileState};
use crate::provider::ImageryProvider;
use crate::request::{TileRequestState, Transition};
use crate::retry::{NeverRetry, RetryPolicy};
use crate::scheduler::{Completion, RequestId, RequestScheduler, SchedulerStats};

/// A consumer's reference to a tile handle.
///
/// Obtained from [`TileLoader::request_tile`] and given back with
/// [`TileLoader::release`]. A reference outlives the handle it points to
/// only as a stale value: every lookup through it fails once the handle
/// has been torn down, even if the same tile is requested again later.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TileRef {
    coord: TileCoord,
    generation: u64,
}

impl TileRef {
    /// The referenced tile.
    pub fn coord(&self) -> TileCoord {
        self.coord
    }

    /// The generation of the handle this reference belongs to.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// A failure notification published on every failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileFailure {
    /// The tile whose fetch failed.
    pub coord: TileCoord,
    /// Failures observed before this one.
    pub times_retried: u32,
    /// Why the attempt failed.
    pub reason: FetchError,
    /// Whether another attempt was authorized.
    pub retrying: bool,
}

/// Errors from misusing the loader API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoaderError {
    /// The reference does not match a live handle.
    #[error("No live handle for tile {coord} (generation {generation})")]
    UnknownTile { coord: TileCoord, generation: u64 },

    /// Handle misuse.
    #[error(transparent)]
    Handle(#[from] HandleError),
}

/// Drives tile requests from acquisition to a terminal state.
///
/// The loader owns the scheduler, every tile handle and every request
/// state machine. All of them are mutated only through `&mut self`, which
/// makes the loader the single cooperative event loop for tile loading:
/// two outcomes for the same tile can never be processed at once.
/// Network I/O happens in tasks spawned by the scheduler and comes back
/// through [`tick`](Self::tick).
pub struct TileLoader<E: FetchExecutor> {
    provider: Arc<dyn ImageryProvider>,
    scheduler: RequestScheduler<E>,
    decoder: Arc<dyn ImageDecoder>,
    policy: Arc<dyn RetryPolicy>,
    config: LoaderConfig,
    handles: HashMap<TileCoord, TileHandle>,
    jobs: HashMap<RequestId, TileCoord>,
    next_generation: u64,
    failures: broadcast::Sender<TileFailure>,
    teardowns: u64,
}

impl<E: FetchExecutor> TileLoader<E> {
    /// Creates a loader fetching `provider` tiles with `executor`.
    ///
    /// Failures are not retried until a policy is set.
    pub fn new(provider: Arc<dyn ImageryProvider>, executor: Arc<E>, config: LoaderConfig) -> Self {
        let (failures, _) = broadcast::channel(config.failure_channel_capacity());
        Self {
            provider,
            scheduler: RequestScheduler::new(executor, config.scheduler()),
            decoder: Arc::new(RasterDecoder),
            policy: Arc::new(NeverRetry),
            config,
            handles: HashMap::new(),
            jobs: HashMap::new(),
            next_generation: 0,
            failures,
            teardowns: 0,
        }
    }

    /// Sets the retry policy.
    pub fn with_retry_policy(mut self, policy: impl RetryPolicy + 'static) -> Self {
        self.policy = Arc::new(policy);
        self
    }

    /// Replaces the retry policy.
    ///
    /// Takes effect from the next failure.
    pub fn set_retry_policy(&mut self, policy: Arc<dyn RetryPolicy>) {
        self.policy = policy;
    }

    /// Sets the image decoder.
    pub fn with_decoder(mut self, decoder: impl ImageDecoder + 'static) -> Self {
        self.decoder = Arc::new(decoder);
        self
    }

    /// Acquires a reference to `coord`'s handle.
    ///
    /// The first reference creates the handle and starts loading it. Later
    /// references share the handle in whatever state it is in; a `Failed`
    /// handle stays failed until [`refetch`](Self::refetch). Tiles the
    /// provider cannot serve get an `Invalid` handle and are never fetched.
    pub fn request_tile(&mut self, coord: TileCoord) -> Result<TileRef, LoaderError> {
        if let Some(handle) = self.handles.get_mut(&coord) {
            handle.acquire();
            return Ok(TileRef {
                coord,
                generation: handle.generation(),
            });
        }

        let generation = self.next_generation;
        self.next_generation += 1;

        if !self.provider.is_valid_tile(&coord) {
            debug!(coord = %coord, "Tile outside provider range");
            let mut handle = TileHandle::invalid(coord, generation);
            handle.acquire();
            self.handles.insert(coord, handle);
            return Ok(TileRef { coord, generation });
        }

        let mut handle = TileHandle::new(coord, generation);
        handle.acquire();
        let job = handle.begin_loading(self.new_request(coord), &mut self.scheduler)?;
        self.jobs.insert(job, coord);
        self.handles.insert(coord, handle);

        Ok(TileRef { coord, generation })
    }

    fn new_request(&self, coord: TileCoord) -> TileRequestState {
        let request = FetchRequest::new(self.provider.url_for(&coord))
            .with_cross_origin(self.config.cross_origin());
        TileRequestState::new(coord, request)
    }

    /// Gives back a reference.
    ///
    /// Releasing the last reference tears the handle down: any in-flight
    /// fetch is cancelled, the image is dropped, and the handle is removed.
    pub fn release(&mut self, tile: TileRef) -> Result<Release, LoaderError> {
        let handle = self
            .handles
            .get_mut(&tile.coord)
            .filter(|handle| handle.generation() == tile.generation)
            .ok_or(LoaderError::UnknownTile {
                coord: tile.coord,
                generation: tile.generation,
            })?;

        let release = handle.release()?;
        if release == Release::LastReference {
            if let Some(handle) = self.handles.remove(&tile.coord) {
                if let Some(job) = handle.teardown(&mut self.scheduler) {
                    self.jobs.remove(&job);
                }
                self.teardowns += 1;
            }
        }
        Ok(release)
    }

    /// Starts a fresh load of a settled tile.
    ///
    /// This is the only way to retry a tile after it has failed. Returns
    /// `Ok(false)` if the tile is still loading or is invalid.
    pub fn refetch(&mut self, tile: &TileRef) -> Result<bool, LoaderError> {
        let request = self.new_request(tile.coord);
        let handle = self
            .handles
            .get_mut(&tile.coord)
            .filter(|handle| handle.generation() == tile.generation)
            .ok_or(LoaderError::UnknownTile {
                coord: tile.coord,
                generation: tile.generation,
            })?;

        if !matches!(handle.state(), TileState::Failed | TileState::Received) {
            return Ok(false);
        }

        let job = handle.begin_loading(request, &mut self.scheduler)?;
        self.jobs.insert(job, tile.coord);
        info!(coord = %tile.coord, "Tile refetch requested");
        Ok(true)
    }

    /// Resubmits due retries and admits queued jobs.
    ///
    /// Returns the number of jobs admitted to the executor.
    pub fn update(&mut self) -> usize {
        self.resubmit_due_retries(Instant::now());
        self.scheduler.update()
    }

    /// Resubmits every retry whose delay has elapsed by `now`.
    pub fn resubmit_due_retries(&mut self, now: Instant) -> usize {
        let mut resubmitted = 0;
        for handle in self.handles.values_mut() {
            let coord = handle.coord();
            if let Some(request) = handle.request_mut() {
                if let Some(job) = request.resubmit_if_due(now, &mut self.scheduler) {
                    self.jobs.insert(job, coord);
                    resubmitted += 1;
                }
            }
        }
        resubmitted
    }

    /// Earliest pending retry deadline across all tiles.
    pub fn next_retry_deadline(&self) -> Option<Instant> {
        self.handles
            .values()
            .filter_map(|handle| handle.request().and_then(TileRequestState::retry_deadline))
            .min()
    }

    /// Applies one scheduler completion.
    ///
    /// Completions for jobs that belong to no live request (torn down or
    /// superseded) are dropped.
    pub fn dispatch(&mut self, completion: Completion) {
        let Completion { id, outcome } = completion;

        let Some(coord) = self.jobs.remove(&id) else {
            trace!(job = %id, "Dropping completion for unknown job");
            return;
        };
        let Some(handle) = self.handles.get_mut(&coord) else {
            trace!(job = %id, coord = %coord, "Dropping completion for torn-down tile");
            return;
        };
        let Some(request) = handle.request_mut() else {
            return;
        };

        let decode = self.config.decode_options();
        let outcome = outcome.and_then(|bytes| {
            self.decoder
                .decode(&bytes, &decode)
                .map_err(FetchError::from)
        });

        match request.on_outcome(id, outcome, self.policy.as_ref()) {
            Transition::Ignored => {}
            Transition::Succeeded(image) => {
                handle.mark_received(image);
            }
            Transition::Retrying {
                reason,
                times_retried,
                delay,
            } => {
                warn!(
                    coord = %coord,
                    times_retried,
                    delay_ms = delay.as_millis() as u64,
                    error = %reason,
                    "Tile fetch failed, retrying"
                );
                if delay.is_zero() {
                    if let Some(job) = request.resubmit_if_due(Instant::now(), &mut self.scheduler) {
                        self.jobs.insert(job, coord);
                    }
                }
                let _ = self.failures.send(TileFailure {
                    coord,
                    times_retried,
                    reason,
                    retrying: true,
                });
            }
            Transition::Failed(reason) => {
                let times_retried = request.times_retried();
                warn!(
                    coord = %coord,
                    times_retried,
                    error = %reason,
                    "Tile fetch failed"
                );
                handle.mark_failed();
                let _ = self.failures.send(TileFailure {
                    coord,
                    times_retried,
                    reason,
                    retrying: false,
                });
            }
        }
    }

    /// Runs one step of the event loop.
    ///
    /// Admits queued work, then applies one completion, waiting for a
    /// running fetch or the next retry deadline if nothing is ready.
    /// Returns false when there is nothing left to wait for.
    pub async fn tick(&mut self) -> bool {
        self.update();

        if let Some(completion) = self.scheduler.try_next_completion() {
            self.dispatch(completion);
            return true;
        }

        let running = self.scheduler.active_count() > 0;
        let completion = match (running, self.next_retry_deadline()) {
            (false, None) => return false,
            (false, Some(deadline)) => {
                tokio::time::sleep_until(deadline.into()).await;
                None
            }
            (true, None) => self.scheduler.next_completion().await,
            (true, Some(deadline)) => {
                tokio::select! {
                    completion = self.scheduler.next_completion() => completion,
                    _ = tokio::time::sleep_until(deadline.into()) => None,
                }
            }
        };

        if let Some(completion) = completion {
            self.dispatch(completion);
        }
        true
    }

    /// Runs the event loop until every tile is settled.
    pub async fn run_until_idle(&mut self) {
        while self.tick().await {}
        debug!(stats = ?self.scheduler.stats(), "Tile loader idle");
    }

    /// Returns true if no fetch is queued, running or waiting to retry.
    pub fn is_idle(&self) -> bool {
        self.scheduler.is_idle() && self.next_retry_deadline().is_none()
    }

    /// Subscribes to failure notifications.
    pub fn subscribe_failures(&self) -> broadcast::Receiver<TileFailure> {
        self.failures.subscribe()
    }

    fn live_handle(&self, tile: &TileRef) -> Option<&TileHandle> {
        self.handles
            .get(&tile.coord)
            .filter(|handle| handle.generation() == tile.generation)
    }

    /// The handle behind a reference.
    pub fn handle(&self, tile: &TileRef) -> Option<&TileHandle> {
        self.live_handle(tile)
    }

    /// Current state of a tile.
    pub fn state(&self, tile: &TileRef) -> Option<TileState> {
        self.live_handle(tile).map(TileHandle::state)
    }

    /// The tile's image, once received.
    pub fn image(&self, tile: &TileRef) -> Option<&DecodedImage> {
        self.live_handle(tile).and_then(TileHandle::image)
    }

    /// Current reference count of a tile.
    pub fn reference_count(&self, tile: &TileRef) -> Option<u32> {
        self.live_handle(tile).map(TileHandle::reference_count)
    }

    /// Retries authorized so far for a tile's current load.
    pub fn times_retried(&self, tile: &TileRef) -> Option<u32> {
        self.live_handle(tile)
            .and_then(TileHandle::request)
            .map(TileRequestState::times_retried)
    }

    /// The last failure of a tile, once failed.
    pub fn failure(&self, tile: &TileRef) -> Option<&FetchError> {
        self.live_handle(tile)
            .and_then(TileHandle::request)
            .and_then(TileRequestState::failure)
    }

    /// Subscribes to a tile's state changes.
    pub fn watch(&self, tile: &TileRef) -> Option<watch::Receiver<TileState>> {
        self.live_handle(tile).map(TileHandle::watch)
    }

    /// Number of live handles.
    pub fn tile_count(&self) -> usize {
        self.handles.len()
    }

    /// Number of handles torn down so far.
    pub fn teardown_count(&self) -> u64 {
        self.teardowns
    }

    /// Scheduler activity counters.
    pub fn stats(&self) -> SchedulerStats {
        self.scheduler.stats()
    }

    /// The scheduler.
    pub fn scheduler(&self) -> &RequestScheduler<E> {
        &self.scheduler
    }

    /// The imagery provider.
    pub fn provider(&self) -> &dyn ImageryProvider {
        self.provider.as_ref()
    }
}
