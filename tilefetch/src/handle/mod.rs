//! Reference-counted tile handles
//!
//! A [`TileHandle`] is the consumer-facing object for one tile's image. Any
//! number of consumers share it through [`acquire`](TileHandle::acquire) and
//! [`release`](TileHandle::release); the release that brings the count to
//! zero reports [`Release::LastReference`] and the owner then calls
//! [`teardown`](TileHandle::teardown), which consumes the handle so it can
//! never be used again.
//!
//! Consumers observe the handle's [`TileState`] through a `watch` channel.
//! A terminal state (`Received` or `Failed`) is published exactly once per
//! load.

use tokio::sync::watch;
use tracing::{debug, trace};

use crate::coord::TileCoord;
use crate::fetch::DecodedImage;
use crate::request::{RequestError, TileRequestState};
use crate::scheduler::{JobQueue, RequestId};

/// Visible state of a tile handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TileState {
    /// No load has been started.
    Unloaded,
    /// A request is in progress (including retry waits).
    Loading,
    /// The image is available.
    Received,
    /// The load ended without an image.
    Failed,
    /// The tile lies outside the provider's valid range.
    Invalid,
}

impl TileState {
    /// Returns true for `Received`, `Failed` and `Invalid`.
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Received | Self::Failed | Self::Invalid)
    }
}

/// Result of a successful release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    /// Other references remain; carries the new count.
    Retained(u32),
    /// The count reached zero and the handle must be torn down.
    LastReference,
}

/// Handle usage errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandleError {
    /// `release` was called with no outstanding references.
    #[error("Tile {coord} released more times than it was acquired")]
    OverRelease { coord: TileCoord },

    /// The handle could not start its request.
    #[error(transparent)]
    Request(#[from] RequestError),
}

/// Shared handle for one tile's image.
#[derive(Debug)]
pub struct TileHandle {
    coord: TileCoord,
    generation: u64,
    reference_count: u32,
    image: Option<DecodedImage>,
    state_tx: watch::Sender<TileState>,
    request: Option<TileRequestState>,
}

impl TileHandle {
    /// Creates an unloaded handle with no references.
    pub fn new(coord: TileCoord, generation: u64) -> Self {
        let (state_tx, _) = watch::channel(TileState::Unloaded);
        Self {
            coord,
            generation,
            reference_count: 0,
            image: None,
            state_tx,
            request: None,
        }
    }

    /// Creates a handle for a tile that can never be loaded.
    pub fn invalid(coord: TileCoord, generation: u64) -> Self {
        let handle = Self::new(coord, generation);
        handle.state_tx.send_replace(TileState::Invalid);
        handle
    }

    /// Adds a reference and returns the new count.
    pub fn acquire(&mut self) -> u32 {
        self.reference_count = self.reference_count.saturating_add(1);
        trace!(coord = %self.coord, references = self.reference_count, "Tile acquired");
        self.reference_count
    }

    /// Drops a reference.
    ///
    /// Releasing with no outstanding reference is an error and leaves the
    /// count at zero.
    pub fn release(&mut self) -> Result<Release, HandleError> {
        if self.reference_count == 0 {
            return Err(HandleError::OverRelease { coord: self.coord });
        }

        self.reference_count -= 1;
        trace!(coord = %self.coord, references = self.reference_count, "Tile released");

        if self.reference_count == 0 {
            Ok(Release::LastReference)
        } else {
            Ok(Release::Retained(self.reference_count))
        }
    }

    /// Starts `request` and moves the handle to `Loading`.
    ///
    /// Any previous request and image are discarded.
    pub fn begin_loading(
        &mut self,
        mut request: TileRequestState,
        queue: &mut impl JobQueue,
    ) -> Result<RequestId, HandleError> {
        let job = request.start(queue)?;
        self.request = Some(request);
        self.image = None;
        self.state_tx.send_replace(TileState::Loading);
        debug!(coord = %self.coord, job = %job, "Tile loading");
        Ok(job)
    }

    /// Attaches the image and moves `Loading` to `Received`.
    ///
    /// Returns false (and changes nothing) from any other state.
    pub fn mark_received(&mut self, image: DecodedImage) -> bool {
        if self.state() != TileState::Loading {
            return false;
        }
        self.image = Some(image);
        self.state_tx.send_replace(TileState::Received);
        true
    }

    /// Moves `Loading` to `Failed`.
    ///
    /// Returns false (and changes nothing) from any other state.
    pub fn mark_failed(&mut self) -> bool {
        if self.state() != TileState::Loading {
            return false;
        }
        self.state_tx.send_replace(TileState::Failed);
        true
    }

    /// Ends the handle's life: cancels any outstanding job and releases
    /// the image.
    ///
    /// Returns the job that was cancelled, if one was in flight.
    pub fn teardown(mut self, queue: &mut impl JobQueue) -> Option<RequestId> {
        let cancelled = self.request.as_mut().and_then(|request| request.cancel(queue));
        self.image = None;
        debug!(
            coord = %self.coord,
            generation = self.generation,
            cancelled = cancelled.is_some(),
            "Tile handle torn down"
        );
        cancelled
    }

    /// Subscribes to state changes.
    pub fn watch(&self) -> watch::Receiver<TileState> {
        self.state_tx.subscribe()
    }

    /// The tile this handle represents.
    pub fn coord(&self) -> TileCoord {
        self.coord
    }

    /// Distinguishes this handle from earlier handles for the same tile.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Current number of references.
    pub fn reference_count(&self) -> u32 {
        self.reference_count
    }

    /// Current state.
    pub fn state(&self) -> TileState {
        *self.state_tx.borrow()
    }

    /// The image, once received.
    pub fn image(&self) -> Option<&DecodedImage> {
        self.image.as_ref()
    }

    /// The request driving the current load.
    pub fn request(&self) -> Option<&TileRequestState> {
        self.request.as_ref()
    }

    /// Mutable access to the request driving the current load.
    pub fn request_mut(&mut self) -> Option<&mut TileRequestState> {
        self.request.as_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{DecodeOptions, FetchError, FetchRequest, ImageDecoder, RasterDecoder};
    use crate::retry::NeverRetry;
    use proptest::prelude::*;

    #[derive(Default)]
    struct CountingQueue {
        submitted: u64,
        cancelled: Vec<RequestId>,
    }

    impl JobQueue for CountingQueue {
        fn submit(&mut self, _request: FetchRequest) -> RequestId {
            self.submitted += 1;
            RequestId::new(self.submitted)
        }

        fn cancel(&mut self, id: RequestId) -> bool {
            self.cancelled.push(id);
            true
        }
    }

    fn coord() -> TileCoord {
        TileCoord::new(2, 1, 3)
    }

    fn request() -> TileRequestState {
        TileRequestState::new(coord(), FetchRequest::new("server/2/3/1.png"))
    }

    #[test]
    fn test_new_handle_is_unloaded() {
        let handle = TileHandle::new(coord(), 7);
        assert_eq!(handle.state(), TileState::Unloaded);
        assert_eq!(handle.reference_count(), 0);
        assert_eq!(handle.generation(), 7);
        assert!(handle.image().is_none());
    }

    #[test]
    fn test_invalid_handle() {
        let handle = TileHandle::invalid(coord(), 0);
        assert_eq!(handle.state(), TileState::Invalid);
        assert!(handle.state().is_settled());
    }

    #[test]
    fn test_over_release_is_reported() {
        let mut handle = TileHandle::new(coord(), 0);
        assert_eq!(
            handle.release(),
            Err(HandleError::OverRelease { coord: coord() })
        );
        assert_eq!(handle.reference_count(), 0);
    }

    #[test]
    fn test_acquire_release_counts() {
        let mut handle = TileHandle::new(coord(), 0);
        assert_eq!(handle.acquire(), 1);
        assert_eq!(handle.acquire(), 2);
        assert_eq!(handle.release(), Ok(Release::Retained(1)));
        assert_eq!(handle.release(), Ok(Release::LastReference));
    }

    #[test]
    fn test_loading_then_received_notifies_once() {
        let mut queue = CountingQueue::default();
        let mut handle = TileHandle::new(coord(), 0);
        let mut rx = handle.watch();

        handle.begin_loading(request(), &mut queue).unwrap();
        assert_eq!(handle.state(), TileState::Loading);
        assert!(rx.has_changed().unwrap());
        rx.borrow_and_update();

        let image = RasterDecoder
            .decode(&crate::fetch::png_bytes(), &DecodeOptions::default())
            .unwrap();
        assert!(handle.mark_received(image.clone()));
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), TileState::Received);

        // A second terminal transition is refused and not published
        assert!(!handle.mark_failed());
        assert!(!handle.mark_received(image));
        assert!(!rx.has_changed().unwrap());
        assert!(handle.image().is_some());
    }

    #[test]
    fn test_mark_failed_from_loading() {
        let mut queue = CountingQueue::default();
        let mut handle = TileHandle::new(coord(), 0);

        assert!(!handle.mark_failed());
        handle.begin_loading(request(), &mut queue).unwrap();
        assert!(handle.mark_failed());
        assert_eq!(handle.state(), TileState::Failed);
    }

    #[test]
    fn test_begin_loading_with_started_request_fails() {
        let mut queue = CountingQueue::default();
        let mut handle = TileHandle::new(coord(), 0);
        let mut started = request();
        started.start(&mut queue).unwrap();

        let err = handle.begin_loading(started, &mut queue).unwrap_err();
        assert!(matches!(err, HandleError::Request(_)));
        assert_eq!(handle.state(), TileState::Unloaded);
    }

    #[test]
    fn test_teardown_cancels_in_flight_request() {
        let mut queue = CountingQueue::default();
        let mut handle = TileHandle::new(coord(), 0);
        let job = handle.begin_loading(request(), &mut queue).unwrap();

        assert_eq!(handle.teardown(&mut queue), Some(job));
        assert_eq!(queue.cancelled, vec![job]);
    }

    #[test]
    fn test_teardown_after_failure_cancels_nothing() {
        let mut queue = CountingQueue::default();
        let mut handle = TileHandle::new(coord(), 0);
        let job = handle.begin_loading(request(), &mut queue).unwrap();

        let request = handle.request_mut().unwrap();
        request.on_outcome(job, Err(FetchError::Network("down".into())), &NeverRetry);
        handle.mark_failed();

        assert_eq!(handle.teardown(&mut queue), None);
        assert!(queue.cancelled.is_empty());
    }

    proptest! {
        #[test]
        fn prop_balanced_acquire_release_reaches_zero_once(n in 1u32..64) {
            let mut handle = TileHandle::new(coord(), 0);
            for _ in 0..n {
                handle.acquire();
            }

            let mut last_references = 0;
            for _ in 0..n {
                if handle.release().unwrap() == Release::LastReference {
                    last_references += 1;
                }
            }

            prop_assert_eq!(handle.reference_count(), 0);
            prop_assert_eq!(last_references, 1);
            prop_assert!(handle.release().is_err());
        }
    }
}
