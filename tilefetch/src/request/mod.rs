//! Tile request state machine
//!
//! A [`TileRequestState`] owns the lifecycle of one logical tile fetch:
//!
//! ```text
//!  Unstarted ──start──► Requesting ──Ok──────────────► Succeeded
//!                        ▲      │
//!                        │      └─Err──► policy ──give up──► Failed
//!                 resubmit_if_due          │
//!                        │               retry
//!                        └── Retrying ◄────┘
//! ```
//!
//! `Succeeded` and `Failed` are terminal. Only `Requesting` holds a
//! scheduler job, so at most one attempt is ever outstanding. Outcomes for
//! any other job are ignored.
//!
//! The state machine never waits and never spawns: the owner feeds it
//! outcomes and clock ticks from its event loop.

use std::time::{Duration, Instant};
use tracing::{debug, trace};

use crate::coord::TileCoord;
use crate::fetch::{DecodedImage, FetchError, FetchRequest};
use crate::retry::{RetryContext, RetryPolicy, MAX_RETRY_DELAY};
use crate::scheduler::{JobQueue, RequestId};

/// Errors from misusing a [`TileRequestState`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    /// `start` was called after the request had already started.
    #[error("Tile request for {coord} already started")]
    AlreadyStarted { coord: TileCoord },
}

/// Result of one fetch attempt.
#[derive(Debug, Clone)]
pub enum AttemptOutcome {
    /// The attempt has not resolved yet.
    Pending,
    /// The attempt produced an image.
    Succeeded,
    /// The attempt failed.
    Failed(FetchError),
}

/// The current attempt. Superseded attempts are discarded.
#[derive(Debug, Clone)]
pub struct FetchAttempt {
    index: u32,
    started_at: Instant,
    outcome: AttemptOutcome,
}

impl FetchAttempt {
    fn new(index: u32) -> Self {
        Self {
            index,
            started_at: Instant::now(),
            outcome: AttemptOutcome::Pending,
        }
    }

    /// Zero-based attempt number.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// When the attempt was submitted.
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// How the attempt resolved, if it has.
    pub fn outcome(&self) -> &AttemptOutcome {
        &self.outcome
    }
}

/// Lifecycle phase of a tile request.
#[derive(Debug, Clone)]
pub enum RequestPhase {
    /// Not submitted yet.
    Unstarted,
    /// One job is outstanding.
    Requesting { job: RequestId },
    /// Waiting to resubmit.
    Retrying { not_before: Instant },
    /// Terminal: the image arrived.
    Succeeded { image: DecodedImage },
    /// Terminal: the last failure and no retry authorized.
    Failed { reason: FetchError },
}

impl RequestPhase {
    /// Short phase name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Unstarted => "unstarted",
            Self::Requesting { .. } => "requesting",
            Self::Retrying { .. } => "retrying",
            Self::Succeeded { .. } => "succeeded",
            Self::Failed { .. } => "failed",
        }
    }
}

/// What an outcome did to the request.
#[derive(Debug, Clone)]
pub enum Transition {
    /// The outcome was stale or arrived after a terminal state.
    Ignored,
    /// Reached `Succeeded`.
    Succeeded(DecodedImage),
    /// The policy authorized another attempt.
    Retrying {
        /// The failure being retried.
        reason: FetchError,
        /// Failures before this one (the value the policy was given).
        times_retried: u32,
        /// Wait before resubmission.
        delay: Duration,
    },
    /// Reached `Failed`.
    Failed(FetchError),
}

/// State of one logical tile fetch.
#[derive(Debug)]
pub struct TileRequestState {
    coord: TileCoord,
    request: FetchRequest,
    times_retried: u32,
    attempt: Option<FetchAttempt>,
    phase: RequestPhase,
}

impl TileRequestState {
    /// Creates an unstarted request for `coord`, fetched via `request`.
    pub fn new(coord: TileCoord, request: FetchRequest) -> Self {
        Self {
            coord,
            request,
            times_retried: 0,
            attempt: None,
            phase: RequestPhase::Unstarted,
        }
    }

    /// Submits the first attempt.
    pub fn start(&mut self, queue: &mut impl JobQueue) -> Result<RequestId, RequestError> {
        if !matches!(self.phase, RequestPhase::Unstarted) {
            return Err(RequestError::AlreadyStarted { coord: self.coord });
        }
        Ok(self.submit(queue))
    }

    fn submit(&mut self, queue: &mut impl JobQueue) -> RequestId {
        let job = queue.submit(self.request.clone());
        self.attempt = Some(FetchAttempt::new(self.times_retried));
        self.phase = RequestPhase::Requesting { job };
        trace!(
            coord = %self.coord,
            job = %job,
            attempt = self.times_retried,
            "Tile attempt submitted"
        );
        job
    }

    /// Applies the outcome of `job`.
    ///
    /// Successes and cancellations are final without consulting `policy`.
    /// Any other failure is passed to `policy` with the current retry count.
    pub fn on_outcome(
        &mut self,
        job: RequestId,
        outcome: Result<DecodedImage, FetchError>,
        policy: &dyn RetryPolicy,
    ) -> Transition {
        match self.phase {
            RequestPhase::Requesting { job: outstanding } if outstanding == job => {}
            _ => {
                trace!(
                    coord = %self.coord,
                    job = %job,
                    phase = self.phase.name(),
                    "Ignoring outcome for job that is not outstanding"
                );
                return Transition::Ignored;
            }
        }

        let reason = match outcome {
            Ok(image) => {
                self.set_attempt_outcome(AttemptOutcome::Succeeded);
                self.phase = RequestPhase::Succeeded {
                    image: image.clone(),
                };
                debug!(
                    coord = %self.coord,
                    times_retried = self.times_retried,
                    "Tile request succeeded"
                );
                return Transition::Succeeded(image);
            }
            Err(reason) => reason,
        };

        self.set_attempt_outcome(AttemptOutcome::Failed(reason.clone()));

        let decision = if reason.is_cancelled() {
            None
        } else {
            policy
                .decide(&RetryContext {
                    coord: self.coord,
                    times_retried: self.times_retried,
                    reason: &reason,
                })
                .delay()
        };

        match decision {
            Some(delay) => {
                let delay = delay.min(MAX_RETRY_DELAY);
                let now = Instant::now();
                let seen = self.times_retried;
                self.times_retried += 1;
                self.phase = RequestPhase::Retrying {
                    not_before: now.checked_add(delay).unwrap_or(now),
                };
                debug!(
                    coord = %self.coord,
                    times_retried = self.times_retried,
                    delay_ms = delay.as_millis() as u64,
                    error = %reason,
                    "Tile request will retry"
                );
                Transition::Retrying {
                    reason,
                    times_retried: seen,
                    delay,
                }
            }
            None => {
                self.phase = RequestPhase::Failed {
                    reason: reason.clone(),
                };
                debug!(
                    coord = %self.coord,
                    times_retried = self.times_retried,
                    error = %reason,
                    "Tile request failed"
                );
                Transition::Failed(reason)
            }
        }
    }

    fn set_attempt_outcome(&mut self, outcome: AttemptOutcome) {
        if let Some(attempt) = self.attempt.as_mut() {
            attempt.outcome = outcome;
        }
    }

    /// Resubmits a retrying request once its delay has elapsed.
    ///
    /// Returns the new job, or `None` if nothing was due.
    pub fn resubmit_if_due(&mut self, now: Instant, queue: &mut impl JobQueue) -> Option<RequestId> {
        match self.phase {
            RequestPhase::Retrying { not_before } if now >= not_before => Some(self.submit(queue)),
            _ => None,
        }
    }

    /// When the pending retry becomes due, if one is pending.
    pub fn retry_deadline(&self) -> Option<Instant> {
        match self.phase {
            RequestPhase::Retrying { not_before } => Some(not_before),
            _ => None,
        }
    }

    /// Aborts the request.
    ///
    /// Any outstanding job is cancelled with the queue and the request ends
    /// `Failed` with [`FetchError::Cancelled`]. Terminal requests are left
    /// untouched. Returns the job that was cancelled, if any.
    pub fn cancel(&mut self, queue: &mut impl JobQueue) -> Option<RequestId> {
        let cancelled = match self.phase {
            RequestPhase::Requesting { job } => {
                queue.cancel(job);
                Some(job)
            }
            RequestPhase::Unstarted | RequestPhase::Retrying { .. } => None,
            RequestPhase::Succeeded { .. } | RequestPhase::Failed { .. } => return None,
        };

        self.set_attempt_outcome(AttemptOutcome::Failed(FetchError::Cancelled));
        self.phase = RequestPhase::Failed {
            reason: FetchError::Cancelled,
        };
        cancelled
    }

    /// The job currently outstanding, if any.
    pub fn outstanding_job(&self) -> Option<RequestId> {
        match self.phase {
            RequestPhase::Requesting { job } => Some(job),
            _ => None,
        }
    }

    /// The tile being fetched.
    pub fn coord(&self) -> TileCoord {
        self.coord
    }

    /// The request submitted for each attempt.
    pub fn request(&self) -> &FetchRequest {
        &self.request
    }

    /// Number of retries authorized so far.
    pub fn times_retried(&self) -> u32 {
        self.times_retried
    }

    /// The current (or last) attempt.
    pub fn attempt(&self) -> Option<&FetchAttempt> {
        self.attempt.as_ref()
    }

    /// The current phase.
    pub fn phase(&self) -> &RequestPhase {
        &self.phase
    }

    /// Returns true once `Succeeded` or `Failed` is reached.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.phase,
            RequestPhase::Succeeded { .. } | RequestPhase::Failed { .. }
        )
    }

    /// Returns true while waiting to resubmit.
    pub fn is_retrying(&self) -> bool {
        matches!(self.phase, RequestPhase::Retrying { .. })
    }

    /// The image, once succeeded.
    pub fn image(&self) -> Option<&DecodedImage> {
        match &self.phase {
            RequestPhase::Succeeded { image } => Some(image),
            _ => None,
        }
    }

    /// The final failure, once failed.
    pub fn failure(&self) -> Option<&FetchError> {
        match &self.phase {
            RequestPhase::Failed { reason } => Some(reason),
            _ => None,
        }
    }
}
