//! Request scheduler
//!
//! The scheduler is the process-wide gate that limits how many tile fetches
//! run at once. It knows nothing about tiles or retries: it queues
//! [`FetchRequest`](crate::fetch::FetchRequest)s, admits them to a
//! [`FetchExecutor`](crate::fetch::FetchExecutor) when capacity allows, and
//! reports exactly one [`Completion`] per submitted job.
//!
//! ```text
//!  submit ──► deferred (FIFO) ──update()──► active (tokio tasks)
//!                 │                              │
//!              cancel                         fetch done / aborted
//!                 ▼                              ▼
//!               ready ─────────────► next_completion() ──► event loop
//! ```
//!
//! # Example
//!
//! ```ignore
//! use tilefetch::scheduler::{JobQueue, RequestScheduler, SchedulerConfig};
//!
//! let mut scheduler = RequestScheduler::new(executor, SchedulerConfig::default());
//! let id = scheduler.submit(FetchRequest::new("https://tile.example.com/0/0/0.png"));
//! scheduler.update();
//! while let Some(completion) = scheduler.next_completion().await {
//!     // route completion.outcome to whoever owns completion.id
//! }
//! ```

mod config;
mod core;

pub use config::{SchedulerConfig, DEFAULT_MAX_REQUESTS, DEFAULT_MAX_REQUESTS_PER_SERVER};
pub use core::{Completion, JobQueue, RequestId, RequestScheduler, SchedulerStats};
