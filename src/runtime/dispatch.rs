//! The scheduler adapter contract consumed by the chain engine.
//!
//! The engine never runs work itself: it decides *where* (an execution
//! context) and *when* (immediately or after a delay) a job runs, then
//! hands the job to a [`Dispatch`] implementation. Submission is
//! fire-and-forget; continuation is driven by the adapter invoking the
//! job, which triggers the next firing step.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A unit of work handed to a dispatcher. Runs to completion once
/// invoked; never yields internally.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Relative priority of a background execution context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Latency-sensitive background work.
    High,
    /// Default background priority.
    Normal,
    /// Best-effort background work.
    Low,
}

/// Named destination for scheduled work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecContext {
    /// The single serialized context. Jobs submitted here run one at a
    /// time, in submission order.
    Primary,
    /// A background context distinguished by priority. No ordering is
    /// guaranteed across independent submissions.
    Background(Priority),
}

/// Fire-and-forget work submission onto named execution contexts.
///
/// Implementations own the actual threads or event loop; the chain
/// engine only routes. Neither method blocks the caller or reports
/// completion: delivery failures (e.g. submission after shutdown) are
/// logged and dropped.
pub trait Dispatch: Send + Sync + 'static {
    /// Dispatch `job` onto `context` as soon as the context is free.
    fn submit(&self, job: Job, context: ExecContext);

    /// Dispatch `job` onto `context` once `delay` has elapsed. The delay
    /// is wall-clock, measured from the submission instant.
    fn submit_after(&self, job: Job, delay: Duration, context: ExecContext);
}
