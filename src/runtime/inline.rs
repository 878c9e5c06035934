//! Synchronous inline dispatcher for development and testing.

use std::time::Duration;

use parking_lot::Mutex;

use super::dispatch::{Dispatch, ExecContext, Job};

/// A record of one submission accepted by an [`InlineDispatcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Submission {
    /// Context the job was routed to.
    pub context: ExecContext,
    /// Whether the job arrived via `submit_after`.
    pub delayed: bool,
}

/// Deterministic dispatcher that runs every job immediately on the
/// calling thread.
///
/// Context selection and delays are recorded, not enacted: there are no
/// worker threads and `submit_after` does not sleep. A chain fired
/// through this dispatcher therefore runs to completion before `fire`
/// returns, which makes it the right adapter for unit tests and quick
/// experiments. Not intended for production workloads.
#[derive(Default)]
pub struct InlineDispatcher {
    records: Mutex<Vec<Submission>>,
}

impl InlineDispatcher {
    /// Create an inline dispatcher with an empty submission log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every submission accepted so far, in order.
    #[must_use]
    pub fn submissions(&self) -> Vec<Submission> {
        self.records.lock().clone()
    }
}

impl Dispatch for InlineDispatcher {
    fn submit(&self, job: Job, context: ExecContext) {
        self.records.lock().push(Submission {
            context,
            delayed: false,
        });
        job();
    }

    fn submit_after(&self, job: Job, _delay: Duration, context: ExecContext) {
        self.records.lock().push(Submission {
            context,
            delayed: true,
        });
        job();
    }
}
