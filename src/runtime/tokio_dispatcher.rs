//! Tokio runtime dispatcher implementation.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::warn;

use crate::core::error::DispatcherError;

use super::dispatch::{Dispatch, ExecContext, Job};

/// Dispatcher that executes jobs on a tokio runtime.
///
/// The primary context is serialized through a single consumer task;
/// background priorities all share the runtime's worker pool, since
/// tokio has no priority lanes. Delays use `tokio::time::sleep`, so no
/// extra timer thread is needed.
#[derive(Clone)]
pub struct TokioDispatcher {
    handle: tokio::runtime::Handle,
    primary_tx: mpsc::UnboundedSender<Job>,
    /// Keeps a self-owned runtime alive; `None` when built from a
    /// borrowed handle.
    _runtime: Option<Arc<tokio::runtime::Runtime>>,
}

impl TokioDispatcher {
    /// Create a dispatcher from an existing tokio runtime handle.
    #[must_use]
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self::build(handle, None)
    }

    /// Create a dispatcher with its own multi-threaded runtime.
    ///
    /// # Errors
    ///
    /// Returns `DispatcherError::Spawn` if the runtime cannot be built.
    pub fn with_worker_threads(worker_threads: usize) -> Result<Self, DispatcherError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(worker_threads)
            .thread_name("tc-tokio")
            .enable_all()
            .build()
            .map_err(DispatcherError::Spawn)?;
        let handle = runtime.handle().clone();
        Ok(Self::build(handle, Some(Arc::new(runtime))))
    }

    fn build(handle: tokio::runtime::Handle, runtime: Option<Arc<tokio::runtime::Runtime>>) -> Self {
        let (primary_tx, mut primary_rx) = mpsc::unbounded_channel::<Job>();
        // Single consumer serializes the primary context.
        handle.spawn(async move {
            while let Some(job) = primary_rx.recv().await {
                job();
            }
        });
        Self {
            handle,
            primary_tx,
            _runtime: runtime,
        }
    }
}

impl Dispatch for TokioDispatcher {
    fn submit(&self, job: Job, context: ExecContext) {
        match context {
            ExecContext::Primary => {
                if self.primary_tx.send(job).is_err() {
                    warn!("primary consumer gone; job dropped");
                }
            }
            ExecContext::Background(_) => {
                self.handle.spawn(async move {
                    job();
                });
            }
        }
    }

    fn submit_after(&self, job: Job, delay: Duration, context: ExecContext) {
        let primary_tx = self.primary_tx.clone();
        self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            match context {
                ExecContext::Primary => {
                    if primary_tx.send(job).is_err() {
                        warn!("primary consumer gone; delayed job dropped");
                    }
                }
                ExecContext::Background(_) => job(),
            }
        });
    }
}
