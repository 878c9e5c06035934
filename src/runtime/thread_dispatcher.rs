//! Native dispatcher backed by dedicated OS threads.
//!
//! One thread services the primary context, which is what makes it
//! serialized: jobs submitted there run one at a time, in submission
//! order. Each background priority gets its own small group of worker
//! threads. A timer thread holds delayed jobs in a deadline heap and
//! releases them to their target context when due.
//!
//! # Design Principles
//!
//! - **No polling**: workers block on channel recv; the timer blocks on
//!   a Condvar deadline wait
//! - **Clean shutdown**: dropping the senders unblocks workers naturally
//! - **Fire-and-forget**: submission never blocks and never reports back;
//!   jobs arriving after shutdown are logged and dropped

use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};

use crate::config::DispatcherConfig;
use crate::core::error::DispatcherError;

use super::dispatch::{Dispatch, ExecContext, Job, Priority};

/// Statistics about dispatcher utilization.
#[derive(Debug, Clone, Copy, Default)]
pub struct DispatcherStats {
    /// Jobs handed to a context worker.
    pub submitted_jobs: u64,
    /// Jobs that went through the delay timer.
    pub delayed_jobs: u64,
    /// Jobs discarded because the dispatcher was shut down.
    pub dropped_jobs: u64,
}

/// Internal counters (lock-free atomics).
#[derive(Debug, Default)]
struct DispatchCounters {
    submitted_jobs: AtomicU64,
    delayed_jobs: AtomicU64,
    dropped_jobs: AtomicU64,
}

impl DispatchCounters {
    fn snapshot(&self) -> DispatcherStats {
        DispatcherStats {
            submitted_jobs: self.submitted_jobs.load(Ordering::Relaxed),
            delayed_jobs: self.delayed_jobs.load(Ordering::Relaxed),
            dropped_jobs: self.dropped_jobs.load(Ordering::Relaxed),
        }
    }
}

/// One sender per context lane.
#[derive(Clone)]
struct Lanes {
    primary: Sender<Job>,
    high: Sender<Job>,
    normal: Sender<Job>,
    low: Sender<Job>,
}

impl Lanes {
    fn sender(&self, context: ExecContext) -> &Sender<Job> {
        match context {
            ExecContext::Primary => &self.primary,
            ExecContext::Background(Priority::High) => &self.high,
            ExecContext::Background(Priority::Normal) => &self.normal,
            ExecContext::Background(Priority::Low) => &self.low,
        }
    }
}

/// A job waiting in the timer heap.
struct TimedJob {
    due: Instant,
    seq: u64,
    job: Job,
    context: ExecContext,
}

impl PartialEq for TimedJob {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for TimedJob {}

impl PartialOrd for TimedJob {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimedJob {
    // Reversed so the BinaryHeap surfaces the earliest deadline; seq
    // breaks ties in submission order.
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Shared state between `submit_after` and the timer thread.
struct TimerState {
    queue: Mutex<BinaryHeap<TimedJob>>,
    deadline_changed: Condvar,
    seq: AtomicU64,
}

/// Dispatcher with dedicated OS threads per execution context.
pub struct ThreadDispatcher {
    /// Senders per lane. `None` once shut down; dropping them unblocks
    /// all workers waiting on recv.
    lanes: Mutex<Option<Lanes>>,
    timer: Arc<TimerState>,
    counters: Arc<DispatchCounters>,
    shutdown: Arc<AtomicBool>,
    /// Timer handle first, then workers: the timer holds lane senders,
    /// so it must exit before the workers can disconnect.
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl ThreadDispatcher {
    /// Create a dispatcher with the given configuration.
    ///
    /// Spawns one primary worker, `high_workers` + `normal_workers` +
    /// `low_workers` background workers, and one timer thread.
    ///
    /// # Errors
    ///
    /// Returns `DispatcherError::InvalidConfig` if the configuration is
    /// invalid, or `DispatcherError::Spawn` if a thread cannot be started.
    pub fn new(config: &DispatcherConfig) -> Result<Self, DispatcherError> {
        config.validate().map_err(DispatcherError::InvalidConfig)?;

        let (primary_tx, primary_rx) = unbounded::<Job>();
        let (high_tx, high_rx) = unbounded::<Job>();
        let (normal_tx, normal_rx) = unbounded::<Job>();
        let (low_tx, low_rx) = unbounded::<Job>();

        let lanes = Lanes {
            primary: primary_tx,
            high: high_tx,
            normal: normal_tx,
            low: low_tx,
        };

        let timer = Arc::new(TimerState {
            queue: Mutex::new(BinaryHeap::new()),
            deadline_changed: Condvar::new(),
            seq: AtomicU64::new(0),
        });
        let counters = Arc::new(DispatchCounters::default());
        let shutdown = Arc::new(AtomicBool::new(false));

        let stack = config.thread_stack_size;
        let mut threads = Vec::new();
        threads.push(spawn_worker("tc-primary".into(), primary_rx, stack)?);
        for (prefix, count, rx) in [
            ("tc-bg-high", config.high_workers, &high_rx),
            ("tc-bg-normal", config.normal_workers, &normal_rx),
            ("tc-bg-low", config.low_workers, &low_rx),
        ] {
            for i in 0..count {
                threads.push(spawn_worker(format!("{prefix}-{i}"), rx.clone(), stack)?);
            }
        }
        // Timer last, so a failed spawn above cannot leave it parked; it
        // joins first, since it holds its own clone of the lane senders.
        threads.insert(
            0,
            spawn_timer(Arc::clone(&timer), Arc::clone(&shutdown), lanes.clone(), stack)?,
        );

        info!(
            high_workers = config.high_workers,
            normal_workers = config.normal_workers,
            low_workers = config.low_workers,
            "ThreadDispatcher initialized (no-polling design)"
        );

        Ok(Self {
            lanes: Mutex::new(Some(lanes)),
            timer,
            counters,
            shutdown,
            threads: Mutex::new(threads),
        })
    }

    /// Get current dispatcher statistics.
    #[must_use]
    pub fn stats(&self) -> DispatcherStats {
        self.counters.snapshot()
    }

    /// Shut down the dispatcher gracefully.
    ///
    /// Already-queued jobs drain before their workers exit; delayed jobs
    /// not yet due are discarded. Threads that do not exit within the
    /// join timeout (2 seconds each) are detached to prevent hangs.
    pub fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return; // Already shut down
        }

        info!("shutting down thread dispatcher");

        {
            let mut lanes = self.lanes.lock();
            *lanes = None;
        }
        {
            // Notify under the queue lock so the timer cannot miss the
            // wakeup between its shutdown check and its wait.
            let _queue = self.timer.queue.lock();
            self.timer.deadline_changed.notify_all();
        }

        let mut threads = self.threads.lock();
        for (idx, handle) in threads.drain(..).enumerate() {
            let (tx, rx) = std::sync::mpsc::channel();
            let join_thread = thread::spawn(move || {
                let result = handle.join();
                let _ = tx.send(result.is_ok());
            });

            match rx.recv_timeout(Duration::from_secs(2)) {
                Ok(true) => debug!(thread = idx, "dispatcher thread joined"),
                Ok(false) => warn!(thread = idx, "dispatcher thread panicked"),
                Err(_) => {
                    warn!(thread = idx, "dispatcher thread did not exit within timeout - detaching");
                    continue;
                }
            }
            let _ = join_thread.join();
        }

        info!("thread dispatcher shut down complete");
    }
}

impl Dispatch for ThreadDispatcher {
    fn submit(&self, job: Job, context: ExecContext) {
        let lanes = self.lanes.lock();
        let Some(lanes) = lanes.as_ref() else {
            self.counters.dropped_jobs.fetch_add(1, Ordering::Relaxed);
            warn!(?context, "dispatcher shut down; job dropped");
            return;
        };
        if lanes.sender(context).send(job).is_err() {
            self.counters.dropped_jobs.fetch_add(1, Ordering::Relaxed);
            warn!(?context, "context workers gone; job dropped");
            return;
        }
        self.counters.submitted_jobs.fetch_add(1, Ordering::Relaxed);
    }

    fn submit_after(&self, job: Job, delay: Duration, context: ExecContext) {
        if self.shutdown.load(Ordering::Acquire) {
            self.counters.dropped_jobs.fetch_add(1, Ordering::Relaxed);
            warn!(?context, "dispatcher shut down; delayed job dropped");
            return;
        }
        let timed = TimedJob {
            due: Instant::now() + delay,
            seq: self.timer.seq.fetch_add(1, Ordering::Relaxed),
            job,
            context,
        };
        self.timer.queue.lock().push(timed);
        self.counters.delayed_jobs.fetch_add(1, Ordering::Relaxed);
        self.timer.deadline_changed.notify_one();
    }
}

impl Drop for ThreadDispatcher {
    fn drop(&mut self) {
        // Signal shutdown but DON'T join threads in Drop; explicit
        // shutdown() is required for graceful cleanup.
        if !self.shutdown.swap(true, Ordering::AcqRel) {
            let mut lanes = self.lanes.lock();
            *lanes = None;
            drop(lanes);
            let _queue = self.timer.queue.lock();
            self.timer.deadline_changed.notify_all();
            debug!("ThreadDispatcher dropped without explicit shutdown - threads will be detached");
        }
    }
}

/// Spawn a context worker thread.
fn spawn_worker(
    name: String,
    rx: Receiver<Job>,
    stack_size: usize,
) -> Result<JoinHandle<()>, DispatcherError> {
    let handle = thread::Builder::new()
        .name(name.clone())
        .stack_size(stack_size)
        .spawn(move || {
            debug!(worker = %name, "worker thread started");
            // Blocking recv, NO POLLING. When every sender is dropped,
            // recv returns Err and the worker exits after draining.
            while let Ok(job) = rx.recv() {
                job();
            }
            debug!(worker = %name, "worker thread exiting");
        })?;
    Ok(handle)
}

/// Spawn the timer thread servicing `submit_after`.
fn spawn_timer(
    timer: Arc<TimerState>,
    shutdown: Arc<AtomicBool>,
    lanes: Lanes,
    stack_size: usize,
) -> Result<JoinHandle<()>, DispatcherError> {
    let handle = thread::Builder::new()
        .name("tc-timer".into())
        .stack_size(stack_size)
        .spawn(move || {
            debug!("timer thread started");
            loop {
                let mut queue = timer.queue.lock();
                if shutdown.load(Ordering::Acquire) {
                    let discarded = queue.len();
                    if discarded > 0 {
                        warn!(discarded, "discarding delayed jobs at shutdown");
                    }
                    break;
                }
                let Some(due) = queue.peek().map(|t| t.due) else {
                    timer.deadline_changed.wait(&mut queue);
                    continue;
                };
                if due <= Instant::now() {
                    if let Some(timed) = queue.pop() {
                        drop(queue);
                        if lanes.sender(timed.context).send(timed.job).is_err() {
                            warn!(context = ?timed.context, "context workers gone; delayed job dropped");
                        }
                    }
                } else {
                    let _ = timer.deadline_changed.wait_until(&mut queue, due);
                }
            }
            debug!("timer thread exiting");
        })?;
    Ok(handle)
}
