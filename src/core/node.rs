//! Node data model for task chains.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::core::error::{ActionResult, Fault};
use crate::runtime::dispatch::ExecContext;

/// Stable arena index addressing one node within its chain.
pub(crate) type NodeId = usize;

pub(crate) type TransformFn<T> = Arc<dyn Fn(Option<T>) -> ActionResult<Option<T>> + Send + Sync>;
pub(crate) type EffectFn = Arc<dyn Fn() -> ActionResult<()> + Send + Sync>;
pub(crate) type HandlerFn = Arc<dyn Fn(Fault) + Send + Sync>;

/// The one action a node may own. Exhaustively matched by both the
/// firing protocol and the unwind protocol.
pub(crate) enum Action<T> {
    /// Fallible value-to-value step.
    Transform(TransformFn<T>),
    /// Fallible side effect; produces no value for the successor.
    Effect(EffectFn),
    /// Terminal fault sink; only ever invoked by the unwind protocol.
    ErrorHandler(HandlerFn),
}

impl<T> Clone for Action<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Transform(f) => Self::Transform(Arc::clone(f)),
            Self::Effect(f) => Self::Effect(Arc::clone(f)),
            Self::ErrorHandler(f) => Self::ErrorHandler(Arc::clone(f)),
        }
    }
}

/// Lifecycle state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Created, not yet fired.
    Idle,
    /// Handed to the dispatcher, waiting to run.
    Scheduled,
    /// Action currently executing.
    Running,
    /// Action finished successfully. Re-enters `Scheduled` while
    /// repetitions remain.
    Completed,
    /// Action raised a fault.
    Faulted,
}

/// One link of a chain, stored in the chain's arena.
///
/// `next` is the only owning edge; `previous` is a lookup-only
/// back-reference, never used for destruction ordering.
pub(crate) struct Node<T> {
    pub action: Option<Action<T>>,
    pub next: Option<NodeId>,
    pub previous: Option<NodeId>,
    pub context: ExecContext,
    pub delay: Option<Duration>,
    pub repetition: u32,
    pub state: NodeState,
}

impl<T> Node<T> {
    /// The head node of a fresh chain.
    pub fn head() -> Self {
        Self {
            action: None,
            next: None,
            previous: None,
            context: ExecContext::Primary,
            delay: None,
            repetition: 1,
            state: NodeState::Idle,
        }
    }

    /// A successor created the moment `previous` received its action.
    /// Inherits the predecessor's context.
    pub fn successor(previous: NodeId, context: ExecContext) -> Self {
        Self {
            action: None,
            next: None,
            previous: Some(previous),
            context,
            delay: None,
            repetition: 1,
            state: NodeState::Idle,
        }
    }
}

/// Statistics about one chain's execution.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChainStats {
    /// Action invocations, counting each repetition.
    pub actions_fired: u64,
    /// Nodes that exhausted their repetitions and forwarded.
    pub nodes_completed: u64,
    /// Faults raised by actions.
    pub faults_raised: u64,
    /// Faults delivered to a terminal handler.
    pub faults_handled: u64,
    /// Faults dropped because no handler was at the tail.
    pub faults_dropped: u64,
}

/// Internal chain counters (lock-free atomics).
#[derive(Debug, Default)]
pub(crate) struct ChainCounters {
    pub actions_fired: AtomicU64,
    pub nodes_completed: AtomicU64,
    pub faults_raised: AtomicU64,
    pub faults_handled: AtomicU64,
    pub faults_dropped: AtomicU64,
}

impl ChainCounters {
    /// Get a snapshot of current statistics.
    pub fn snapshot(&self) -> ChainStats {
        ChainStats {
            actions_fired: self.actions_fired.load(Ordering::Relaxed),
            nodes_completed: self.nodes_completed.load(Ordering::Relaxed),
            faults_raised: self.faults_raised.load(Ordering::Relaxed),
            faults_handled: self.faults_handled.load(Ordering::Relaxed),
            faults_dropped: self.faults_dropped.load(Ordering::Relaxed),
        }
    }
}
