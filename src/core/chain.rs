//! Chain arena, fluent builder surface, and the firing engine.
//!
//! A chain is an arena of nodes addressed by stable ids; the only
//! owning edge is `next`. Every structural mutation (appends,
//! scheduling attributes, repetition decrements, state transitions)
//! happens under one arena-wide mutex (single-writer discipline), while
//! actions and handlers always run outside it, so an action may extend
//! its own chain. The shape a firing or unwind step observes is the
//! shape at the instant it takes the lock.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::core::error::{ActionResult, Fault};
use crate::core::node::{Action, ChainCounters, ChainStats, Node, NodeId, NodeState};
use crate::runtime::dispatch::{Dispatch, ExecContext, Job, Priority};

/// Shared per-chain state: the node arena, the dispatcher, counters.
struct ChainInner<T> {
    id: Uuid,
    dispatcher: Arc<dyn Dispatch>,
    nodes: Mutex<Vec<Node<T>>>,
    counters: ChainCounters,
}

/// A handle to one node of a task chain; the fluent builder surface.
///
/// Handles are cheap to clone and share the chain they point into.
/// Appending an action to the node this handle addresses finalizes it
/// and returns a handle to the freshly created successor, so calls
/// chain left to right:
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use taskchain::core::ChainNode;
/// use taskchain::runtime::{Priority, ThreadDispatcher};
/// use taskchain::config::DispatcherConfig;
///
/// let dispatcher = Arc::new(ThreadDispatcher::new(&DispatcherConfig::new())?);
/// let head = ChainNode::<i32>::new(dispatcher);
/// head.transform(|_| Ok(Some(1)))
///     .background(Priority::High)
///     .transform(|n| Ok(n.map(|n| n * 2)))
///     .catching(|fault| eprintln!("chain failed: {fault}"));
/// head.fire();
/// ```
///
/// Scheduling attributes (`context`, `after`, `repeat`) apply to the
/// node about to receive an action, i.e. the current unfinished node,
/// never retroactively. Once a node is finalized, further appends or
/// attribute changes on it are logged and ignored.
pub struct ChainNode<T> {
    inner: Arc<ChainInner<T>>,
    node: NodeId,
}

impl<T> Clone for ChainNode<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            node: self.node,
        }
    }
}

/// Value-less chain: a convenience for sequences of pure side effects,
/// where only [`ChainNode::effect`] appends are meaningful. A thin
/// alias with no engine logic of its own.
pub type EffectChain = ChainNode<()>;

impl<T: Send + 'static> ChainNode<T> {
    /// Create a new chain and return a handle to its head node.
    ///
    /// The dispatcher is explicit; there is no implicit global context.
    /// The head starts on [`ExecContext::Primary`], and every successor
    /// inherits its predecessor's context unless overridden.
    #[must_use]
    pub fn new(dispatcher: Arc<dyn Dispatch>) -> Self {
        let inner = Arc::new(ChainInner {
            id: Uuid::new_v4(),
            dispatcher,
            nodes: Mutex::new(vec![Node::head()]),
            counters: ChainCounters::default(),
        });
        Self { inner, node: 0 }
    }

    /// Finalize this node with a fallible value-to-value action and
    /// return the newly created successor.
    ///
    /// The action receives the value produced upstream (`None` when the
    /// predecessor was an effect or produced nothing) and, on success,
    /// yields the input for the node downstream.
    pub fn transform<F>(&self, f: F) -> Self
    where
        F: Fn(Option<T>) -> ActionResult<Option<T>> + Send + Sync + 'static,
    {
        self.finalize(Action::Transform(Arc::new(f)))
    }

    /// Finalize this node with a fallible side effect and return the
    /// newly created successor. The successor's input is absent.
    pub fn effect<F>(&self, f: F) -> Self
    where
        F: Fn() -> ActionResult<()> + Send + Sync + 'static,
    {
        self.finalize(Action::Effect(Arc::new(f)))
    }

    /// Finalize this node as the chain's terminal fault sink.
    ///
    /// No successor is created. The handler runs only when a fault
    /// unwinds to the chain's tail and this node is that tail; normal
    /// firing never enters it.
    pub fn catching<F>(&self, handler: F)
    where
        F: Fn(Fault) + Send + Sync + 'static,
    {
        let mut nodes = self.inner.nodes.lock();
        if nodes[self.node].action.is_some() {
            warn!(
                chain_id = %self.inner.id,
                node = self.node,
                "node already finalized; handler ignored"
            );
            return;
        }
        nodes[self.node].action = Some(Action::ErrorHandler(Arc::new(handler)));
    }

    /// Select the execution context this node fires on.
    pub fn context(&self, context: ExecContext) -> Self {
        self.scheduling(|node| node.context = context)
    }

    /// Shorthand for [`Self::context`] with [`ExecContext::Primary`].
    pub fn primary(&self) -> Self {
        self.context(ExecContext::Primary)
    }

    /// Shorthand for [`Self::context`] with a background priority.
    pub fn background(&self, priority: Priority) -> Self {
        self.context(ExecContext::Background(priority))
    }

    /// Defer this node's firing by `delay`.
    ///
    /// The deferral applies to every firing of the node, repetitions
    /// included. Deferred work resumes on the primary context
    /// regardless of the node's configured context (see the firing
    /// engine).
    pub fn after(&self, delay: Duration) -> Self {
        self.scheduling(|node| node.delay = Some(delay))
    }

    /// Run this node's action `times` times (min 1) before control
    /// passes downstream. Repetition repeats successes only: a fault
    /// aborts the remaining repetitions and unwinds immediately.
    pub fn repeat(&self, times: u32) -> Self {
        if times == 0 {
            warn!(chain_id = %self.inner.id, node = self.node, "repeat(0) clamped to 1");
        }
        self.scheduling(move |node| node.repetition = times.max(1))
    }

    /// Fire this node with no input value.
    ///
    /// Returns immediately; execution continues on the dispatcher's
    /// contexts. Firing a node with no action ends the chain silently,
    /// and firing an error-handler node is a no-op.
    pub fn fire(&self) {
        ChainInner::fire(&self.inner, self.node, None);
    }

    /// Fire this node with an input value.
    pub fn fire_with(&self, value: T) {
        ChainInner::fire(&self.inner, self.node, Some(value));
    }

    /// Handle to the head node of this chain, found by walking the
    /// non-owning `previous` references.
    #[must_use]
    pub fn head(&self) -> Self {
        let nodes = self.inner.nodes.lock();
        let mut cursor = self.node;
        while let Some(previous) = nodes[cursor].previous {
            cursor = previous;
        }
        drop(nodes);
        Self {
            inner: Arc::clone(&self.inner),
            node: cursor,
        }
    }

    /// Current lifecycle state of this node.
    #[must_use]
    pub fn state(&self) -> NodeState {
        self.inner.nodes.lock()[self.node].state
    }

    /// Identifier of the chain this handle points into.
    #[must_use]
    pub fn chain_id(&self) -> Uuid {
        self.inner.id
    }

    /// Snapshot of the chain's execution counters.
    #[must_use]
    pub fn stats(&self) -> ChainStats {
        self.inner.counters.snapshot()
    }

    /// Assign an action to the current unfinished node and eagerly
    /// create its successor.
    fn finalize(&self, action: Action<T>) -> Self {
        let mut nodes = self.inner.nodes.lock();
        if nodes[self.node].action.is_some() {
            warn!(
                chain_id = %self.inner.id,
                node = self.node,
                "node already finalized; append ignored"
            );
            return self.clone();
        }
        let context = nodes[self.node].context;
        nodes[self.node].action = Some(action);
        let successor = nodes.len();
        nodes.push(Node::successor(self.node, context));
        nodes[self.node].next = Some(successor);
        drop(nodes);
        Self {
            inner: Arc::clone(&self.inner),
            node: successor,
        }
    }

    /// Apply a scheduling-attribute change to the current unfinished
    /// node. Ignored once the node is finalized.
    fn scheduling(&self, apply: impl FnOnce(&mut Node<T>)) -> Self {
        let mut nodes = self.inner.nodes.lock();
        let node = &mut nodes[self.node];
        if node.action.is_some() {
            warn!(
                chain_id = %self.inner.id,
                node = self.node,
                "node already finalized; scheduling change ignored"
            );
        } else {
            apply(node);
        }
        drop(nodes);
        self.clone()
    }
}

impl<T: Send + 'static> ChainInner<T> {
    /// Schedule one firing of `id` with `value` as its input.
    fn fire(inner: &Arc<Self>, id: NodeId, value: Option<T>) {
        let (context, delay) = {
            let mut nodes = inner.nodes.lock();
            let node = &mut nodes[id];
            match node.action {
                // An unfinished node ends the chain silently.
                None => return,
                // Handlers are entered through unwind only; firing one
                // is a terminal no-op.
                Some(Action::ErrorHandler(_)) => return,
                Some(_) => {}
            }
            node.state = NodeState::Scheduled;
            (node.context, node.delay)
        };

        let chained = Arc::clone(inner);
        let job: Job = Box::new(move || Self::invoke(&chained, id, value));
        match delay {
            None => inner.dispatcher.submit(job, context),
            // Deferred work resumes on the primary context no matter
            // which context the node selected. Inherited scheduler
            // behavior; see DESIGN.md before changing.
            Some(delay) => inner
                .dispatcher
                .submit_after(job, delay, ExecContext::Primary),
        }
    }

    /// Run one invocation of `id`: execute the action, then refire,
    /// forward, or unwind. Runs on a dispatcher context.
    fn invoke(inner: &Arc<Self>, id: NodeId, value: Option<T>) {
        let (action, remaining) = {
            let mut nodes = inner.nodes.lock();
            let node = &mut nodes[id];
            let Some(action) = node.action.clone() else {
                return;
            };
            node.state = NodeState::Running;
            node.repetition = node.repetition.saturating_sub(1);
            (action, node.repetition)
        };
        inner.counters.actions_fired.fetch_add(1, Ordering::Relaxed);

        let outcome = match action {
            Action::Transform(f) => f(value),
            Action::Effect(f) => f().map(|()| None),
            // Unreachable through fire, which filters handler nodes;
            // the arm keeps the action match exhaustive.
            Action::ErrorHandler(_) => return,
        };

        match outcome {
            Ok(produced) => {
                let next = {
                    let mut nodes = inner.nodes.lock();
                    let node = &mut nodes[id];
                    node.state = NodeState::Completed;
                    node.next
                };
                if remaining > 0 {
                    debug!(chain_id = %inner.id, node = id, remaining, "re-firing node");
                    Self::fire(inner, id, produced);
                } else {
                    inner.counters.nodes_completed.fetch_add(1, Ordering::Relaxed);
                    if let Some(next) = next {
                        Self::fire(inner, next, produced);
                    } else {
                        debug!(chain_id = %inner.id, node = id, "chain ended");
                    }
                }
            }
            Err(fault) => {
                inner.nodes.lock()[id].state = NodeState::Faulted;
                inner.counters.faults_raised.fetch_add(1, Ordering::Relaxed);
                Self::unwind(inner, id, fault);
            }
        }
    }

    /// Walk from the faulted node to the chain's tail and deliver the
    /// fault to a terminal handler, or drop it with a diagnostic.
    fn unwind(inner: &Arc<Self>, from: NodeId, fault: Fault) {
        // The receiving tail is decided by the chain's shape at unwind
        // time, not at fault time: a node appended after the fault can
        // become the handler.
        let tail_action = {
            let nodes = inner.nodes.lock();
            let mut cursor = from;
            while let Some(next) = nodes[cursor].next {
                cursor = next;
            }
            nodes[cursor].action.clone()
        };

        match tail_action {
            Some(Action::ErrorHandler(handler)) => {
                inner.counters.faults_handled.fetch_add(1, Ordering::Relaxed);
                handler(fault);
            }
            Some(_) => {
                inner.counters.faults_dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    chain_id = %inner.id,
                    origin = from,
                    error = %fault,
                    "chain tail is not an error handler; fault dropped"
                );
            }
            None => {
                inner.counters.faults_dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    chain_id = %inner.id,
                    origin = from,
                    error = %fault,
                    "chain tail has no action; fault dropped"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::inline::InlineDispatcher;
    use anyhow::anyhow;
    use std::sync::atomic::AtomicUsize;

    fn inline() -> (Arc<InlineDispatcher>, Arc<dyn Dispatch>) {
        let dispatcher = Arc::new(InlineDispatcher::new());
        let dynamic: Arc<dyn Dispatch> = Arc::clone(&dispatcher) as Arc<dyn Dispatch>;
        (dispatcher, dynamic)
    }

    #[test]
    fn test_values_forward_in_append_order() {
        let (_, dispatcher) = inline();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let head = ChainNode::<i32>::new(dispatcher);
        let s1 = Arc::clone(&seen);
        let s2 = Arc::clone(&seen);
        let s3 = Arc::clone(&seen);
        head.transform(move |input| {
            s1.lock().push((1, input));
            Ok(Some(9870))
        })
        .transform(move |input| {
            s2.lock().push((2, input));
            Ok(None)
        })
        .transform(move |input| {
            s3.lock().push((3, input));
            Ok(None)
        });
        head.fire();

        let seen = seen.lock();
        assert_eq!(
            *seen,
            vec![(1, None), (2, Some(9870)), (3, None)],
        );
    }

    #[test]
    fn test_fire_without_action_is_silent() {
        let (recorder, dispatcher) = inline();
        let head = ChainNode::<i32>::new(dispatcher);
        head.fire();

        assert!(recorder.submissions().is_empty());
        assert_eq!(head.stats().actions_fired, 0);
        assert_eq!(head.state(), NodeState::Idle);
    }

    #[test]
    fn test_repetition_runs_exactly_n_times_before_forwarding() {
        let (_, dispatcher) = inline();
        let counter = Arc::new(AtomicUsize::new(0));
        let downstream_at = Arc::new(AtomicUsize::new(0));

        let head = EffectChain::new(dispatcher);
        let c = Arc::clone(&counter);
        let c2 = Arc::clone(&counter);
        let d = Arc::clone(&downstream_at);
        head.repeat(100)
            .effect(move || {
                c.fetch_add(1, Ordering::Relaxed);
                Ok(())
            })
            .effect(move || {
                d.store(c2.load(Ordering::Relaxed), Ordering::Relaxed);
                Ok(())
            });
        head.fire();

        assert_eq!(counter.load(Ordering::Relaxed), 100);
        // Downstream only entered after the full repetition run.
        assert_eq!(downstream_at.load(Ordering::Relaxed), 100);
        assert_eq!(head.stats().actions_fired, 101);
        assert_eq!(head.stats().nodes_completed, 2);
    }

    #[test]
    fn test_fault_aborts_repetition_and_skips_downstream() {
        let (_, dispatcher) = inline();
        let attempts = Arc::new(AtomicUsize::new(0));
        let downstream = Arc::new(AtomicUsize::new(0));
        let faults = Arc::new(Mutex::new(Vec::new()));

        let head = EffectChain::new(dispatcher);
        let a = Arc::clone(&attempts);
        let d = Arc::clone(&downstream);
        let f = Arc::clone(&faults);
        head.repeat(10)
            .effect(move || {
                // Third attempt fails; repetition repeats successes only.
                if a.fetch_add(1, Ordering::Relaxed) == 2 {
                    return Err(anyhow!("boom"));
                }
                Ok(())
            })
            .effect(move || {
                d.fetch_add(1, Ordering::Relaxed);
                Ok(())
            })
            .catching(move |fault| f.lock().push(fault.to_string()));
        head.fire();

        assert_eq!(attempts.load(Ordering::Relaxed), 3);
        assert_eq!(downstream.load(Ordering::Relaxed), 0);
        assert_eq!(*faults.lock(), vec!["boom".to_string()]);
        assert_eq!(head.stats().faults_raised, 1);
        assert_eq!(head.stats().faults_handled, 1);
    }

    #[test]
    fn test_handler_node_is_never_entered_by_normal_firing() {
        let (_, dispatcher) = inline();
        let handled = Arc::new(AtomicUsize::new(0));

        let head = EffectChain::new(dispatcher);
        let h = Arc::clone(&handled);
        head.effect(|| Ok(())).catching(move |_| {
            h.fetch_add(1, Ordering::Relaxed);
        });
        head.fire();

        assert_eq!(handled.load(Ordering::Relaxed), 0);
        assert_eq!(head.stats().faults_raised, 0);
        // The effect completed and forwarded; firing the handler node
        // was the terminal no-op.
        assert_eq!(head.stats().nodes_completed, 1);
    }

    #[test]
    fn test_unhandled_fault_is_dropped_with_diagnostic() {
        let (_, dispatcher) = inline();
        let head = ChainNode::<i32>::new(dispatcher);
        let _tail = head.transform(|_| Err(anyhow!("lost")));
        head.fire();

        assert_eq!(head.stats().faults_raised, 1);
        assert_eq!(head.stats().faults_handled, 0);
        assert_eq!(head.stats().faults_dropped, 1);
        assert_eq!(head.state(), NodeState::Faulted);
    }

    #[test]
    fn test_unwind_targets_tail_at_unwind_time() {
        // A handler attached to the tail handle after the chain was
        // built (but before the fault unwinds) still receives the
        // fault: the shape is read at unwind time.
        let (_, dispatcher) = inline();
        let handled = Arc::new(AtomicUsize::new(0));

        let head = ChainNode::<i32>::new(dispatcher);
        let tail = head.transform(|_| Err(anyhow!("late")));
        let h = Arc::clone(&handled);
        tail.catching(move |_| {
            h.fetch_add(1, Ordering::Relaxed);
        });
        head.fire();

        assert_eq!(handled.load(Ordering::Relaxed), 1);
        assert_eq!(head.stats().faults_handled, 1);
    }

    #[test]
    fn test_deferred_firing_resumes_on_primary_context() {
        let (recorder, dispatcher) = inline();
        let head = EffectChain::new(dispatcher);
        head.effect(|| Ok(()))
            .background(Priority::High)
            .after(Duration::from_millis(250))
            .effect(|| Ok(()));
        head.fire();

        let records = recorder.submissions();
        assert_eq!(records.len(), 2);
        assert!(!records[0].delayed);
        // The second node selected a background context, but its
        // deferred firing was anchored to the primary context.
        assert!(records[1].delayed);
        assert_eq!(records[1].context, ExecContext::Primary);
    }

    #[test]
    fn test_context_inheritance_and_override() {
        let (recorder, dispatcher) = inline();
        let head = EffectChain::new(dispatcher);
        head.background(Priority::Low)
            .effect(|| Ok(()))
            // inherits Low from its predecessor
            .effect(|| Ok(()))
            .primary()
            .effect(|| Ok(()));
        head.fire();

        let contexts: Vec<_> = recorder.submissions().iter().map(|s| s.context).collect();
        assert_eq!(
            contexts,
            vec![
                ExecContext::Background(Priority::Low),
                ExecContext::Background(Priority::Low),
                ExecContext::Primary,
            ],
        );
    }

    #[test]
    fn test_append_to_finalized_node_is_ignored() {
        let (_, dispatcher) = inline();
        let ran = Arc::new(AtomicUsize::new(0));

        let head = EffectChain::new(dispatcher);
        let r1 = Arc::clone(&ran);
        let tail = head.effect(move || {
            r1.fetch_add(1, Ordering::Relaxed);
            Ok(())
        });
        // Second append to the already-finalized head: ignored, handle
        // still addresses the head.
        let dup = head.effect(|| Ok(()));
        head.repeat(5);
        head.after(Duration::from_secs(1));
        assert_eq!(dup.state(), head.state());
        drop(tail);
        head.fire();

        assert_eq!(ran.load(Ordering::Relaxed), 1);
        assert_eq!(head.stats().actions_fired, 1);
    }

    #[test]
    fn test_head_walks_previous_references() {
        let (_, dispatcher) = inline();
        let ran = Arc::new(AtomicUsize::new(0));

        let head = EffectChain::new(dispatcher);
        let r = Arc::clone(&ran);
        let tail = head
            .effect(|| Ok(()))
            .effect(move || {
                r.fetch_add(1, Ordering::Relaxed);
                Ok(())
            });
        assert_eq!(tail.chain_id(), head.chain_id());
        tail.head().fire();

        assert_eq!(ran.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_fire_with_feeds_first_transform() {
        let (_, dispatcher) = inline();
        let seen = Arc::new(Mutex::new(None));

        let head = ChainNode::<i32>::new(dispatcher);
        let s = Arc::clone(&seen);
        head.transform(move |input| {
            *s.lock() = input;
            Ok(None)
        });
        head.fire_with(7);

        assert_eq!(*seen.lock(), Some(7));
    }
}
