//! # Taskchain
//!
//! Composable asynchronous task chains with context-aware dispatch.
//!
//! A chain is a fluent sequence of work units ("nodes") that execute in
//! order, each possibly on a different execution context, possibly
//! delayed, possibly repeated, with a single terminal error sink. The
//! engine never runs its own threads: it decides *where* and *when* each
//! node fires and delegates execution to a pluggable dispatcher.
//!
//! ## Core Pieces
//!
//! - **Chain engine**: the node arena, the fire/refire/forward protocol,
//!   repetition handling, delay scheduling, and the error-unwind walk
//!   that locates a terminal handler.
//! - **Dispatchers**: `ThreadDispatcher` (dedicated OS threads, one
//!   serialized primary worker plus per-priority background workers),
//!   `TokioDispatcher` (tokio runtime, `tokio-runtime` feature), and
//!   `InlineDispatcher` (synchronous, for tests and development).
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use taskchain::config::DispatcherConfig;
//! use taskchain::core::ChainNode;
//! use taskchain::runtime::{Priority, ThreadDispatcher};
//!
//! let dispatcher = Arc::new(ThreadDispatcher::new(&DispatcherConfig::new())?);
//!
//! let head = ChainNode::<u64>::new(dispatcher);
//! head.transform(|_| Ok(Some(fetch_id()?)))
//!     .background(Priority::High)
//!     .transform(|id| Ok(id.map(enrich)))
//!     .after(Duration::from_secs(1))
//!     .effect(|| publish())
//!     .catching(|fault| tracing::error!(%fault, "pipeline failed"));
//! head.fire();
//! ```
//!
//! ## Semantics Worth Knowing
//!
//! - Firing never blocks the caller; continuation is driven by the
//!   dispatcher invoking the submitted job.
//! - Refires of one node are strictly sequential, and node i+1 is never
//!   submitted before node i completes and forwards.
//! - A fault unwinds to the chain's tail *as it exists at unwind time*;
//!   if the tail is not an error handler the fault is logged and dropped.
//! - A node deferred with `after` resumes on the primary context even
//!   when it selected a background context (inherited scheduler
//!   behavior, kept deliberately; see DESIGN.md).
//!
//! For complete examples, see `tests/chain_test.rs`.

#![deny(warnings)]
#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Chain engine: node model, firing protocol, and error unwind.
pub mod core;
/// Configuration models for dispatchers and worker sizing.
pub mod config;
/// Builders to construct dispatchers from configuration.
pub mod builders;
/// Dispatcher implementations and the scheduler adapter contract.
pub mod runtime;
/// Shared utilities.
pub mod util;
