//! Error types for chain and dispatcher operations.

use thiserror::Error;

/// Errors produced when constructing or tearing down a dispatcher.
#[derive(Debug, Error)]
pub enum DispatcherError {
    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// A worker or timer thread could not be spawned.
    #[error("worker spawn failed: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Opaque failure value raised by a node's action and carried through the
/// unwind protocol. The engine never inspects it; only a terminal error
/// handler does.
pub type Fault = anyhow::Error;

/// Result of a fallible node action.
pub type ActionResult<T> = Result<T, Fault>;
