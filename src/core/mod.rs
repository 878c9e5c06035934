//! Chain engine: node model, firing protocol, and error unwind.

pub mod chain;
pub mod error;
pub mod node;

pub use chain::{ChainNode, EffectChain};
pub use error::{ActionResult, DispatcherError, Fault};
pub use node::{ChainStats, NodeState};
