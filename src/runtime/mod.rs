//! Dispatcher implementations and the scheduler adapter contract.

pub mod dispatch;
pub mod inline;
pub mod thread_dispatcher;
#[cfg(feature = "tokio-runtime")]
pub mod tokio_dispatcher;

pub use dispatch::{Dispatch, ExecContext, Job, Priority};
pub use inline::{InlineDispatcher, Submission};
pub use thread_dispatcher::{DispatcherStats, ThreadDispatcher};
#[cfg(feature = "tokio-runtime")]
pub use tokio_dispatcher::TokioDispatcher;
