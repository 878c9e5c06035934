//! Configuration models for dispatchers and worker sizing.

pub mod dispatcher;

pub use dispatcher::{DispatchBackendConfig, DispatcherConfig};
