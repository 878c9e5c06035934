//! Builders to construct dispatchers from configuration.

use std::sync::Arc;

use crate::config::{DispatchBackendConfig, DispatcherConfig};
use crate::core::error::DispatcherError;
use crate::runtime::{Dispatch, InlineDispatcher, ThreadDispatcher};

/// Build a dispatcher from configuration, selecting the backend.
///
/// # Errors
///
/// Returns `DispatcherError::InvalidConfig` if the configuration is
/// invalid or selects a backend this build does not include, and
/// `DispatcherError::Spawn` if workers cannot be started.
pub fn build_dispatcher(cfg: &DispatcherConfig) -> Result<Arc<dyn Dispatch>, DispatcherError> {
    cfg.validate().map_err(DispatcherError::InvalidConfig)?;

    match cfg.backend {
        DispatchBackendConfig::Threads => Ok(Arc::new(ThreadDispatcher::new(cfg)?)),
        DispatchBackendConfig::Inline => Ok(Arc::new(InlineDispatcher::new())),
        #[cfg(feature = "tokio-runtime")]
        DispatchBackendConfig::Tokio => Ok(Arc::new(
            crate::runtime::TokioDispatcher::with_worker_threads(cfg.normal_workers)?,
        )),
        #[cfg(not(feature = "tokio-runtime"))]
        DispatchBackendConfig::Tokio => Err(DispatcherError::InvalidConfig(
            "tokio backend requires the `tokio-runtime` feature".into(),
        )),
    }
}
