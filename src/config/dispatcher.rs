//! Dispatcher configuration structures.

use serde::{Deserialize, Serialize};

/// Dispatch backend selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchBackendConfig {
    /// Dedicated OS threads per context (default).
    Threads,
    /// Tokio runtime adapter. Requires the `tokio-runtime` feature.
    Tokio,
    /// Synchronous inline adapter for development/testing.
    Inline,
}

/// Dispatcher configuration.
///
/// The primary context always runs on exactly one worker (that is what
/// makes it serialized), so only the background lanes are sized here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Backend selection.
    pub backend: DispatchBackendConfig,
    /// Worker threads for the high-priority background context.
    pub high_workers: usize,
    /// Worker threads for the normal-priority background context.
    pub normal_workers: usize,
    /// Worker threads for the low-priority background context.
    pub low_workers: usize,
    /// Stack size for each worker thread, in bytes.
    pub thread_stack_size: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl DispatcherConfig {
    /// Default stack size per worker thread (2 MiB).
    pub const DEFAULT_STACK_SIZE: usize = 2 * 1024 * 1024;

    /// Create a configuration with defaults sized from the host CPU count.
    #[must_use]
    pub fn new() -> Self {
        Self {
            backend: DispatchBackendConfig::Threads,
            high_workers: 2,
            normal_workers: num_cpus::get().max(2),
            low_workers: 1,
            thread_stack_size: Self::DEFAULT_STACK_SIZE,
        }
    }

    /// Set the backend.
    #[must_use]
    pub fn with_backend(mut self, backend: DispatchBackendConfig) -> Self {
        self.backend = backend;
        self
    }

    /// Set the high-priority worker count.
    #[must_use]
    pub fn with_high_workers(mut self, count: usize) -> Self {
        self.high_workers = count;
        self
    }

    /// Set the normal-priority worker count.
    #[must_use]
    pub fn with_normal_workers(mut self, count: usize) -> Self {
        self.normal_workers = count;
        self
    }

    /// Set the low-priority worker count.
    #[must_use]
    pub fn with_low_workers(mut self, count: usize) -> Self {
        self.low_workers = count;
        self
    }

    /// Set the per-thread stack size in bytes.
    #[must_use]
    pub fn with_thread_stack_size(mut self, bytes: usize) -> Self {
        self.thread_stack_size = bytes;
        self
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.high_workers == 0 {
            return Err("high_workers must be greater than 0".into());
        }
        if self.normal_workers == 0 {
            return Err("normal_workers must be greater than 0".into());
        }
        if self.low_workers == 0 {
            return Err("low_workers must be greater than 0".into());
        }
        if self.thread_stack_size == 0 {
            return Err("thread_stack_size must be greater than 0".into());
        }
        Ok(())
    }

    /// Parse a dispatcher configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns a description of the parse or validation failure.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }
}
