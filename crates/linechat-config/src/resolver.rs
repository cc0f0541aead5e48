use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, OnceLock, PoisonError};

use tracing::info;

use crate::config::ConnectionConfig;
use crate::error::Result;
use crate::source::ConfigSource;

/// Resolves connection parameters at most once.
///
/// The first successful [`resolve`](Self::resolve) reads and validates the
/// source; every later call returns the same value without touching the source,
/// even if the backing file has changed. A failed resolution stores nothing, so
/// the next call reads the source again.
pub struct ConfigResolver<S> {
    source: S,
    resolved: OnceLock<ConnectionConfig>,
    init: Mutex<()>,
    loads: AtomicUsize,
}

impl<S: ConfigSource> ConfigResolver<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            resolved: OnceLock::new(),
            init: Mutex::new(()),
            loads: AtomicUsize::new(0),
        }
    }

    /// Return the cached config, reading the source on first use.
    pub fn resolve(&self) -> Result<&ConnectionConfig> {
        if let Some(config) = self.resolved.get() {
            return Ok(config);
        }

        // Serialize first-time resolution so the source is read at most once.
        let _guard = self.init.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(config) = self.resolved.get() {
            return Ok(config);
        }

        self.loads.fetch_add(1, Ordering::Relaxed);
        let config = self.source.load()?.validate(self.source.section())?;
        info!(
            source = %self.source.describe(),
            host = %config.host(),
            port = config.port(),
            "resolved connection config"
        );

        Ok(self.resolved.get_or_init(|| config))
    }

    /// The cached config, if resolution already succeeded.
    pub fn get(&self) -> Option<&ConnectionConfig> {
        self.resolved.get()
    }

    /// How many times the source has been read.
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::Relaxed)
    }

    /// The underlying source.
    pub fn source(&self) -> &S {
        &self.source
    }
}
