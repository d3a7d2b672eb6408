//! # Launcher
//!
//! The entry points for creating handles, and the configuration they share.

use std::sync::Arc;

use crate::handle::Error;
use crate::handle::Handle;
use crate::handle::Result;
use crate::identity::WorkerId;
use crate::registry::Registry;

/// Environment variable overriding [`Config::source_suffix`].
pub const SOURCE_SUFFIX_ENV: &str = "EXOTHREAD_SOURCE_SUFFIX";

/// Suffix a source reference must carry unless configured otherwise.
pub const DEFAULT_SOURCE_SUFFIX: &str = ".wasm";

/// Settings for turning source references into logical worker names.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    source_suffix: String,
}

impl Config {
    pub fn new() -> Self {
        Self {
            source_suffix: DEFAULT_SOURCE_SUFFIX.to_string(),
        }
    }

    /// Defaults, with the suffix taken from `EXOTHREAD_SOURCE_SUFFIX` when set and
    /// non-empty.
    pub fn from_env() -> Self {
        match std::env::var(SOURCE_SUFFIX_ENV) {
            Ok(suffix) if !suffix.is_empty() => Self::new().with_source_suffix(suffix),
            _ => Self::new(),
        }
    }

    pub fn with_source_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.source_suffix = suffix.into();
        self
    }

    pub fn source_suffix(&self) -> &str {
        &self.source_suffix
    }

    /// Validates a source reference and strips the suffix, yielding the logical
    /// name the registry starts workers under.
    ///
    /// `"workers/echo.wasm"` becomes `"workers/echo"`. Only the trailing suffix is
    /// removed. A reference that is empty, lacks the suffix, or is nothing but the
    /// suffix is rejected.
    pub fn logical_name(&self, source: &str) -> Result<String> {
        match source.strip_suffix(self.source_suffix.as_str()) {
            Some(name) if !name.is_empty() => Ok(name.to_string()),
            _ => Err(Error::InvalidSourceReference(source.to_string())),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

/// Creates handles against a registry.
///
/// Handles spawn tasks on the tokio runtime current at creation time, so both
/// entry points must be called from within a runtime.
#[derive(Clone)]
pub struct Launcher {
    registry: Arc<dyn Registry>,
    config: Config,
}

impl Launcher {
    pub fn new(registry: Arc<dyn Registry>) -> Self {
        Self {
            registry,
            config: Config::default(),
        }
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Starts a new worker from a source reference.
    ///
    /// Validation happens before anything else: an invalid reference fails here,
    /// synchronously, and the registry is never contacted. Otherwise the handle is
    /// returned at once in the `Pending` state while the registry starts the worker.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn load_from_source(&self, source: impl AsRef<str>) -> Result<Handle> {
        let source = source.as_ref();
        let name = self.config.logical_name(source)?;
        tracing::debug!(source, name = %name, "loading worker");
        Ok(Handle::load(Arc::clone(&self.registry), tokio::runtime::Handle::current(), name))
    }

    /// Attaches to a worker whose identity is already known, such as a preloaded one.
    ///
    /// The handle is `Resolved` immediately; the only registry call is the event
    /// subscription.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn attach_to_identity(&self, id: impl Into<WorkerId>) -> Handle {
        Handle::attach(Arc::clone(&self.registry), tokio::runtime::Handle::current(), id.into())
    }
}
