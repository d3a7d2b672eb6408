//! # Local Registry Builder
//!
//! Provides a fluent API for registering worker sources and preloading workers.
//!
//! Preloaded workers are started by `build()` and numbered by their position in
//! the preload list, so the first is `WorkerId(0)`. Callers that know the list
//! reach them with `attach_to_identity`. Workers started later are numbered after
//! the preloaded range.

use std::sync::Arc;

use dashmap::DashMap;

use crate::identity::WorkerId;
use crate::launcher::Config;
use crate::local::Error;
use crate::local::Result;
use crate::local::registry::LocalRegistry;
use crate::local::worker::WorkerContext;
use crate::local::worker::WorkerFactory;
use crate::local::worker::factory;

/// Fluent builder for a [`LocalRegistry`].
pub struct LocalRegistryBuilder {
    config: Config,
    sources: Vec<(String, WorkerFactory)>,
    preload: Vec<String>,
}

impl LocalRegistryBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            sources: Vec::new(),
            preload: Vec::new(),
        }
    }

    /// Config used to validate preload entry paths.
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Registers a worker body under a logical name (no suffix).
    pub fn source<F, Fut>(self, name: impl Into<String>, body: F) -> Self
    where
        F: Fn(WorkerContext) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        self.source_factory(name, factory(body))
    }

    pub fn source_factory(mut self, name: impl Into<String>, factory: WorkerFactory) -> Self {
        self.sources.push((name.into(), factory));
        self
    }

    /// Queues an entry path (with suffix) to start when the registry is built.
    pub fn preload(mut self, entry_path: impl Into<String>) -> Self {
        self.preload.push(entry_path.into());
        self
    }

    pub fn preload_all<I, S>(mut self, entry_paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.preload.extend(entry_paths.into_iter().map(Into::into));
        self
    }

    /// Validates every source and preload entry, then starts the preloaded workers.
    ///
    /// Nothing is started unless the whole configuration is valid. Must be called
    /// from within a tokio runtime when anything is preloaded.
    pub fn build(self) -> Result<Arc<LocalRegistry>> {
        let sources = DashMap::new();
        for (name, factory) in self.sources {
            if sources.contains_key(&name) {
                return Err(Error::DuplicateSource(name));
            }
            sources.insert(name, factory);
        }

        let mut names = Vec::with_capacity(self.preload.len());
        for entry_path in &self.preload {
            let name = self
                .config
                .logical_name(entry_path)
                .map_err(|_| Error::InvalidPreload(entry_path.clone()))?;
            if !sources.contains_key(&name) {
                return Err(Error::UnknownPreload(entry_path.clone()));
            }
            names.push(name);
        }

        let registry = Arc::new(LocalRegistry::with_sources(sources, names.len() as u64));
        for (index, name) in names.iter().enumerate() {
            registry.spawn(WorkerId(index as u64), name)?;
        }

        tracing::debug!(preloaded = names.len(), "local registry built");
        Ok(registry)
    }
}

impl Default for LocalRegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}
