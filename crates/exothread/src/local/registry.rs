//! # Local Registry
//!
//! An in-process [`Registry`] whose workers are tokio tasks.
//!
//! Worker bodies are registered by logical name as [`WorkerFactory`]s. Starting a
//! worker allocates the next identity, spawns the body with a [`WorkerContext`],
//! and remembers its inbox so messages can be routed to it.
//!
//! Uses DashMap for concurrent access without global locking, so many handles
//! can start, message, and stop workers at once.

use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::identity::WorkerId;
use crate::local::builder::LocalRegistryBuilder;
use crate::local::bus::EventBus;
use crate::local::worker::WorkerContext;
use crate::local::worker::WorkerFactory;
use crate::message::Message;
use crate::registry;
use crate::registry::Registry;
use crate::registry::Subscription;

struct LocalWorker {
    name: String,
    inbox: mpsc::UnboundedSender<Message>,
    task: JoinHandle<()>,
}

pub struct LocalRegistry {
    sources: DashMap<String, WorkerFactory>,
    workers: DashMap<WorkerId, LocalWorker>,
    bus: Arc<EventBus>,
    next_id: AtomicU64,
}

impl LocalRegistry {
    pub fn builder() -> LocalRegistryBuilder {
        LocalRegistryBuilder::new()
    }

    /// Creates a registry whose dynamically started workers are numbered from
    /// `first_id`.
    pub(crate) fn with_sources(sources: DashMap<String, WorkerFactory>, first_id: u64) -> Self {
        Self {
            sources,
            workers: DashMap::new(),
            bus: Arc::new(EventBus::new()),
            next_id: AtomicU64::new(first_id),
        }
    }

    /// Spawns the worker registered as `name` under a given identity.
    pub(crate) fn spawn(&self, id: WorkerId, name: &str) -> registry::Result<()> {
        let factory = self
            .sources
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| registry::Error::UnknownSource(name.to_string()))?;

        let (inbox, rx) = mpsc::unbounded_channel();
        let ctx = WorkerContext::new(id, rx, Arc::clone(&self.bus));
        let task = tokio::spawn(factory(ctx));

        self.workers.insert(id, LocalWorker {
            name: name.to_string(),
            inbox,
            task,
        });
        tracing::info!(worker = %id, name, "worker started");
        Ok(())
    }

    /// Identities of every worker not yet stopped, in ascending order. A worker
    /// whose body returned is dropped from the list once a message to it fails.
    pub fn workers(&self) -> Vec<WorkerId> {
        let mut ids: Vec<WorkerId> = self.workers.iter().map(|entry| *entry.key()).collect();
        ids.sort();
        ids
    }

    /// The logical name a worker was started from.
    pub fn worker_name(&self, id: WorkerId) -> Option<String> {
        self.workers.get(&id).map(|entry| entry.name.clone())
    }

    /// Whether the worker exists and its body has not returned.
    pub fn is_running(&self, id: WorkerId) -> bool {
        self.workers
            .get(&id)
            .map(|entry| !entry.task.is_finished())
            .unwrap_or(false)
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }
}

#[async_trait::async_trait]
impl Registry for LocalRegistry {
    async fn start_worker(&self, name: &str) -> registry::Result<WorkerId> {
        if !self.sources.contains_key(name) {
            return Err(registry::Error::UnknownSource(name.to_string()));
        }
        let id = WorkerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.spawn(id, name)?;
        Ok(id)
    }

    fn post_message(&self, id: WorkerId, message: Message) -> registry::Result<()> {
        let sent = {
            let worker = self.workers.get(&id).ok_or(registry::Error::NotFound(id))?;
            worker.inbox.send(message).is_ok()
        };
        if sent {
            return Ok(());
        }

        // The body returned and dropped its inbox.
        if let Some((_, worker)) = self.workers.remove(&id) {
            self.bus.close(&id.topic());
            tracing::info!(worker = %id, name = %worker.name, "worker exited");
        }
        Err(registry::Error::Closed(id))
    }

    async fn stop_worker(&self, id: WorkerId) -> registry::Result<()> {
        let (_, worker) = self.workers.remove(&id).ok_or(registry::Error::NotFound(id))?;
        worker.task.abort();
        self.bus.close(&id.topic());
        tracing::info!(worker = %id, name = %worker.name, "worker stopped");
        Ok(())
    }

    fn subscribe(&self, id: WorkerId) -> Subscription {
        self.bus.subscribe(&id.topic())
    }
}

impl Drop for LocalRegistry {
    fn drop(&mut self) {
        for entry in self.workers.iter() {
            entry.task.abort();
        }
    }
}
