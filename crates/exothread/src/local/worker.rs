//! The worker side of an in-process worker.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::identity::WorkerId;
use crate::local::bus::EventBus;
use crate::message::Message;
use crate::registry::Payload;

pub type WorkerFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Builds the body of a worker from its context.
pub type WorkerFactory = Arc<dyn Fn(WorkerContext) -> WorkerFuture + Send + Sync>;

/// Wraps an async closure as a [`WorkerFactory`].
pub fn factory<F, Fut>(f: F) -> WorkerFactory
where
    F: Fn(WorkerContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |ctx: WorkerContext| Box::pin(f(ctx)) as WorkerFuture)
}

/// What a running worker sees of the world: its inbox and its own topic.
pub struct WorkerContext {
    id: WorkerId,
    inbox: mpsc::UnboundedReceiver<Message>,
    bus: Arc<EventBus>,
}

impl WorkerContext {
    pub(crate) fn new(id: WorkerId, inbox: mpsc::UnboundedReceiver<Message>, bus: Arc<EventBus>) -> Self {
        Self { id, inbox, bus }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// Waits for the next message from the host. `None` once the worker is stopped.
    pub async fn recv(&mut self) -> Option<Message> {
        self.inbox.recv().await
    }

    /// Sends a message to whoever is subscribed to this worker.
    ///
    /// Events are not buffered: anything sent before a handle subscribes, such as
    /// output produced while the worker starts up, reaches nobody.
    pub fn post_message(&self, message: impl Into<Message>) {
        self.emit(Some(message.into()));
    }

    /// Publishes a raw payload on this worker's topic, absent payloads included.
    pub fn emit(&self, payload: Payload) {
        let delivered = self.bus.publish(&self.id.topic(), payload);
        tracing::trace!(worker = %self.id, delivered, "event published");
    }
}
