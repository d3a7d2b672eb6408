//! # Worker Registry Abstraction
//!
//! The one external collaborator a handle talks to. A registry starts, messages,
//! and stops workers, and carries each worker's outbound events on a topic named
//! after its identity.
//!
//! ## Philosophy
//!
//! - **Identity-Scoped**: Every operation after `start_worker` is addressed by a
//!   `WorkerId`. Registries are expected to serialize operations per identity and
//!   make no promise across identities.
//! - **Opaque Payloads**: The registry moves `Message` buffers. It may serialize them
//!   across a thread, process, or network boundary, but never interprets them.

use tokio::sync::mpsc;

use crate::identity::WorkerId;
use crate::message::Message;

/// Errors reported by a registry.
///
/// Cloneable so a single resolution failure can be re-surfaced to every
/// operation that was waiting on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// No worker source is registered under the requested name.
    UnknownSource(String),
    /// No live worker has this identity.
    NotFound(WorkerId),
    /// The worker's inbox is closed; it has exited or is shutting down.
    Closed(WorkerId),
    /// The registry refused the request for an implementation-specific reason.
    Rejected(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownSource(name) => write!(f, "Unknown worker source: {}", name),
            Self::NotFound(id) => write!(f, "Worker not found: {}", id),
            Self::Closed(id) => write!(f, "Worker inbox closed: {}", id),
            Self::Rejected(msg) => write!(f, "Registry rejected request: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// An inbound event payload. `None` is an absent payload.
pub type Payload = Option<Message>;

/// A stream of inbound events scoped to one worker's topic.
///
/// Dropping the subscription releases it; the registry notices the closed
/// channel on its next publish.
pub struct Subscription {
    topic: String,
    rx: mpsc::UnboundedReceiver<Payload>,
}

impl Subscription {
    pub fn new(topic: impl Into<String>, rx: mpsc::UnboundedReceiver<Payload>) -> Self {
        Self {
            topic: topic.into(),
            rx,
        }
    }

    /// The topic this subscription listens on.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Waits for the next event.
    ///
    /// Returns `None` once the registry has dropped every sender for the topic.
    pub async fn recv(&mut self) -> Option<Payload> {
        self.rx.recv().await
    }
}

/// The registry and event channel that handles are built on.
///
/// This trait is designed to be object-safe (`Arc<dyn Registry>`).
///
/// # invariants
/// - `post_message` and `subscribe` must not block; they hand work off and return.
/// - Events for one identity must reach a subscription in the order they were published.
/// - Must not retry on the caller's behalf; a failed request is reported as `Err`.
#[async_trait::async_trait]
pub trait Registry: Send + Sync + 'static {
    /// Starts a new worker from the logical source `name` (no suffix) and returns
    /// its identity.
    async fn start_worker(&self, name: &str) -> Result<WorkerId>;

    /// Sends a message to a worker, fire-and-forget.
    fn post_message(&self, id: WorkerId, message: Message) -> Result<()>;

    /// Requests shutdown of a worker.
    async fn stop_worker(&self, id: WorkerId) -> Result<()>;

    /// Subscribes to the worker's event topic (see [`WorkerId::topic`]).
    fn subscribe(&self, id: WorkerId) -> Subscription;
}
