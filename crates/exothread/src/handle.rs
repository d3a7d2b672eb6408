//! # Worker Handle
//!
//! A caller-facing handle to one worker. The worker's identity may not be known
//! yet when the handle is created; operations issued in the meantime are queued
//! and replayed in order once the registry answers.
//!
//! Nothing here blocks. `post_message` and `terminate` return as soon as the
//! operation is dispatched or queued, handing back a [`Receipt`] the caller may
//! await (or drop) to learn how it settled.
//!
//! Inbound messages arrive through a pump task subscribed to the worker's topic.
//! The pump is only started once the identity is resolved, so nothing can reach
//! the callback earlier.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::task::Context;
use std::task::Poll;

use tokio::runtime;
use tokio::sync::oneshot;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::identity::WorkerId;
use crate::lifecycle::Lifecycle;
use crate::lifecycle::Operation;
use crate::lifecycle::State;
use crate::lifecycle::Step;
use crate::lifecycle::Unusable;
use crate::message::Message;
use crate::registry;
use crate::registry::Registry;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The source reference is empty or lacks the expected suffix.
    InvalidSourceReference(String),
    /// The registry refused to start the worker this operation was waiting on.
    ResolutionFailed(registry::Error),
    /// The handle can no longer carry messages.
    Unusable(Unusable),
    /// The registry refused a dispatched operation.
    Registry(registry::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidSourceReference(source) => write!(f, "Invalid source reference: {:?}", source),
            Self::ResolutionFailed(e) => write!(f, "Resolution failed: {}", e),
            Self::Unusable(reason) => write!(f, "Handle unusable: {}", reason),
            Self::Registry(e) => write!(f, "Registry error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ResolutionFailed(e) | Self::Registry(e) => Some(e),
            _ => None,
        }
    }
}

impl From<Unusable> for Error {
    fn from(reason: Unusable) -> Self {
        Self::Unusable(reason)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

type Ack = oneshot::Sender<Result<()>>;
type Callback = Arc<dyn Fn(Message) + Send + Sync>;
type Resolution = Option<registry::Result<WorkerId>>;

/// The eventual outcome of one `post_message` or `terminate` call.
///
/// Dropping a receipt does not cancel the operation.
#[derive(Debug)]
pub struct Receipt {
    rx: oneshot::Receiver<Result<()>>,
}

impl Receipt {
    fn channel() -> (Ack, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { rx })
    }

    fn ready(result: Result<()>) -> Self {
        let (ack, receipt) = Self::channel();
        let _ = ack.send(result);
        receipt
    }
}

impl Future for Receipt {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(Error::Unusable(Unusable::Abandoned))),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// State shared between a handle and the tasks working on its behalf.
struct Shared {
    registry: Arc<dyn Registry>,
    runtime: runtime::Handle,
    lifecycle: Mutex<Lifecycle<Ack>>,
    on_message: Arc<Mutex<Option<Callback>>>,
    subscription: Mutex<Option<JoinHandle<()>>>,
    resolution: watch::Sender<Resolution>,
    /// Set once the handle is gone; no events are subscribed to after that.
    detached: AtomicBool,
}

impl Shared {
    fn new(registry: Arc<dyn Registry>, runtime: runtime::Handle, lifecycle: Lifecycle<Ack>) -> Self {
        let (resolution, _) = watch::channel(None);
        Self {
            registry,
            runtime,
            lifecycle: Mutex::new(lifecycle),
            on_message: Arc::new(Mutex::new(None)),
            subscription: Mutex::new(None),
            resolution,
            detached: AtomicBool::new(false),
        }
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle<Ack>> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn submit(&self, op: Operation) -> Result<Receipt> {
        let (ack, receipt) = Receipt::channel();

        // Dispatch happens under the lifecycle lock so a replayed queue can't be
        // overtaken by a fresh submission.
        let mut lifecycle = self.lifecycle();
        match lifecycle.submit(op, ack)? {
            Step::Dispatch(id, op, ack) => self.dispatch(id, op, ack),
            Step::Deferred => tracing::trace!(queued = lifecycle.queued(), "operation deferred until resolution"),
            Step::Settled(ack) => {
                let _ = ack.send(Ok(()));
            }
        }

        Ok(receipt)
    }

    fn dispatch(&self, id: WorkerId, op: Operation, ack: Ack) {
        match op {
            Operation::Post(message) => {
                let result = self.registry.post_message(id, message);
                if let Err(e) = &result {
                    tracing::warn!(worker = %id, error = %e, "registry refused message");
                }
                let _ = ack.send(result.map_err(Error::Registry));
            }
            Operation::Terminate => {
                self.release_subscription();
                let registry = Arc::clone(&self.registry);
                self.runtime.spawn(async move {
                    let result = registry.stop_worker(id).await;
                    match &result {
                        Ok(()) => tracing::info!(worker = %id, "worker stopped"),
                        Err(e) => tracing::warn!(worker = %id, error = %e, "stop request failed"),
                    }
                    let _ = ack.send(result.map_err(Error::Registry));
                });
            }
        }
    }

    /// Applies the registry's answer to a start request.
    fn complete(&self, outcome: registry::Result<WorkerId>) {
        let mut lifecycle = self.lifecycle();
        match outcome {
            Ok(id) => {
                let Some(deferred) = lifecycle.resolve(id) else {
                    return;
                };
                tracing::info!(worker = %id, replayed = deferred.len(), "worker resolved");
                if !self.detached.load(Ordering::SeqCst) {
                    self.subscribe(id);
                }
                for (op, ack) in deferred {
                    self.dispatch(id, op, ack);
                }
                self.resolution.send_replace(Some(Ok(id)));
            }
            Err(e) => {
                let Some(deferred) = lifecycle.fail(e.clone()) else {
                    return;
                };
                tracing::warn!(error = %e, dropped = deferred.len(), "worker resolution failed");
                for (op, ack) in deferred {
                    let result = match op {
                        Operation::Post(_) => Err(Error::ResolutionFailed(e.clone())),
                        // Nothing was started, so there is nothing to stop.
                        Operation::Terminate => Ok(()),
                    };
                    let _ = ack.send(result);
                }
                self.resolution.send_replace(Some(Err(e)));
            }
        }
    }

    /// Starts the pump delivering the worker's events to the callback slot.
    fn subscribe(&self, id: WorkerId) {
        let mut subscription = self.registry.subscribe(id);
        let slot = Arc::clone(&self.on_message);
        let span = tracing::debug_span!("events", worker = %id, topic = subscription.topic());

        let pump = self.runtime.spawn(
            async move {
                while let Some(payload) = subscription.recv().await {
                    let Some(message) = payload.filter(|m| !m.is_empty()) else {
                        tracing::trace!("suppressed empty event");
                        continue;
                    };

                    // Clone out of the slot so the callback may replace itself.
                    let callback = slot.lock().unwrap_or_else(PoisonError::into_inner).clone();
                    match callback {
                        Some(callback) => callback(message),
                        None => tracing::trace!("no callback set, event discarded"),
                    }
                }
                tracing::debug!("event subscription closed");
            }
            .instrument(span),
        );

        let previous = self
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(pump);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Called when the handle goes away. Queued operations still run.
    fn detach(&self) {
        // Taken under the lifecycle lock so a concurrent resolution either sees
        // the flag or has already installed the pump released below.
        let _lifecycle = self.lifecycle();
        self.detached.store(true, Ordering::SeqCst);
        self.release_subscription();
    }

    fn release_subscription(&self) {
        let pump = self.subscription.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(pump) = pump {
            pump.abort();
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.release_subscription();
    }
}

/// A handle to one worker.
///
/// Created through a [`Launcher`](crate::launcher::Launcher), either by loading a
/// source (identity resolved later) or by attaching to a known identity.
///
/// Dropping the handle releases its event subscription but leaves the worker
/// running; call [`terminate`](Self::terminate) to stop it. Operations already
/// queued behind resolution, a terminate included, still run when the worker
/// starts.
pub struct Handle {
    shared: Arc<Shared>,
}

impl Handle {
    /// Creates a pending handle and asks the registry to start `name`.
    pub(crate) fn load(registry: Arc<dyn Registry>, runtime: runtime::Handle, name: String) -> Self {
        let shared = Arc::new(Shared::new(Arc::clone(&registry), runtime.clone(), Lifecycle::pending()));

        // The task keeps the shared state alive, so operations queued by a handle
        // dropped before resolution are still replayed.
        let task = Arc::clone(&shared);
        let span = tracing::debug_span!("resolve", name = %name);
        runtime.spawn(
            async move {
                let outcome = registry.start_worker(&name).await;
                task.complete(outcome);
            }
            .instrument(span),
        );

        Self { shared }
    }

    /// Creates a handle already resolved to `id` and subscribes to its events.
    pub(crate) fn attach(registry: Arc<dyn Registry>, runtime: runtime::Handle, id: WorkerId) -> Self {
        let shared = Arc::new(Shared::new(registry, runtime, Lifecycle::resolved(id)));
        shared.subscribe(id);
        shared.resolution.send_replace(Some(Ok(id)));
        tracing::debug!(worker = %id, "attached to worker");
        Self { shared }
    }

    pub fn state(&self) -> State {
        self.shared.lifecycle().state()
    }

    /// The worker's identity, once resolved.
    pub fn identity(&self) -> Option<WorkerId> {
        self.shared.lifecycle().identity()
    }

    /// Waits for resolution and returns the worker's identity.
    ///
    /// Returns `ResolutionFailed` if the registry refused to start the worker.
    pub async fn ready(&self) -> Result<WorkerId> {
        let mut rx = self.shared.resolution.subscribe();
        let resolution = rx
            .wait_for(|resolution| resolution.is_some())
            .await
            .map_err(|_| Error::Unusable(Unusable::Abandoned))?;

        match &*resolution {
            Some(Ok(id)) => Ok(*id),
            Some(Err(e)) => Err(Error::ResolutionFailed(e.clone())),
            None => Err(Error::Unusable(Unusable::Abandoned)),
        }
    }

    /// Sends a message to the worker.
    ///
    /// Before resolution the message is queued; afterwards it goes straight to the
    /// registry. Fails immediately with `Unusable` once the handle has failed or
    /// been terminated, including while a terminate is still queued.
    pub fn post_message(&self, message: impl Into<Message>) -> Result<Receipt> {
        self.shared.submit(Operation::Post(message.into()))
    }

    /// Stops the worker.
    ///
    /// Before resolution the stop is queued behind any pending messages and only
    /// issued if the worker actually starts. Calling it again is a no-op.
    pub fn terminate(&self) -> Receipt {
        self.shared
            .submit(Operation::Terminate)
            .unwrap_or_else(|e| Receipt::ready(Err(e)))
    }

    /// Sets the callback receiving the worker's messages, replacing any previous one.
    pub fn set_on_message<F>(&self, callback: F)
    where
        F: Fn(Message) + Send + Sync + 'static,
    {
        *self.shared.on_message.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(callback));
    }

    /// Clears the callback. Messages arriving without one are discarded.
    pub fn clear_on_message(&self) {
        *self.shared.on_message.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        self.shared.detach();
    }
}

impl std::fmt::Debug for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handle")
            .field("state", &self.state())
            .field("identity", &self.identity())
            .finish()
    }
}
