//! Mock registry for testing.
//!
//! Records every call it receives. Start requests block until the test answers
//! them through a [`StartGate`], so tests control exactly when resolution happens.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::sync::oneshot;

use crate::identity::WorkerId;
use crate::message::Message;
use crate::registry;
use crate::registry::Payload;
use crate::registry::Registry;
use crate::registry::Subscription;

/// One observed registry call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Start(String),
    Post(WorkerId, Message),
    Stop(WorkerId),
    Subscribe(WorkerId),
}

/// The test's side of a pending start request.
pub struct StartGate(oneshot::Sender<registry::Result<WorkerId>>);

impl StartGate {
    pub fn resolve(self, id: u64) {
        let _ = self.0.send(Ok(WorkerId(id)));
    }

    pub fn fail(self, err: registry::Error) {
        let _ = self.0.send(Err(err));
    }
}

#[derive(Default)]
pub struct MockRegistry {
    calls: Mutex<Vec<Call>>,
    gates: Mutex<VecDeque<oneshot::Receiver<registry::Result<WorkerId>>>>,
    topics: DashMap<WorkerId, Vec<mpsc::UnboundedSender<Payload>>>,
    reject_posts: AtomicBool,
}

impl MockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the answer to the next start request.
    pub fn gate(&self) -> StartGate {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().unwrap().push_back(rx);
        StartGate(tx)
    }

    /// Makes every following `post_message` fail.
    pub fn reject_posts(&self) {
        self.reject_posts.store(true, Ordering::SeqCst);
    }

    /// Publishes on a worker's topic; returns how many live subscribers got it.
    pub fn emit(&self, id: u64, payload: Payload) -> usize {
        let Some(mut subscribers) = self.topics.get_mut(&WorkerId(id)) else {
            return 0;
        };
        subscribers.retain(|tx| tx.send(payload.clone()).is_ok());
        subscribers.len()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn posts(&self) -> Vec<Message> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Post(_, message) => Some(message),
                _ => None,
            })
            .collect()
    }

    pub fn stops(&self) -> usize {
        self.calls().iter().filter(|call| matches!(call, Call::Stop(_))).count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait::async_trait]
impl Registry for MockRegistry {
    async fn start_worker(&self, name: &str) -> registry::Result<WorkerId> {
        self.record(Call::Start(name.to_string()));
        let gate = self.gates.lock().unwrap().pop_front();
        match gate {
            Some(rx) => rx
                .await
                .unwrap_or_else(|_| Err(registry::Error::Rejected("start gate dropped".into()))),
            None => Err(registry::Error::Rejected("no start scripted".into())),
        }
    }

    fn post_message(&self, id: WorkerId, message: Message) -> registry::Result<()> {
        if self.reject_posts.load(Ordering::SeqCst) {
            return Err(registry::Error::Closed(id));
        }
        self.record(Call::Post(id, message));
        Ok(())
    }

    async fn stop_worker(&self, id: WorkerId) -> registry::Result<()> {
        self.record(Call::Stop(id));
        Ok(())
    }

    fn subscribe(&self, id: WorkerId) -> Subscription {
        self.record(Call::Subscribe(id));
        let (tx, rx) = mpsc::unbounded_channel();
        self.topics.entry(id).or_default().push(tx);
        Subscription::new(id.topic(), rx)
    }
}
