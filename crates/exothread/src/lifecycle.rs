//! # Handle Lifecycle
//!
//! The state machine behind a handle, kept free of any async machinery so the
//! ordering and failure rules can be exercised directly.
//!
//! ```text
//!            resolve(id)                  terminate
//!  Pending ──────────────► Resolved ─────────────────► Terminated
//!     │                                                    ▲
//!     │ fail(err)              resolve(id) with a queued   │
//!     ▼                        terminate                   │
//!   Failed    Pending ─────────────────────────────────────┘
//! ```
//!
//! ## Invariants
//!
//! - The identity is set at most once, on the way out of `Pending`.
//! - Deferred operations come back out in submission order, exactly once.
//! - A queued `Terminate` is always the last deferred operation; anything submitted
//!   after it is rejected.

use std::collections::VecDeque;

use crate::identity::WorkerId;
use crate::message::Message;
use crate::registry;

/// An operation a caller can issue against a handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Post(Message),
    Terminate,
}

/// Observable state of a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Waiting for the registry to assign an identity.
    Pending,
    /// Identity known; operations go straight to the registry.
    Resolved,
    /// The registry refused to start the worker.
    Failed,
    /// Terminated, or termination is queued behind resolution.
    Terminated,
}

/// Why a handle refuses to carry a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unusable {
    /// Resolution failed; carries the registry's reason.
    Failed(registry::Error),
    /// The handle was terminated, or a terminate is already queued.
    Terminated,
    /// The handle went away before the operation settled.
    Abandoned,
}

impl std::fmt::Display for Unusable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Failed(e) => write!(f, "worker resolution failed: {}", e),
            Self::Terminated => write!(f, "handle is terminated"),
            Self::Abandoned => write!(f, "handle was dropped before the operation settled"),
        }
    }
}

/// What the owner of a lifecycle must do with a submitted operation.
#[derive(Debug)]
pub(crate) enum Step<T> {
    /// Run the operation against the identity now.
    Dispatch(WorkerId, Operation, T),
    /// Queued until resolution completes.
    Deferred,
    /// Nothing left to do (a repeated terminate).
    Settled(T),
}

#[derive(Debug)]
enum Phase {
    Pending { terminate_queued: bool },
    Resolved(WorkerId),
    Failed(registry::Error),
    /// Carries the identity when the worker was ever resolved.
    Terminated(Option<WorkerId>),
}

/// Resolution state plus the queue of operations deferred behind it.
///
/// `T` is an acknowledgement token carried alongside each operation, so the owner
/// can report an outcome once the operation finally runs (or never will).
#[derive(Debug)]
pub(crate) struct Lifecycle<T> {
    phase: Phase,
    pending: VecDeque<(Operation, T)>,
}

impl<T> Lifecycle<T> {
    /// A lifecycle still waiting on its identity.
    pub fn pending() -> Self {
        Self {
            phase: Phase::Pending { terminate_queued: false },
            pending: VecDeque::new(),
        }
    }

    /// A lifecycle whose identity is already known.
    pub fn resolved(id: WorkerId) -> Self {
        Self {
            phase: Phase::Resolved(id),
            pending: VecDeque::new(),
        }
    }

    pub fn state(&self) -> State {
        match self.phase {
            Phase::Pending { terminate_queued: false } => State::Pending,
            Phase::Pending { terminate_queued: true } => State::Terminated,
            Phase::Resolved(_) => State::Resolved,
            Phase::Failed(_) => State::Failed,
            Phase::Terminated(_) => State::Terminated,
        }
    }

    pub fn identity(&self) -> Option<WorkerId> {
        match self.phase {
            Phase::Resolved(id) => Some(id),
            Phase::Terminated(id) => id,
            Phase::Pending { .. } | Phase::Failed(_) => None,
        }
    }

    /// Number of operations waiting on resolution.
    pub fn queued(&self) -> usize {
        self.pending.len()
    }

    /// Submits an operation.
    ///
    /// Posts are rejected once the handle has failed or is (or will be) terminated.
    /// Terminate never is: repeating it settles immediately.
    pub fn submit(&mut self, op: Operation, ack: T) -> Result<Step<T>, Unusable> {
        match (&self.phase, op) {
            (Phase::Pending { terminate_queued: false }, op) => {
                if op == Operation::Terminate {
                    self.phase = Phase::Pending { terminate_queued: true };
                }
                self.pending.push_back((op, ack));
                Ok(Step::Deferred)
            }
            (&Phase::Resolved(id), Operation::Terminate) => {
                self.phase = Phase::Terminated(Some(id));
                Ok(Step::Dispatch(id, Operation::Terminate, ack))
            }
            (_, Operation::Terminate) => Ok(Step::Settled(ack)),
            (&Phase::Resolved(id), op @ Operation::Post(_)) => Ok(Step::Dispatch(id, op, ack)),
            (Phase::Failed(e), Operation::Post(_)) => Err(Unusable::Failed(e.clone())),
            (Phase::Pending { .. } | Phase::Terminated(_), Operation::Post(_)) => Err(Unusable::Terminated),
        }
    }

    /// Records a successful resolution and hands back the deferred operations,
    /// oldest first.
    ///
    /// Returns `None` if the lifecycle already left `Pending`; the identity is never
    /// replaced.
    pub fn resolve(&mut self, id: WorkerId) -> Option<Vec<(Operation, T)>> {
        let Phase::Pending { terminate_queued } = self.phase else {
            return None;
        };

        self.phase = if terminate_queued { Phase::Terminated(Some(id)) } else { Phase::Resolved(id) };
        Some(self.pending.drain(..).collect())
    }

    /// Records a failed resolution and hands back the deferred operations, which
    /// will never run.
    ///
    /// Returns `None` if the lifecycle already left `Pending`.
    pub fn fail(&mut self, err: registry::Error) -> Option<Vec<(Operation, T)>> {
        if !matches!(self.phase, Phase::Pending { .. }) {
            return None;
        }

        self.phase = Phase::Failed(err);
        Some(self.pending.drain(..).collect())
    }
}
