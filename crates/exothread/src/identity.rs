//! Worker identities.
//!
//! A worker is addressed by a registry-assigned `WorkerId` rather than a raw
//! integer, so an identity can't be confused with an index or a sequence number.

/// Identity of a running worker, assigned by the registry that started it.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct WorkerId(pub u64);

impl WorkerId {
    /// Name of the event topic carrying this worker's outbound messages.
    ///
    /// Derived deterministically from the identity, so the handle and the
    /// registry agree on it without coordination.
    pub fn topic(&self) -> String {
        format!("thread-{}", self.0)
    }
}

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

impl From<u64> for WorkerId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}
