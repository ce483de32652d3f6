//! Sessions this client wants status and output for.
//!
//! The set outlives individual sockets: it is replayed as `subscribe`
//! frames after every successful open, which also makes it the queue for
//! subscriptions requested while disconnected.

use std::collections::BTreeSet;

use coder1_core::SessionId;

/// Ordered set of subscribed session ids.
#[derive(Clone, Debug, Default)]
pub struct SessionSubscriptions {
    sessions: BTreeSet<SessionId>,
}

impl SessionSubscriptions {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a session. Returns `false` if it was already present.
    pub fn insert(&mut self, session_id: SessionId) -> bool {
        self.sessions.insert(session_id)
    }

    /// Remove a session. Returns `false` if it was not present.
    pub fn remove(&mut self, session_id: &SessionId) -> bool {
        self.sessions.remove(session_id)
    }

    /// Owned copy of the set, in id order.
    pub fn to_vec(&self) -> Vec<SessionId> {
        self.sessions.iter().cloned().collect()
    }

    /// Forget everything.
    pub fn clear(&mut self) {
        self.sessions.clear();
    }

    /// Number of sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session is subscribed.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
