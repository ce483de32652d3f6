//! Connection state machine.
//!
//! | From                 | Input                          | To                      |
//! |----------------------|--------------------------------|-------------------------|
//! | `Disconnected`       | `connect()`                    | `Connecting`            |
//! | `Failed`             | `connect()`                    | `Connecting`            |
//! | `ReconnectScheduled` | `connect()` or timer fires     | `Connecting`            |
//! | `Connecting`         | socket opened                  | `Connected`             |
//! | `Connecting`         | open failed, attempts left     | `ReconnectScheduled`    |
//! | `Connecting`         | open failed, attempts used up  | `Failed`                |
//! | `Connected`          | unexpected close, attempts left| `ReconnectScheduled`    |
//! | `Connected`          | unexpected close, used up      | `Failed`                |
//! | any                  | `disconnect()`                 | `Disconnected`          |
//!
//! A successful open resets the attempt counter. `disconnect()` pins the
//! counter at its maximum so nothing reconnects until the next explicit
//! `connect()` succeeds.

use std::fmt;

/// Observable connection state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionState {
    /// No socket and nothing scheduled.
    #[default]
    Disconnected,
    /// A socket is being opened.
    Connecting,
    /// The socket is open.
    Connected,
    /// A reconnect attempt is scheduled.
    ReconnectScheduled {
        /// 1-based attempt number that will run next.
        attempt: u32,
    },
    /// Reconnect attempts are exhausted. Terminal until `connect()`.
    Failed,
}

impl ConnectionState {
    /// Whether a socket is open.
    pub fn is_connected(self) -> bool {
        self == Self::Connected
    }

    /// Whether the client has given up reconnecting.
    pub fn is_terminal(self) -> bool {
        self == Self::Failed
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => f.write_str("disconnected"),
            Self::Connecting => f.write_str("connecting"),
            Self::Connected => f.write_str("connected"),
            Self::ReconnectScheduled { attempt } => write!(f, "reconnect-scheduled({attempt})"),
            Self::Failed => f.write_str("failed"),
        }
    }
}

/// Bounded reconnect attempt counter.
#[derive(Clone, Debug)]
pub struct ReconnectTracker {
    attempts: u32,
    max_attempts: u32,
}

impl ReconnectTracker {
    /// Create a tracker allowing `max_attempts` consecutive reconnects.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            attempts: 0,
            max_attempts,
        }
    }

    /// Attempts made since the last successful open.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Configured ceiling.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// A socket opened: start counting from zero again.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Explicit disconnect: pin the counter at the ceiling.
    pub fn suppress(&mut self) {
        self.attempts = self.max_attempts;
    }

    /// Record a lost or failed connection and return the next state.
    ///
    /// Increments the counter and yields `ReconnectScheduled` while attempts
    /// remain, otherwise `Failed`.
    pub fn after_failure(&mut self) -> ConnectionState {
        if self.attempts < self.max_attempts {
            self.attempts += 1;
            ConnectionState::ReconnectScheduled {
                attempt: self.attempts,
            }
        } else {
            ConnectionState::Failed
        }
    }
}
