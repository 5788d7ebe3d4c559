//! Session identity, state and diagnostics

use super::error::TransportError;
use super::transport::ChannelHandle;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of one session
///
/// A recreated session always gets a new id, even under the same name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(u64);

impl SessionId {
    pub fn next() -> Self {
        Self(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display, strum_macros::EnumString,
)]
#[strum(serialize_all = "snake_case")]
pub enum SessionRole {
    /// Publishes messages
    Outgoing,
    /// Consumes messages
    Inbound,
}

/// Connection state machine
///
/// `Idle -> Connecting -> ChannelPending -> Ready`; retryable failures go back
/// to `Connecting`, close and fatal failures end in `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
#[strum(serialize_all = "snake_case")]
pub enum SessionState {
    Idle,
    Connecting,
    ChannelPending,
    Ready,
    Closed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        self == SessionState::Closed
    }
}

/// Timing recorded when a connection completes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionDiagnostics {
    /// Connect attempts it took, including the successful one
    pub attempts: u32,
    /// Time from the first attempt to the completed handshake
    pub elapsed: Duration,
    pub connected_at: DateTime<Utc>,
}

/// Snapshot published by the session driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStatus {
    pub state: SessionState,
    pub diagnostics: Option<SessionDiagnostics>,
    pub channel: Option<ChannelHandle>,
}

impl SessionStatus {
    pub(crate) fn idle() -> Self {
        Self {
            state: SessionState::Idle,
            diagnostics: None,
            channel: None,
        }
    }
}

/// Fatal failure reported to the session's owner
#[derive(Debug)]
pub struct SessionFailure {
    pub session_id: SessionId,
    pub name: String,
    pub role: SessionRole,
    pub error: TransportError,
}

impl fmt::Display for SessionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} session '{}' ({}) failed: {}",
            self.role, self.name, self.session_id, self.error
        )
    }
}
