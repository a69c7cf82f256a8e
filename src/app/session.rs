//! Session Management
//!
//! Session state, termination reasons and the lifecycle callbacks handed to the host.

use thiserror::Error;

use crate::connection::ConnectionStatus;

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Constructed, background work not started
    Idle,

    /// Connection being established
    Connecting,

    /// Connected, frames flowing to the sink
    Active,

    /// Teardown requested or in progress
    Stopping,

    /// Final; the connection and sink have been released
    Terminated,
}

impl SessionState {
    /// Whether `self -> next` is a legal transition
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Idle, Connecting)
                | (Idle, Terminated)
                | (Connecting, Active)
                | (Connecting, Stopping)
                | (Connecting, Terminated)
                | (Active, Stopping)
                | (Stopping, Terminated)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == SessionState::Terminated
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Active => "active",
            SessionState::Stopping => "stopping",
            SessionState::Terminated => "terminated",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a session ended
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TerminationReason {
    /// The connection could not be established
    #[error("connection failed: {0}")]
    ConnectFailed(String),

    /// The host closed the stream
    #[error("remote host disconnected")]
    RemoteDisconnected,

    /// The transport failed mid-session
    #[error("network error: {0}")]
    NetworkError(String),

    /// Stopped locally through the controller
    #[error("stopped by client")]
    Stopped,
}

/// Misuse of the controller's start operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("session already started; construct a new controller to reconnect")]
    AlreadyStarted,

    #[error("no tokio runtime available to spawn the session")]
    NoRuntime,
}

/// Notifications delivered to whoever hosts the session.
///
/// Called from the session task, never while the controller holds a lock, so
/// implementations may call back into the controller (including `stop`).
pub trait SessionLifecycle: Send + Sync {
    /// The connection is up and frames will start flowing
    fn on_connected(&self);

    /// The session is over; fired exactly once per controller
    fn on_terminated(&self, reason: &TerminationReason);

    fn on_stage_starting(&self, _stage: &str) {}

    fn on_stage_complete(&self, _stage: &str) {}

    fn on_stage_failed(&self, _stage: &str, _error_code: i32) {}

    /// Connection quality changed
    fn on_connection_status(&self, _status: ConnectionStatus) {}

    /// The first frame was accepted by the sink
    fn on_video_content_shown(&self) {}
}
