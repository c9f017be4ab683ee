//! Coordination error types

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use super::state::TransitionError;
use super::types::ModuleKind;
use crate::host::HostError;

/// One module that failed during `refresh_all`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleFailure {
    pub module: ModuleKind,
    pub error: String,
}

/// Aggregate of module refresh failures after an otherwise successful switch.
///
/// Non-fatal: the session stays active, failed modules keep their last data.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Refresh of session {session_id} partially failed: {}", describe(.failures))]
pub struct PartialRefreshError {
    pub session_id: String,
    pub failures: Vec<ModuleFailure>,
}

impl PartialRefreshError {
    pub fn modules(&self) -> Vec<ModuleKind> {
        self.failures.iter().map(|f| f.module).collect()
    }
}

fn describe(failures: &[ModuleFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{} ({})", f.module, f.error))
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("{operation} timed out after {}ms", .after.as_millis())]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Session not found: {0}")]
    UnknownSession(String),

    #[error("Host rejected request: {0}")]
    HostRejected(String),

    #[error("Switch rejected: {pending} switch requests already queued")]
    ConcurrentSwitchRejected { pending: usize },

    #[error(transparent)]
    PartialRefresh(#[from] PartialRefreshError),

    #[error("No active session")]
    NoActiveSession,

    #[error("Session {0} is not the active session")]
    SessionNotActive(String),

    #[error("Saved connection not found: {0}")]
    UnknownProfile(String),

    #[error("Connection limit reached: {current}/{max} sessions")]
    ConnectionLimitReached { current: usize, max: usize },

    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),
}

impl SessionError {
    /// Host unreachable or timed out
    pub fn is_transport(&self) -> bool {
        matches!(self, SessionError::Transport(_) | SessionError::Timeout { .. })
    }
}

impl From<HostError> for SessionError {
    fn from(err: HostError) -> Self {
        match err {
            HostError::Unreachable(msg) | HostError::ChannelError(msg) => {
                SessionError::Transport(msg)
            }
            HostError::AuthenticationFailed(msg) => SessionError::Auth(msg),
            HostError::UnknownSession(id) => SessionError::UnknownSession(id),
            HostError::Rejected(msg) | HostError::CommandFailed(msg) => {
                SessionError::HostRejected(msg)
            }
        }
    }
}

// Make SessionError serializable for IPC responses
impl Serialize for SessionError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
