//! Host bridge error types

use thiserror::Error;

/// Errors reported by the external host process or a data-fetch collaborator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    #[error("Host unreachable: {0}")]
    Unreachable(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Unknown session on host: {0}")]
    UnknownSession(String),

    #[error("Host rejected request: {0}")]
    Rejected(String),

    #[error("Channel error: {0}")]
    ChannelError(String),

    #[error("Remote command failed: {0}")]
    CommandFailed(String),
}

impl HostError {
    /// Whether the failure came from the transport layer rather than the host's logic
    pub fn is_transport(&self) -> bool {
        matches!(self, HostError::Unreachable(_) | HostError::ChannelError(_))
    }
}

// Make HostError serializable for IPC responses
impl serde::Serialize for HostError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
