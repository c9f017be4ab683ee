//! Host process boundary
//!
//! Everything that actually talks to a remote machine lives in the host
//! process. The coordination core only sees it through these traits:
//! - `HostBridge` for connect / disconnect / "set current session"
//! - `ModuleFetcher` for the per-module data pulls (system info, SFTP listing, ...)
//! - `Notifier` for user-facing toasts

mod error;
mod notify;

pub use error::HostError;
pub use notify::{Notifier, Severity, TracingNotifier};

use async_trait::async_trait;

use crate::session::{ConnectionInfo, ModuleData, ModuleKind};

/// Session-level operations executed by the host process.
///
/// All calls may suspend; callers bound them with their own timeouts.
#[async_trait]
pub trait HostBridge: Send + Sync {
    /// Open the remote connection for a freshly generated session id
    async fn connect(&self, session_id: &str, info: &ConnectionInfo) -> Result<(), HostError>;

    /// Tear down the remote connection of a session
    async fn disconnect(&self, session_id: &str) -> Result<(), HostError>;

    /// Make `session_id` the target of subsequent host commands
    async fn set_current_session(&self, session_id: &str) -> Result<(), HostError>;
}

/// One dependent data module that can be refreshed for a session.
#[async_trait]
pub trait ModuleFetcher: Send + Sync {
    /// Which module this fetcher feeds
    fn kind(&self) -> ModuleKind;

    /// Pull fresh data for `session_id`
    async fn refresh(&self, session_id: &str) -> Result<ModuleData, HostError>;
}
