//! Events published on the session bus

use serde::Serialize;

use super::state::LifecycleState;
use super::types::{ModuleKind, RegistrySnapshot};
use crate::bus::SubscriptionBus;

/// Event names used when forwarding to the UI layer
pub mod event_names {
    pub const REGISTRY_CHANGED: &str = "session:registry";
    pub const MODULE_REFRESHED: &str = "session:module-refreshed";
    pub const MODULE_REFRESH_FAILED: &str = "session:module-failed";
    pub const LIFECYCLE_CHANGED: &str = "session:lifecycle";
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SessionEvent {
    /// Post-mutation registry state; one per registry write
    #[serde(rename_all = "camelCase")]
    RegistryChanged { snapshot: RegistrySnapshot },

    /// Fresh module data was applied to the cache
    #[serde(rename_all = "camelCase")]
    ModuleRefreshed {
        session_id: String,
        module: ModuleKind,
        generation: u64,
    },

    /// A module refresh failed; previously cached data is kept
    #[serde(rename_all = "camelCase")]
    ModuleRefreshFailed {
        session_id: String,
        module: ModuleKind,
        generation: u64,
        error: String,
    },

    /// Connection lifecycle transition
    #[serde(rename_all = "camelCase")]
    LifecycleChanged {
        session_id: String,
        state: LifecycleState,
        reason: Option<String>,
    },
}

impl SessionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::RegistryChanged { .. } => event_names::REGISTRY_CHANGED,
            SessionEvent::ModuleRefreshed { .. } => event_names::MODULE_REFRESHED,
            SessionEvent::ModuleRefreshFailed { .. } => event_names::MODULE_REFRESH_FAILED,
            SessionEvent::LifecycleChanged { .. } => event_names::LIFECYCLE_CHANGED,
        }
    }
}

/// The bus type shared by the registry, orchestrator and manager
pub type SessionBus = SubscriptionBus<SessionEvent>;
