//! Session Coordination Module
//!
//! Keeps every open remote session, the active-session pointer and the host's
//! idea of the current session in agreement:
//! - `SessionRegistry`: ordered entries + single active pointer
//! - `ActivationCoordinator`: serialized, acknowledged host switches
//! - `ModuleRefreshOrchestrator`: per-module refresh with stale-result discard
//! - `SessionManager`: connect / disconnect lifecycle façade
//! - Lifecycle state machine per session, published on the session bus

mod cache;
mod coordinator;
mod error;
pub mod events;
mod manager;
mod refresh;
mod registry;
mod state;
pub mod types;

pub use cache::{CachedModule, ModuleCache};
pub use coordinator::ActivationCoordinator;
pub use error::{ModuleFailure, PartialRefreshError, SessionError};
pub use events::{event_names, SessionBus, SessionEvent};
pub use manager::{
    ConfigError, ConnectOutcome, ConnectionStatus, DisconnectOutcome, SessionManager,
};
pub use refresh::{ModuleRefreshOrchestrator, RefreshOutcome};
pub use registry::{RemoveOutcome, SessionRegistry};
pub use state::{LifecycleState, LifecycleStateMachine, TransitionError};
pub use types::{
    AuthMethod, ConnectionInfo, ModuleData, ModuleKind, RegistrySnapshot, SessionEntry,
    SessionInfo,
};
