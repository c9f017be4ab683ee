//! LovelyRes core - multi-session coordination for a remote administration client
//!
//! Several SSH sessions stay open at once; exactly one is active. This crate
//! keeps the session registry, the host's current session and the cached
//! module data of the active session consistent while the user connects,
//! disconnects and switches between sessions.

pub mod bus;
pub mod config;
pub mod context;
pub mod host;
pub mod session;

#[cfg(test)]
mod testing;

pub use bus::{EventSequencer, ListenerError, SubscriptionBus, SubscriptionHandle};
pub use context::SessionContext;
pub use host::{HostBridge, HostError, ModuleFetcher, Notifier, Severity, TracingNotifier};
pub use session::{
    ConnectOutcome, ConnectionInfo, DisconnectOutcome, ModuleKind, RefreshOutcome, SessionError,
    SessionEvent, SessionManager,
};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize logging (`RUST_LOG` overrides the default `info` filter).
///
/// Safe to call more than once; only the first call installs a subscriber.
pub fn init_logging() {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
