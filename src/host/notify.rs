//! User-facing notification sink

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

/// Severity of a user-facing notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

/// Fire-and-forget sink for outcome messages.
///
/// Implementations must not block: the core calls `notify` inline from its
/// async flows.
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str, severity: Severity);
}

/// Notifier that only writes to the log.
///
/// Used when no UI layer is attached (tests, headless runs).
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, message: &str, severity: Severity) {
        match severity {
            Severity::Info | Severity::Success => info!(target: "notify", "{}", message),
            Severity::Warning => warn!(target: "notify", "{}", message),
            Severity::Error => error!(target: "notify", "{}", message),
        }
    }
}
