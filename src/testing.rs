//! Scripted collaborators for unit tests

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::host::{HostBridge, HostError, ModuleFetcher, Notifier, Severity};
use crate::session::{ConnectionInfo, ModuleData, ModuleKind};

/// Host double: records calls and fails on demand
#[derive(Default)]
pub struct ScriptedHost {
    pub current: Mutex<Option<String>>,
    pub calls: Mutex<Vec<String>>,
    /// Hosts (by `ConnectionInfo::host`) whose connect fails
    pub connect_failures: Mutex<HashMap<String, HostError>>,
    /// Sessions whose disconnect fails
    pub disconnect_failures: Mutex<HashMap<String, HostError>>,
    /// Sessions the host refuses to make current
    pub rejected_switches: Mutex<HashSet<String>>,
    pub switch_delay: Mutex<Duration>,
    pub connect_delay: Mutex<Duration>,
    in_flight_switches: AtomicUsize,
    pub max_in_flight_switches: AtomicUsize,
}

impl ScriptedHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn current(&self) -> Option<String> {
        self.current.lock().clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn fail_connect(&self, host: &str, err: HostError) {
        self.connect_failures.lock().insert(host.to_string(), err);
    }

    pub fn fail_disconnect(&self, session_id: &str, err: HostError) {
        self.disconnect_failures
            .lock()
            .insert(session_id.to_string(), err);
    }

    pub fn heal_disconnect(&self, session_id: &str) {
        self.disconnect_failures.lock().remove(session_id);
    }

    pub fn reject_switch(&self, session_id: &str) {
        self.rejected_switches.lock().insert(session_id.to_string());
    }

    pub fn set_switch_delay(&self, delay: Duration) {
        *self.switch_delay.lock() = delay;
    }

    pub fn set_connect_delay(&self, delay: Duration) {
        *self.connect_delay.lock() = delay;
    }
}

#[async_trait]
impl HostBridge for ScriptedHost {
    async fn connect(&self, _session_id: &str, info: &ConnectionInfo) -> Result<(), HostError> {
        self.calls.lock().push(format!("connect:{}", info.host));
        let delay = *self.connect_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.connect_failures.lock().get(&info.host) {
            return Err(err.clone());
        }
        Ok(())
    }

    async fn disconnect(&self, session_id: &str) -> Result<(), HostError> {
        self.calls.lock().push(format!("disconnect:{}", session_id));
        if let Some(err) = self.disconnect_failures.lock().get(session_id) {
            return Err(err.clone());
        }
        let mut current = self.current.lock();
        if current.as_deref() == Some(session_id) {
            *current = None;
        }
        Ok(())
    }

    async fn set_current_session(&self, session_id: &str) -> Result<(), HostError> {
        let in_flight = self.in_flight_switches.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight_switches
            .fetch_max(in_flight, Ordering::SeqCst);
        self.calls.lock().push(format!("switch:{}", session_id));

        let delay = *self.switch_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let result = if self.rejected_switches.lock().contains(session_id) {
            Err(HostError::Rejected(format!("{} refused", session_id)))
        } else {
            *self.current.lock() = Some(session_id.to_string());
            Ok(())
        };

        self.in_flight_switches.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Module fetcher double with a configurable result and an optional gate
pub struct ScriptedFetcher {
    kind: ModuleKind,
    result: Mutex<Result<ModuleData, HostError>>,
    /// Shared log of `module:session` calls, in call order
    log: Arc<Mutex<Vec<String>>>,
    gate: Mutex<Option<Arc<Notify>>>,
    delay: Mutex<Duration>,
}

impl ScriptedFetcher {
    pub fn new(kind: ModuleKind, log: Arc<Mutex<Vec<String>>>) -> Arc<Self> {
        Arc::new(Self {
            kind,
            result: Mutex::new(Ok(serde_json::json!({ "module": kind.as_str() }))),
            log,
            gate: Mutex::new(None),
            delay: Mutex::new(Duration::ZERO),
        })
    }

    pub fn fail_with(&self, err: HostError) {
        *self.result.lock() = Err(err);
    }

    pub fn succeed_with(&self, data: ModuleData) {
        *self.result.lock() = Ok(data);
    }

    /// Hold every refresh until the returned `Notify` is signalled
    pub fn gate(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.gate.lock() = Some(notify.clone());
        notify
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }
}

#[async_trait]
impl ModuleFetcher for ScriptedFetcher {
    fn kind(&self) -> ModuleKind {
        self.kind
    }

    async fn refresh(&self, session_id: &str) -> Result<ModuleData, HostError> {
        self.log
            .lock()
            .push(format!("{}:{}", self.kind.as_str(), session_id));

        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.result.lock().clone()
    }
}

/// Notifier that keeps every message
#[derive(Default)]
pub struct RecordingNotifier {
    pub messages: Mutex<Vec<(String, Severity)>>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn severities(&self) -> Vec<Severity> {
        self.messages.lock().iter().map(|(_, s)| *s).collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, message: &str, severity: Severity) {
        self.messages.lock().push((message.to_string(), severity));
    }
}

/// One fetcher per module, all sharing `log`
pub fn fetcher_set(log: &Arc<Mutex<Vec<String>>>) -> Vec<Arc<ScriptedFetcher>> {
    ModuleKind::ALL
        .iter()
        .map(|kind| ScriptedFetcher::new(*kind, log.clone()))
        .collect()
}
