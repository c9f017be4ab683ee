//! Session Registry
//!
//! In-memory store of session entries and the single active pointer.
//! No I/O: host propagation is the coordinator's job.
//!
//! Every mutation publishes exactly one `SessionEvent::RegistryChanged`
//! carrying the post-mutation snapshot. The event is published after the
//! write lock is released so listeners can read the registry.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use tracing::{debug, info};

use super::error::SessionError;
use super::events::{SessionBus, SessionEvent};
use super::types::{ConnectionInfo, RegistrySnapshot, SessionEntry, SessionInfo};

#[derive(Default)]
struct RegistryInner {
    /// Entries in insertion order
    entries: Vec<SessionEntry>,
    /// Active session id (mirrors the single `is_active` flag)
    active: Option<String>,
    /// Bumped on every mutation
    revision: u64,
    /// Creation counter for `SessionEntry::seq`
    next_seq: u64,
}

impl RegistryInner {
    fn position(&self, session_id: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.session_id == session_id)
    }

    fn mark_active(&mut self, session_id: Option<&str>) {
        for entry in self.entries.iter_mut() {
            entry.is_active = Some(entry.session_id.as_str()) == session_id;
        }
        self.active = session_id.map(String::from);
    }

    fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            revision: self.revision,
            sessions: self.entries.iter().map(SessionInfo::from).collect(),
            active_session_id: self.active.clone(),
        }
    }
}

/// Result of `SessionRegistry::remove`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveOutcome {
    /// Whether an entry was actually removed
    pub removed: bool,
    /// Whether the removed entry was the active one
    pub was_active: bool,
    /// Entry that became active as a consequence, if any
    pub promoted: Option<String>,
}

/// Registry of all sessions of one application context
pub struct SessionRegistry {
    inner: RwLock<RegistryInner>,
    bus: Arc<SessionBus>,
}

impl SessionRegistry {
    pub fn new(bus: Arc<SessionBus>) -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
            bus,
        }
    }

    /// Insert a session and make it the active one.
    ///
    /// A duplicate id replaces the existing entry in place (reconnect).
    pub fn add(&self, session_id: &str, connection_info: ConnectionInfo) {
        let snapshot = {
            let mut inner = self.inner.write();
            let seq = inner.next_seq;
            inner.next_seq += 1;

            let entry = SessionEntry {
                session_id: session_id.to_string(),
                connection_info,
                is_active: false,
                created_at: Utc::now(),
                seq,
            };

            info!(
                "Registering session {}: {}@{}:{}",
                session_id,
                entry.connection_info.username,
                entry.connection_info.host,
                entry.connection_info.port
            );

            match inner.position(session_id) {
                Some(idx) => {
                    debug!("Session {} already registered, replacing entry", session_id);
                    inner.entries[idx] = entry;
                }
                None => inner.entries.push(entry),
            }

            inner.mark_active(Some(session_id));
            inner.revision += 1;
            inner.snapshot()
        };

        self.publish(snapshot);
    }

    /// Remove a session. Unknown ids are ignored.
    ///
    /// If the active entry goes away, the first remaining entry (insertion
    /// order) is promoted. Propagating that choice to the host is the
    /// caller's responsibility.
    pub fn remove(&self, session_id: &str) -> RemoveOutcome {
        let (outcome, snapshot) = {
            let mut inner = self.inner.write();
            let Some(idx) = inner.position(session_id) else {
                debug!("remove: session {} not registered", session_id);
                return RemoveOutcome {
                    removed: false,
                    was_active: false,
                    promoted: None,
                };
            };

            let entry = inner.entries.remove(idx);
            let mut promoted = None;
            if entry.is_active {
                promoted = inner.entries.first().map(|e| e.session_id.clone());
                let next = promoted.clone();
                inner.mark_active(next.as_deref());
            }
            inner.revision += 1;

            info!(
                "Session {} removed from registry (promoted: {:?})",
                session_id, promoted
            );

            (
                RemoveOutcome {
                    removed: true,
                    was_active: entry.is_active,
                    promoted,
                },
                inner.snapshot(),
            )
        };

        self.publish(snapshot);
        outcome
    }

    /// Move the active pointer. Only the activation coordinator calls this,
    /// after the host has acknowledged the switch.
    pub fn set_active(&self, session_id: &str) -> Result<(), SessionError> {
        self.set_active_with(session_id, || {})
    }

    /// `set_active`, running `on_switch` under the write lock right before the
    /// pointer moves. Work done there is ordered against `if_active`.
    pub fn set_active_with<F>(&self, session_id: &str, on_switch: F) -> Result<(), SessionError>
    where
        F: FnOnce(),
    {
        let snapshot = {
            let mut inner = self.inner.write();
            if inner.position(session_id).is_none() {
                return Err(SessionError::UnknownSession(session_id.to_string()));
            }
            on_switch();
            inner.mark_active(Some(session_id));
            inner.revision += 1;
            inner.snapshot()
        };

        debug!("Registry active session -> {}", session_id);
        self.publish(snapshot);
        Ok(())
    }

    /// Ordered snapshot of all entries
    pub fn get_all(&self) -> Vec<SessionEntry> {
        self.inner.read().entries.clone()
    }

    pub fn get(&self, session_id: &str) -> Option<SessionEntry> {
        let inner = self.inner.read();
        inner.position(session_id).map(|idx| inner.entries[idx].clone())
    }

    pub fn get_active(&self) -> Option<SessionEntry> {
        self.inner.read().entries.iter().find(|e| e.is_active).cloned()
    }

    pub fn active_id(&self) -> Option<String> {
        self.inner.read().active.clone()
    }

    pub fn is_active(&self, session_id: &str) -> bool {
        self.inner.read().active.as_deref() == Some(session_id)
    }

    /// Run `f` only if `session_id` is active, holding the read lock so the
    /// pointer cannot move while `f` runs. `f` must not touch the registry.
    pub fn if_active<R, F>(&self, session_id: &str, f: F) -> Option<R>
    where
        F: FnOnce() -> R,
    {
        let inner = self.inner.read();
        if inner.active.as_deref() == Some(session_id) {
            Some(f())
        } else {
            None
        }
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.inner.read().position(session_id).is_some()
    }

    pub fn count(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        self.inner.read().snapshot()
    }

    fn publish(&self, snapshot: RegistrySnapshot) {
        self.bus.publish(&SessionEvent::RegistryChanged { snapshot });
    }
}
