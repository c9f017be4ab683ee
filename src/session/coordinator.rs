//! Activation Coordinator
//!
//! Makes the host agree on which session is current.
//!
//! - One async mutex (FIFO, tokio's Mutex is fair) serializes every
//!   activation, registry add and registry remove that goes through here, so
//!   the host never sees interleaved `set_current_session` calls.
//! - Waiting requests are queued; once `max_pending` requests are waiting, new
//!   plain switches are rejected with `ConcurrentSwitchRejected`.
//! - Foreign cache entries are evicted only after the host acknowledged the
//!   switch, and before the registry pointer moves.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::cache::ModuleCache;
use super::error::SessionError;
use super::registry::SessionRegistry;
use super::types::ConnectionInfo;
use crate::host::HostBridge;

/// Decrements the pending counter when a queued request leaves the queue
struct PendingGuard<'a>(&'a AtomicUsize);

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct ActivationCoordinator {
    registry: Arc<SessionRegistry>,
    host: Arc<dyn HostBridge>,
    cache: Arc<ModuleCache>,
    /// Held for the whole duration of one activation / add / remove
    switch_lock: Mutex<()>,
    /// Requests waiting for or holding `switch_lock`
    pending: AtomicUsize,
    max_pending: usize,
    switch_timeout: Duration,
    /// Last session id the host acknowledged as current
    host_current: RwLock<Option<String>>,
}

impl ActivationCoordinator {
    pub fn new(
        registry: Arc<SessionRegistry>,
        host: Arc<dyn HostBridge>,
        cache: Arc<ModuleCache>,
        switch_timeout: Duration,
        max_pending: usize,
    ) -> Self {
        Self {
            registry,
            host,
            cache,
            switch_lock: Mutex::new(()),
            pending: AtomicUsize::new(0),
            max_pending: max_pending.max(1),
            switch_timeout,
            host_current: RwLock::new(None),
        }
    }

    /// Session id the host currently treats as the target of its commands
    pub fn host_current(&self) -> Option<String> {
        self.host_current.read().clone()
    }

    /// Requests currently queued or running
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn switch_timeout(&self) -> Duration {
        self.switch_timeout
    }

    /// Join the activation queue. Only plain switches are `bounded`: registry
    /// add / remove carry lifecycle obligations and always wait their turn.
    fn enqueue(&self, bounded: bool) -> Result<PendingGuard<'_>, SessionError> {
        let prev = self.pending.fetch_add(1, Ordering::SeqCst);
        let guard = PendingGuard(&self.pending);
        if bounded && prev >= self.max_pending {
            warn!(
                "Activation queue full ({} pending), rejecting request",
                prev
            );
            return Err(SessionError::ConcurrentSwitchRejected { pending: prev });
        }
        Ok(guard)
    }

    /// Switch the current session using the configured timeout
    pub async fn switch_to(&self, session_id: &str) -> Result<(), SessionError> {
        self.switch_to_with_timeout(session_id, self.switch_timeout)
            .await
    }

    /// Switch the current session, bounding the host call by `limit`.
    ///
    /// On failure the registry pointer is untouched.
    pub async fn switch_to_with_timeout(
        &self,
        session_id: &str,
        limit: Duration,
    ) -> Result<(), SessionError> {
        let _pending = self.enqueue(true)?;
        let _lock = self.switch_lock.lock().await;
        self.activate_locked(session_id, limit).await
    }

    /// Register a session and make it current on both sides.
    ///
    /// If the host refuses, the previously active session is restored as the
    /// registry's active entry (the new entry stays registered).
    pub async fn register_and_activate(
        &self,
        session_id: &str,
        info: ConnectionInfo,
        limit: Duration,
    ) -> Result<(), SessionError> {
        let _pending = self.enqueue(false)?;
        let _lock = self.switch_lock.lock().await;

        let previous = self.registry.active_id();
        self.registry.add(session_id, info);

        match self.activate_locked(session_id, limit).await {
            Ok(()) => Ok(()),
            Err(e) => {
                if let Some(prev) = previous.filter(|p| p != session_id) {
                    if self.registry.contains(&prev) {
                        debug!(
                            "Activation of {} failed, restoring {} as active",
                            session_id, prev
                        );
                        // prev is known to exist, cannot fail
                        let _ = self.registry.set_active(&prev);
                    }
                }
                Err(e)
            }
        }
    }

    /// Remove a session and propagate any auto-promotion to the host.
    ///
    /// Returns the promoted session id. The removal itself always happens; an
    /// `Err` means only the propagation of the promoted entry failed.
    pub async fn remove_and_propagate(
        &self,
        session_id: &str,
        limit: Duration,
    ) -> Result<Option<String>, SessionError> {
        let _pending = self.enqueue(false)?;
        let _lock = self.switch_lock.lock().await;

        let outcome = self.registry.remove(session_id);
        self.cache.evict_session(session_id);
        {
            let mut current = self.host_current.write();
            if current.as_deref() == Some(session_id) {
                *current = None;
            }
        }

        match outcome.promoted {
            Some(next) => {
                self.activate_locked(&next, limit).await?;
                Ok(Some(next))
            }
            None => Ok(None),
        }
    }

    /// Host handshake; caller must hold `switch_lock`
    async fn activate_locked(&self, session_id: &str, limit: Duration) -> Result<(), SessionError> {
        if !self.registry.contains(session_id) {
            return Err(SessionError::UnknownSession(session_id.to_string()));
        }

        debug!("Asking host to make {} current", session_id);
        match timeout(limit, self.host.set_current_session(session_id)).await {
            Err(_) => {
                warn!(
                    "set_current_session({}) timed out after {:?}",
                    session_id, limit
                );
                return Err(SessionError::Timeout {
                    operation: "set_current_session",
                    after: limit,
                });
            }
            Ok(Err(e)) => {
                warn!("Host refused to switch to {}: {}", session_id, e);
                return Err(e.into());
            }
            Ok(Ok(())) => {}
        }

        *self.host_current.write() = Some(session_id.to_string());

        // 主机已确认后才清理其它会话的缓存；与指针切换在同一把写锁内完成
        let cache = &self.cache;
        if let Err(e) = self
            .registry
            .set_active_with(session_id, || cache.retain_session(session_id))
        {
            // Only reachable if the entry was removed behind the coordinator's back
            warn!(
                "Host switched to {} but the registry no longer has it: {}",
                session_id, e
            );
            return Err(e);
        }

        info!("Active session -> {}", session_id);
        Ok(())
    }
}
