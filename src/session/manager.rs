//! Session Manager - connection lifecycle façade
//!
//! Owns connect / disconnect flows, saved connection profiles and the
//! quick-command catalog, and wires
//! the registry, the activation coordinator and the refresh orchestrator
//! into one session lifecycle:
//!
//! ```text
//! connect:    host.connect -> registry.add -> host.set_current_session -> refresh_all
//! disconnect: host.disconnect -> registry.remove -> (promoted) set_current_session -> refresh_all
//! ```
//!
//! A session that connected but failed activation or refresh stays registered
//! and is reported as degraded. A session whose disconnect failed stays
//! registered as connected.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::cache::{CachedModule, ModuleCache};
use super::coordinator::ActivationCoordinator;
use super::error::SessionError;
use super::events::{SessionBus, SessionEvent};
use super::refresh::{ModuleRefreshOrchestrator, RefreshOutcome};
use super::registry::SessionRegistry;
use super::state::{LifecycleState, LifecycleStateMachine, TransitionError};
use super::types::{ConnectionInfo, ModuleKind, SessionInfo};
use crate::bus::{ListenerError, SubscriptionHandle};
use crate::config::{
    CatalogError, CommandCatalog, ConfigStorage, ConnectionCatalog, CoordinatorConfig,
    SavedConnection, SshCommand, StorageError,
};
use crate::host::{HostBridge, Notifier, Severity};

/// Result of a successful host connect
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectOutcome {
    pub session_id: String,
    /// Refresh result, if activation got that far
    pub refresh: Option<RefreshOutcome>,
    /// Activation or refresh problem; the session is still connected
    pub degraded: Option<SessionError>,
}

impl ConnectOutcome {
    pub fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }
}

/// Result of a successful host disconnect
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisconnectOutcome {
    /// Session that became active because the removed one was active
    pub promoted: Option<String>,
    /// Failure to make the promoted session current on the host
    pub propagation_error: Option<SessionError>,
    pub refresh: Option<RefreshOutcome>,
}

/// Lifecycle status of one session, for the UI
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    pub session_id: String,
    pub state: LifecycleState,
    pub error: Option<String>,
    pub degraded: Option<String>,
}

/// Errors of the command and saved-connection operations
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("Failed to persist config: {0}")]
    Storage(#[from] StorageError),
}

pub struct SessionManager {
    registry: Arc<SessionRegistry>,
    coordinator: Arc<ActivationCoordinator>,
    orchestrator: Arc<ModuleRefreshOrchestrator>,
    cache: Arc<ModuleCache>,
    host: Arc<dyn HostBridge>,
    notifier: Arc<dyn Notifier>,
    bus: Arc<SessionBus>,
    /// Lifecycle of every session known to the manager (connecting included)
    lifecycles: DashMap<String, LifecycleStateMachine>,
    /// Lock for the connection limit check to prevent TOCTOU race
    create_lock: parking_lot::Mutex<()>,
    catalog: parking_lot::RwLock<CommandCatalog>,
    connections: parking_lot::RwLock<ConnectionCatalog>,
    /// Session id -> saved connection it was opened from
    profile_sessions: DashMap<String, String>,
    storage: Option<ConfigStorage>,
    config: CoordinatorConfig,
}

impl SessionManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<SessionRegistry>,
        coordinator: Arc<ActivationCoordinator>,
        orchestrator: Arc<ModuleRefreshOrchestrator>,
        cache: Arc<ModuleCache>,
        host: Arc<dyn HostBridge>,
        notifier: Arc<dyn Notifier>,
        bus: Arc<SessionBus>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            registry,
            coordinator,
            orchestrator,
            cache,
            host,
            notifier,
            bus,
            lifecycles: DashMap::new(),
            create_lock: parking_lot::Mutex::new(()),
            catalog: parking_lot::RwLock::new(CommandCatalog::new()),
            connections: parking_lot::RwLock::new(ConnectionCatalog::default()),
            profile_sessions: DashMap::new(),
            storage: None,
            config,
        }
    }

    /// Persist command and connection changes through `storage`
    pub fn with_storage(mut self, storage: ConfigStorage) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    // ========================================================================
    // Read surface
    // ========================================================================

    pub fn get_sessions(&self) -> Vec<SessionInfo> {
        self.registry.get_all().iter().map(SessionInfo::from).collect()
    }

    pub fn get_active_session_id(&self) -> Option<String> {
        self.registry.active_id()
    }

    pub fn get_active_session(&self) -> Option<SessionInfo> {
        self.registry.get_active().as_ref().map(SessionInfo::from)
    }

    pub fn connection_state(&self, session_id: &str) -> Option<ConnectionStatus> {
        self.lifecycles.get(session_id).map(|m| ConnectionStatus {
            session_id: session_id.to_string(),
            state: m.state(),
            error: m.error().map(String::from),
            degraded: m.degraded().map(String::from),
        })
    }

    /// Cached module data of the active session
    pub fn active_module_data(&self, module: ModuleKind) -> Option<CachedModule> {
        let active = self.registry.active_id()?;
        self.cache.get(module, &active)
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionHandle
    where
        F: Fn(&SessionEvent) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        self.bus.subscribe(listener)
    }

    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        self.bus.unsubscribe(handle)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Connect with the configured timeout
    pub async fn connect(&self, info: ConnectionInfo) -> Result<ConnectOutcome, SessionError> {
        self.connect_with_timeout(info, self.config.connect_timeout())
            .await
    }

    /// Open a new session.
    ///
    /// Host failure: nothing is registered and the error is returned.
    /// Host success: the session is registered even if activation or refresh
    /// fails afterwards (reported in `ConnectOutcome::degraded`).
    pub async fn connect_with_timeout(
        &self,
        info: ConnectionInfo,
        limit: Duration,
    ) -> Result<ConnectOutcome, SessionError> {
        let session_id = uuid::Uuid::new_v4().to_string();

        {
            let _guard = self.create_lock.lock();
            let current = self.lifecycles.len();
            let max = self.config.max_sessions;
            if current >= max {
                warn!("Connection limit reached: {}/{}", current, max);
                return Err(SessionError::ConnectionLimitReached { current, max });
            }
            let mut machine = LifecycleStateMachine::new();
            machine.start_connecting()?;
            self.lifecycles.insert(session_id.clone(), machine);
        }
        self.publish_lifecycle(&session_id);

        info!(
            "Connecting session {}: {}@{}:{}",
            session_id, info.username, info.host, info.port
        );

        let result = match timeout(limit, self.host.connect(&session_id, &info)).await {
            Ok(r) => r.map_err(SessionError::from),
            Err(_) => Err(SessionError::Timeout {
                operation: "connect",
                after: limit,
            }),
        };

        if let Err(e) = result {
            warn!("Session {} connection failed: {}", session_id, e);
            self.transition(&session_id, |m| m.connect_failed(e.to_string()))?;
            self.publish_lifecycle(&session_id);
            // Failed is terminal for the attempt
            self.transition(&session_id, |m| m.reset())?;
            self.lifecycles.remove(&session_id);
            self.publish_lifecycle_state(&session_id, LifecycleState::Idle, Some(e.to_string()));
            self.notifier.notify(
                &format!("Connection to {} failed: {}", info.display_name(), e),
                Severity::Error,
            );
            return Err(e);
        }

        self.transition(&session_id, |m| m.connect_success())?;
        self.publish_lifecycle(&session_id);

        let display = info.display_name();
        let (refresh, degraded) = self.activate_new(&session_id, info).await;
        self.record_degraded(&session_id, degraded.as_ref());

        match &degraded {
            None => self
                .notifier
                .notify(&format!("Connected to {}", display), Severity::Success),
            Some(e) => self.notifier.notify(
                &format!("Connected to {} with problems: {}", display, e),
                Severity::Warning,
            ),
        }

        Ok(ConnectOutcome {
            session_id,
            refresh,
            degraded,
        })
    }

    /// Register a session whose connection was established outside this
    /// manager (e.g. a host-side reconnect), then activate and refresh it.
    ///
    /// Re-adding a known id replaces its registry entry.
    pub async fn add_session(
        &self,
        session_id: &str,
        info: ConnectionInfo,
    ) -> Result<ConnectOutcome, SessionError> {
        {
            let _guard = self.create_lock.lock();
            if !self.lifecycles.contains_key(session_id) {
                let current = self.lifecycles.len();
                let max = self.config.max_sessions;
                if current >= max {
                    return Err(SessionError::ConnectionLimitReached { current, max });
                }
                let mut machine = LifecycleStateMachine::new();
                machine.start_connecting()?;
                machine.connect_success()?;
                self.lifecycles.insert(session_id.to_string(), machine);
            }
        }
        self.publish_lifecycle(session_id);

        let (refresh, degraded) = self.activate_new(session_id, info).await;
        self.record_degraded(session_id, degraded.as_ref());

        Ok(ConnectOutcome {
            session_id: session_id.to_string(),
            refresh,
            degraded,
        })
    }

    /// Disconnect with the configured timeout
    pub async fn disconnect(&self, session_id: &str) -> Result<DisconnectOutcome, SessionError> {
        self.disconnect_with_timeout(session_id, self.config.disconnect_timeout())
            .await
    }

    /// Close a session on the host, then drop it from the registry.
    ///
    /// If the host call fails the session stays registered and connected.
    pub async fn disconnect_with_timeout(
        &self,
        session_id: &str,
        limit: Duration,
    ) -> Result<DisconnectOutcome, SessionError> {
        self.transition(session_id, |m| m.start_disconnecting())?;
        self.publish_lifecycle(session_id);

        info!("Disconnecting session {}", session_id);
        let result = match timeout(limit, self.host.disconnect(session_id)).await {
            Ok(r) => r.map_err(SessionError::from),
            Err(_) => Err(SessionError::Timeout {
                operation: "disconnect",
                after: limit,
            }),
        };

        if let Err(e) = result {
            warn!("Session {} disconnect failed: {}", session_id, e);
            self.transition(session_id, |m| m.disconnect_failed(e.to_string()))?;
            self.publish_lifecycle(session_id);
            self.notifier
                .notify(&format!("Disconnect failed: {}", e), Severity::Error);
            return Err(e);
        }

        self.transition(session_id, |m| m.disconnect_complete())?;
        self.lifecycles.remove(session_id);
        self.publish_lifecycle_state(session_id, LifecycleState::Idle, None);

        let outcome = self.drop_session(session_id).await;
        self.notifier.notify("Session disconnected", Severity::Info);
        Ok(outcome)
    }

    /// Force a session out of the registry without calling the host
    /// (the host reported the connection dead, or the user discarded it).
    pub async fn remove_session(&self, session_id: &str) -> DisconnectOutcome {
        if self.lifecycles.remove(session_id).is_some() {
            self.publish_lifecycle_state(
                session_id,
                LifecycleState::Idle,
                Some("removed".to_string()),
            );
        }
        self.drop_session(session_id).await
    }

    /// Switch the active session and refresh its modules.
    ///
    /// Switch failures leave the previous active session in place. Module
    /// failures are reported in the outcome, not as an error.
    pub async fn switch_session(&self, session_id: &str) -> Result<RefreshOutcome, SessionError> {
        if let Err(e) = self.coordinator.switch_to(session_id).await {
            self.notifier
                .notify(&format!("Switch failed: {}", e), Severity::Error);
            return Err(e);
        }

        let outcome = match self.orchestrator.refresh_all(session_id).await {
            Ok(outcome) => outcome,
            // A later queued switch already moved on; this switch still succeeded
            Err(SessionError::SessionNotActive(_)) => {
                debug!("Switch to {} superseded before refresh", session_id);
                return Ok(RefreshOutcome {
                    session_id: session_id.to_string(),
                    stale: self.orchestrator.modules(),
                    ..Default::default()
                });
            }
            Err(e) => return Err(e),
        };
        let degraded = outcome.partial_error().map(SessionError::from);
        self.record_degraded(session_id, degraded.as_ref());
        if let Some(e) = degraded {
            self.notifier.notify(&e.to_string(), Severity::Warning);
        }
        Ok(outcome)
    }

    /// Refresh the active session's modules without switching
    pub async fn refresh_active(&self) -> Result<RefreshOutcome, SessionError> {
        let active = self
            .registry
            .active_id()
            .ok_or(SessionError::NoActiveSession)?;
        let outcome = self.orchestrator.refresh_all(&active).await?;
        let degraded = outcome.partial_error().map(SessionError::from);
        self.record_degraded(&active, degraded.as_ref());
        Ok(outcome)
    }

    /// Disconnect every registered session. Returns the failures.
    pub async fn disconnect_all(&self) -> Vec<(String, SessionError)> {
        let mut failures = Vec::new();
        for entry in self.registry.get_all() {
            let id = entry.session_id;
            let connected = self
                .lifecycles
                .get(&id)
                .map(|m| m.state() == LifecycleState::Connected)
                .unwrap_or(false);
            if !connected {
                debug!("disconnect_all: skipping {} (not connected)", id);
                continue;
            }
            if let Err(e) = self.disconnect(&id).await {
                failures.push((id, e));
            }
        }
        info!("disconnect_all done, {} failures", failures.len());
        failures
    }

    // ========================================================================
    // Saved connections
    // ========================================================================

    pub fn saved_connections(&self) -> Vec<SavedConnection> {
        self.connections.read().connections().to_vec()
    }

    pub fn saved_connection(&self, connection_id: &str) -> Option<SavedConnection> {
        self.connections.read().get(connection_id).cloned()
    }

    /// Save a profile; secrets are never stored
    pub async fn save_connection(&self, connection: SavedConnection) -> Result<String, ConfigError> {
        let id = self.connections.write().add(connection)?;
        self.persist().await?;
        info!("Saved connection {}", id);
        Ok(id)
    }

    pub async fn remove_saved_connection(&self, connection_id: &str) -> Result<(), ConfigError> {
        self.connections.write().remove(connection_id)?;
        self.persist().await
    }

    /// Connect using a saved profile. `secret` is the password, or the key
    /// passphrase for profiles saved with one.
    pub async fn connect_saved(
        &self,
        connection_id: &str,
        secret: Option<String>,
    ) -> Result<ConnectOutcome, SessionError> {
        let profile = self
            .saved_connection(connection_id)
            .ok_or_else(|| SessionError::UnknownProfile(connection_id.to_string()))?;
        let info = profile
            .to_connection_info(secret)
            .map_err(|e| SessionError::Auth(e.to_string()))?;

        let outcome = self.connect(info).await?;
        self.profile_sessions
            .insert(outcome.session_id.clone(), connection_id.to_string());

        let marked = self.connections.write().mark_used(connection_id);
        match marked {
            Ok(()) => {
                if let Err(e) = self.persist().await {
                    warn!("Failed to record last use of {}: {}", connection_id, e);
                }
            }
            Err(e) => debug!("Profile gone after connect: {}", e),
        }
        Ok(outcome)
    }

    /// Disconnect every session opened from a saved profile. Returns the failures.
    pub async fn disconnect_saved(&self, connection_id: &str) -> Vec<(String, SessionError)> {
        let mut failures = Vec::new();
        for id in self.sessions_of(connection_id) {
            if let Err(e) = self.disconnect(&id).await {
                failures.push((id, e));
            }
        }
        failures
    }

    /// Sessions currently open from `connection_id`
    pub fn sessions_of(&self, connection_id: &str) -> Vec<String> {
        self.profile_sessions
            .iter()
            .filter(|e| e.value() == connection_id)
            .map(|e| e.key().clone())
            .collect()
    }

    // ========================================================================
    // Command catalog
    // ========================================================================

    /// Reload saved commands and connections from storage
    pub async fn load_saved(&self) -> Result<(), ConfigError> {
        if let Some(storage) = &self.storage {
            let file = storage.load().await?;
            self.restore(file.commands, file.connections);
        }
        Ok(())
    }

    /// Replace both catalogs with the saved state
    pub(crate) fn restore(&self, commands: Vec<SshCommand>, connections: Vec<SavedConnection>) {
        info!(
            "Loaded {} saved commands, {} saved connections",
            commands.len(),
            connections.len()
        );
        *self.catalog.write() = CommandCatalog::with_saved(commands);
        *self.connections.write() = ConnectionCatalog::new(connections);
    }

    pub fn commands(&self) -> Vec<SshCommand> {
        self.catalog.read().commands().to_vec()
    }

    pub fn commands_by_category(&self) -> BTreeMap<String, Vec<SshCommand>> {
        self.catalog.read().by_category()
    }

    pub fn favorite_commands(&self) -> Vec<SshCommand> {
        self.catalog.read().favorites()
    }

    pub async fn add_command(&self, command: SshCommand) -> Result<String, ConfigError> {
        let id = self.catalog.write().add(command)?;
        self.persist().await?;
        Ok(id)
    }

    pub async fn remove_command(&self, command_id: &str) -> Result<(), ConfigError> {
        self.catalog.write().remove(command_id)?;
        self.persist().await
    }

    pub async fn toggle_command_favorite(&self, command_id: &str) -> Result<bool, ConfigError> {
        let favorite = self.catalog.write().toggle_favorite(command_id)?;
        self.persist().await?;
        Ok(favorite)
    }

    /// Write both catalogs, keeping the rest of the file as is
    async fn persist(&self) -> Result<(), ConfigError> {
        let Some(storage) = &self.storage else {
            return Ok(());
        };
        let commands = self.catalog.read().to_saved();
        let connections = self.connections.read().connections().to_vec();
        let mut file = storage.load().await?;
        file.commands = commands;
        file.connections = connections;
        storage.save(&file).await?;
        Ok(())
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Register + activate + refresh. Returns (refresh, degraded reason).
    async fn activate_new(
        &self,
        session_id: &str,
        info: ConnectionInfo,
    ) -> (Option<RefreshOutcome>, Option<SessionError>) {
        if let Err(e) = self
            .coordinator
            .register_and_activate(session_id, info, self.config.switch_timeout())
            .await
        {
            warn!("Session {} connected but activation failed: {}", session_id, e);
            return (None, Some(e));
        }

        match self.orchestrator.refresh_all(session_id).await {
            Ok(outcome) => {
                let degraded = outcome.partial_error().map(SessionError::from);
                (Some(outcome), degraded)
            }
            Err(e) => {
                warn!("Session {} connected but refresh failed: {}", session_id, e);
                (None, Some(e))
            }
        }
    }

    /// Registry removal + promotion propagation + refresh of the promoted session
    async fn drop_session(&self, session_id: &str) -> DisconnectOutcome {
        self.orchestrator.forget_session(session_id);
        self.profile_sessions.remove(session_id);

        let mut outcome = DisconnectOutcome {
            promoted: None,
            propagation_error: None,
            refresh: None,
        };

        match self
            .coordinator
            .remove_and_propagate(session_id, self.config.switch_timeout())
            .await
        {
            Ok(Some(next)) => {
                outcome.promoted = Some(next.clone());
                match self.orchestrator.refresh_all(&next).await {
                    Ok(refresh) => {
                        let degraded = refresh.partial_error().map(SessionError::from);
                        self.record_degraded(&next, degraded.as_ref());
                        outcome.refresh = Some(refresh);
                    }
                    Err(e) => debug!("Refresh of promoted session {} skipped: {}", next, e),
                }
            }
            Ok(None) => {}
            Err(e) => {
                warn!(
                    "Session {} removed but promoting the next session failed: {}",
                    session_id, e
                );
                outcome.promoted = self.registry.active_id();
                if let Some(next) = &outcome.promoted {
                    self.record_degraded(next, Some(&e));
                }
                outcome.propagation_error = Some(e);
            }
        }

        outcome
    }

    fn transition<F>(&self, session_id: &str, f: F) -> Result<LifecycleState, SessionError>
    where
        F: FnOnce(&mut LifecycleStateMachine) -> Result<(), TransitionError>,
    {
        let mut machine = self
            .lifecycles
            .get_mut(session_id)
            .ok_or_else(|| SessionError::UnknownSession(session_id.to_string()))?;
        f(machine.value_mut())?;
        Ok(machine.state())
    }

    fn record_degraded(&self, session_id: &str, reason: Option<&SessionError>) {
        if let Some(mut machine) = self.lifecycles.get_mut(session_id) {
            machine.set_degraded(reason.map(|e| e.to_string()));
        }
    }

    /// Publish the current lifecycle state of a tracked session
    fn publish_lifecycle(&self, session_id: &str) {
        // Copy out before publishing: listeners may read `connection_state`
        let current = self
            .lifecycles
            .get(session_id)
            .map(|m| (m.state(), m.error().map(String::from)));
        if let Some((state, reason)) = current {
            self.publish_lifecycle_state(session_id, state, reason);
        }
    }

    fn publish_lifecycle_state(&self, session_id: &str, state: LifecycleState, reason: Option<String>) {
        debug!("Session {} lifecycle -> {}", session_id, state);
        self.bus.publish(&SessionEvent::LifecycleChanged {
            session_id: session_id.to_string(),
            state,
            reason,
        });
    }
}
