//! Module Refresh Orchestrator
//!
//! Pulls fresh data for every dependent module of the active session, one
//! module at a time in priority order (see `ModuleKind`).
//!
//! A refresh is never cancelled when the active session changes underneath
//! it. Instead each result is checked at apply time: if its session is no
//! longer the active one the data is discarded as stale.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::cache::ModuleCache;
use super::error::{ModuleFailure, PartialRefreshError, SessionError};
use super::events::{SessionBus, SessionEvent};
use super::registry::SessionRegistry;
use super::types::ModuleKind;
use crate::bus::EventSequencer;
use crate::host::ModuleFetcher;

/// Per-module classification of one `refresh_all` run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshOutcome {
    pub session_id: String,
    /// Modules whose fresh data was applied
    pub applied: Vec<ModuleKind>,
    /// Modules whose data arrived after the session stopped being active
    pub stale: Vec<ModuleKind>,
    /// Modules that failed; their previous data is kept
    pub failures: Vec<ModuleFailure>,
}

impl RefreshOutcome {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failed_modules(&self) -> Vec<ModuleKind> {
        self.failures.iter().map(|f| f.module).collect()
    }

    /// The aggregate error for failed modules, if any
    pub fn partial_error(&self) -> Option<PartialRefreshError> {
        if self.failures.is_empty() {
            None
        } else {
            Some(PartialRefreshError {
                session_id: self.session_id.clone(),
                failures: self.failures.clone(),
            })
        }
    }

    /// `Err(PartialRefresh)` if any module failed
    pub fn into_result(self) -> Result<Self, SessionError> {
        match self.partial_error() {
            Some(err) => Err(err.into()),
            None => Ok(self),
        }
    }
}

pub struct ModuleRefreshOrchestrator {
    registry: Arc<SessionRegistry>,
    cache: Arc<ModuleCache>,
    bus: Arc<SessionBus>,
    /// Sorted by `ModuleKind` priority
    fetchers: Vec<Arc<dyn ModuleFetcher>>,
    sequencer: EventSequencer,
    refresh_timeout: Duration,
}

impl ModuleRefreshOrchestrator {
    pub fn new(
        registry: Arc<SessionRegistry>,
        cache: Arc<ModuleCache>,
        bus: Arc<SessionBus>,
        mut fetchers: Vec<Arc<dyn ModuleFetcher>>,
        refresh_timeout: Duration,
    ) -> Self {
        // Stable: two fetchers of the same kind keep their registration order
        fetchers.sort_by_key(|f| f.kind());
        Self {
            registry,
            cache,
            bus,
            fetchers,
            sequencer: EventSequencer::new(),
            refresh_timeout,
        }
    }

    /// Modules in the order they are refreshed
    pub fn modules(&self) -> Vec<ModuleKind> {
        self.fetchers.iter().map(|f| f.kind()).collect()
    }

    pub fn sequencer(&self) -> &EventSequencer {
        &self.sequencer
    }

    /// Forget per-session bookkeeping of a removed session
    pub fn forget_session(&self, session_id: &str) {
        self.sequencer.forget(session_id);
    }

    /// Refresh every module for `session_id`.
    ///
    /// Fails only if the refresh cannot start: no active session, unknown
    /// session, or `session_id` is not the active one. Module failures are
    /// reported in the outcome.
    pub async fn refresh_all(&self, session_id: &str) -> Result<RefreshOutcome, SessionError> {
        let active = self.registry.active_id().ok_or(SessionError::NoActiveSession)?;
        if !self.registry.contains(session_id) {
            return Err(SessionError::UnknownSession(session_id.to_string()));
        }
        if active != session_id {
            return Err(SessionError::SessionNotActive(session_id.to_string()));
        }

        debug!(
            "Refreshing {} modules for session {}",
            self.fetchers.len(),
            session_id
        );

        let mut outcome = RefreshOutcome {
            session_id: session_id.to_string(),
            ..Default::default()
        };

        for fetcher in &self.fetchers {
            let module = fetcher.kind();
            let result = match timeout(self.refresh_timeout, fetcher.refresh(session_id)).await {
                Ok(r) => r.map_err(SessionError::from),
                Err(_) => Err(SessionError::Timeout {
                    operation: "module refresh",
                    after: self.refresh_timeout,
                }),
            };

            match result {
                Ok(data) => {
                    // Checked and stored under the registry read lock, so a
                    // switch cannot land between the two
                    let applied = self.registry.if_active(session_id, || {
                        let generation = self.sequencer.next(session_id);
                        self.cache.store(module, session_id, data, generation);
                        generation
                    });
                    let Some(generation) = applied else {
                        debug!(
                            "Discarding stale {} data for {} (no longer active)",
                            module, session_id
                        );
                        outcome.stale.push(module);
                        continue;
                    };
                    outcome.applied.push(module);
                    self.bus.publish(&SessionEvent::ModuleRefreshed {
                        session_id: session_id.to_string(),
                        module,
                        generation,
                    });
                }
                Err(e) if !self.registry.is_active(session_id) => {
                    debug!(
                        "Discarding stale {} failure for {} (no longer active): {}",
                        module, session_id, e
                    );
                    outcome.stale.push(module);
                }
                Err(e) => {
                    warn!("Refresh of {} for session {} failed: {}", module, session_id, e);
                    let generation = self.sequencer.next(session_id);
                    self.bus.publish(&SessionEvent::ModuleRefreshFailed {
                        session_id: session_id.to_string(),
                        module,
                        generation,
                        error: e.to_string(),
                    });
                    outcome.failures.push(ModuleFailure {
                        module,
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            "Refresh of {} done: {} applied, {} stale, {} failed",
            session_id,
            outcome.applied.len(),
            outcome.stale.len(),
            outcome.failures.len()
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HostError;
    use crate::session::types::ConnectionInfo;
    use crate::testing::{fetcher_set, ScriptedFetcher};
    use parking_lot::Mutex;
    use serde_json::json;

    struct Fixture {
        registry: Arc<SessionRegistry>,
        cache: Arc<ModuleCache>,
        bus: Arc<SessionBus>,
        log: Arc<Mutex<Vec<String>>>,
        fetchers: Vec<Arc<ScriptedFetcher>>,
        orchestrator: Arc<ModuleRefreshOrchestrator>,
    }

    fn fixture_with_timeout(refresh_timeout: Duration) -> Fixture {
        let bus = Arc::new(SessionBus::new());
        let registry = Arc::new(SessionRegistry::new(bus.clone()));
        let cache = Arc::new(ModuleCache::new());
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut fetchers = fetcher_set(&log);
        // Register out of order; the orchestrator must sort them
        fetchers.reverse();
        let dyn_fetchers: Vec<Arc<dyn ModuleFetcher>> = fetchers
            .iter()
            .map(|f| f.clone() as Arc<dyn ModuleFetcher>)
            .collect();
        let orchestrator = Arc::new(ModuleRefreshOrchestrator::new(
            registry.clone(),
            cache.clone(),
            bus.clone(),
            dyn_fetchers,
            refresh_timeout,
        ));
        fetchers.reverse();
        Fixture {
            registry,
            cache,
            bus,
            log,
            fetchers,
            orchestrator,
        }
    }

    fn fixture() -> Fixture {
        fixture_with_timeout(Duration::from_secs(2))
    }

    fn fetcher(f: &Fixture, kind: ModuleKind) -> Arc<ScriptedFetcher> {
        f.fetchers
            .iter()
            .find(|x| x.kind() == kind)
            .cloned()
            .unwrap()
    }

    fn info(host: &str) -> ConnectionInfo {
        ConnectionInfo::with_password(host, 22, "root", "pw")
    }

    #[tokio::test]
    async fn test_refresh_runs_in_priority_order() {
        let f = fixture();
        f.registry.add("s1", info("a"));

        let outcome = f.orchestrator.refresh_all("s1").await.unwrap();
        assert!(outcome.is_success());
        assert_eq!(outcome.applied, ModuleKind::ALL.to_vec());
        assert_eq!(
            *f.log.lock(),
            vec![
                "system_info:s1",
                "file_listing:s1",
                "terminal:s1",
                "containers:s1"
            ]
        );
        assert_eq!(f.orchestrator.modules(), ModuleKind::ALL.to_vec());
    }

    #[tokio::test]
    async fn test_partial_failure_is_isolated() {
        let f = fixture();
        f.registry.add("s1", info("hostA"));
        fetcher(&f, ModuleKind::FileListing)
            .fail_with(HostError::ChannelError("sftp subsystem unavailable".into()));

        let outcome = f.orchestrator.refresh_all("s1").await.unwrap();
        assert_eq!(outcome.failed_modules(), vec![ModuleKind::FileListing]);
        assert_eq!(
            outcome.applied,
            vec![
                ModuleKind::SystemInfo,
                ModuleKind::Terminal,
                ModuleKind::Containers
            ]
        );

        let err = outcome.into_result().unwrap_err();
        match err {
            SessionError::PartialRefresh(partial) => {
                assert_eq!(partial.modules(), vec![ModuleKind::FileListing]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(f.registry.active_id().as_deref(), Some("s1"));
    }

    #[tokio::test]
    async fn test_failed_module_keeps_previous_data() {
        let f = fixture();
        f.registry.add("s1", info("a"));
        let listing = fetcher(&f, ModuleKind::FileListing);
        listing.succeed_with(json!(["etc", "var"]));
        f.orchestrator.refresh_all("s1").await.unwrap();

        listing.fail_with(HostError::Unreachable("timeout".into()));
        f.orchestrator.refresh_all("s1").await.unwrap();

        let cached = f.cache.get(ModuleKind::FileListing, "s1").unwrap();
        assert_eq!(cached.data, json!(["etc", "var"]));
    }

    #[tokio::test]
    async fn test_refresh_twice_is_idempotent() {
        let f = fixture();
        f.registry.add("s1", info("a"));
        fetcher(&f, ModuleKind::Terminal).fail_with(HostError::CommandFailed("no tty".into()));

        let first = f.orchestrator.refresh_all("s1").await.unwrap();
        let second = f.orchestrator.refresh_all("s1").await.unwrap();

        assert_eq!(first.applied, second.applied);
        assert_eq!(first.failed_modules(), second.failed_modules());
        assert_eq!(f.cache.modules_for("s1").len(), 3);
    }

    #[tokio::test]
    async fn test_cannot_start_without_active_session() {
        let f = fixture();
        let err = f.orchestrator.refresh_all("s1").await.unwrap_err();
        assert_eq!(err, SessionError::NoActiveSession);
        assert!(f.log.lock().is_empty());
    }

    #[tokio::test]
    async fn test_cannot_start_for_inactive_or_unknown_session() {
        let f = fixture();
        f.registry.add("s1", info("a"));
        f.registry.add("s2", info("b"));

        assert_eq!(
            f.orchestrator.refresh_all("s1").await.unwrap_err(),
            SessionError::SessionNotActive("s1".into())
        );
        assert_eq!(
            f.orchestrator.refresh_all("nope").await.unwrap_err(),
            SessionError::UnknownSession("nope".into())
        );
    }

    #[tokio::test]
    async fn test_stale_results_are_discarded() {
        let f = fixture();
        f.registry.add("s1", info("a"));
        f.registry.add("s2", info("b"));
        f.registry.set_active("s1").unwrap();

        let gate = fetcher(&f, ModuleKind::SystemInfo).gate();
        let orchestrator = f.orchestrator.clone();
        let task = tokio::spawn(async move { orchestrator.refresh_all("s1").await });

        // Let the refresh reach the gated fetcher, then switch away
        tokio::time::sleep(Duration::from_millis(20)).await;
        f.registry.set_active("s2").unwrap();
        gate.notify_one();

        let outcome = task.await.unwrap().unwrap();
        assert!(outcome.applied.is_empty());
        assert_eq!(outcome.stale, ModuleKind::ALL.to_vec());
        assert!(f.cache.modules_for("s1").is_empty());
    }

    #[tokio::test]
    async fn test_failures_of_inactive_session_are_stale() {
        let f = fixture();
        f.registry.add("s1", info("a"));
        f.registry.add("s2", info("b"));
        f.registry.set_active("s1").unwrap();
        fetcher(&f, ModuleKind::FileListing)
            .fail_with(HostError::ChannelError("closed".into()));

        let failed_events = Arc::new(Mutex::new(Vec::new()));
        let sink = failed_events.clone();
        f.bus.subscribe(move |event| {
            if let SessionEvent::ModuleRefreshFailed {
                session_id, module, ..
            } = event
            {
                sink.lock().push((session_id.clone(), *module));
            }
            Ok(())
        });

        let gate = fetcher(&f, ModuleKind::SystemInfo).gate();
        let orchestrator = f.orchestrator.clone();
        let task = tokio::spawn(async move { orchestrator.refresh_all("s1").await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        f.registry.set_active("s2").unwrap();
        gate.notify_one();

        let outcome = task.await.unwrap().unwrap();
        assert!(outcome.failures.is_empty());
        assert!(outcome.is_success());
        assert_eq!(outcome.stale, ModuleKind::ALL.to_vec());
        assert!(failed_events.lock().is_empty());
    }

    #[tokio::test]
    async fn test_slow_module_times_out() {
        let f = fixture_with_timeout(Duration::from_millis(30));
        f.registry.add("s1", info("a"));
        fetcher(&f, ModuleKind::Containers).set_delay(Duration::from_millis(300));

        let outcome = f.orchestrator.refresh_all("s1").await.unwrap();
        assert_eq!(outcome.failed_modules(), vec![ModuleKind::Containers]);
        assert!(outcome.failures[0].error.contains("timed out"));
    }

    #[tokio::test]
    async fn test_events_carry_increasing_generations() {
        let f = fixture();
        f.registry.add("s1", info("a"));
        fetcher(&f, ModuleKind::Terminal).fail_with(HostError::CommandFailed("x".into()));

        let generations = Arc::new(Mutex::new(Vec::new()));
        let g = generations.clone();
        f.bus.subscribe(move |event| {
            match event {
                SessionEvent::ModuleRefreshed { generation, .. }
                | SessionEvent::ModuleRefreshFailed { generation, .. } => g.lock().push(*generation),
                _ => {}
            }
            Ok(())
        });

        f.orchestrator.refresh_all("s1").await.unwrap();
        f.orchestrator.refresh_all("s1").await.unwrap();

        assert_eq!(*generations.lock(), (1..=8).collect::<Vec<u64>>());
        assert_eq!(f.orchestrator.sequencer().current("s1"), 8);
    }
}
