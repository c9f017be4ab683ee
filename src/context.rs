//! Session context
//!
//! Builds the coordination core once and hands out shared handles. Every
//! component gets its collaborators injected here; nothing is reached through
//! globals.

use std::sync::Arc;

use tracing::info;

use crate::config::{ConfigStorage, CoordinatorConfig, StorageError};
use crate::host::{HostBridge, ModuleFetcher, Notifier};
use crate::session::{
    ActivationCoordinator, ModuleCache, ModuleRefreshOrchestrator, SessionBus, SessionManager,
    SessionRegistry,
};

pub struct SessionContext {
    pub bus: Arc<SessionBus>,
    pub registry: Arc<SessionRegistry>,
    pub cache: Arc<ModuleCache>,
    pub coordinator: Arc<ActivationCoordinator>,
    pub orchestrator: Arc<ModuleRefreshOrchestrator>,
    pub manager: Arc<SessionManager>,
}

impl SessionContext {
    /// Wire the core without persistence
    pub fn new(
        config: CoordinatorConfig,
        host: Arc<dyn HostBridge>,
        fetchers: Vec<Arc<dyn ModuleFetcher>>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self::build(config, host, fetchers, notifier, None)
    }

    /// Wire the core with config, commands and saved connections from `storage`
    pub async fn with_storage(
        storage: ConfigStorage,
        host: Arc<dyn HostBridge>,
        fetchers: Vec<Arc<dyn ModuleFetcher>>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, StorageError> {
        let file = storage.load().await?;
        info!("Config loaded from {:?}", storage.path());

        let ctx = Self::build(file.coordinator, host, fetchers, notifier, Some(storage));
        ctx.manager.restore(file.commands, file.connections);
        Ok(ctx)
    }

    /// `with_storage` at the default config location
    pub async fn load(
        host: Arc<dyn HostBridge>,
        fetchers: Vec<Arc<dyn ModuleFetcher>>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, StorageError> {
        Self::with_storage(ConfigStorage::new()?, host, fetchers, notifier).await
    }

    fn build(
        config: CoordinatorConfig,
        host: Arc<dyn HostBridge>,
        fetchers: Vec<Arc<dyn ModuleFetcher>>,
        notifier: Arc<dyn Notifier>,
        storage: Option<ConfigStorage>,
    ) -> Self {
        let bus = Arc::new(SessionBus::new());
        let registry = Arc::new(SessionRegistry::new(bus.clone()));
        let cache = Arc::new(ModuleCache::new());

        let coordinator = Arc::new(ActivationCoordinator::new(
            registry.clone(),
            host.clone(),
            cache.clone(),
            config.switch_timeout(),
            config.max_pending_switches,
        ));

        let orchestrator = Arc::new(ModuleRefreshOrchestrator::new(
            registry.clone(),
            cache.clone(),
            bus.clone(),
            fetchers,
            config.refresh_timeout(),
        ));

        let mut manager = SessionManager::new(
            registry.clone(),
            coordinator.clone(),
            orchestrator.clone(),
            cache.clone(),
            host,
            notifier,
            bus.clone(),
            config,
        );
        if let Some(storage) = storage {
            manager = manager.with_storage(storage);
        }

        Self {
            bus,
            registry,
            cache,
            coordinator,
            orchestrator,
            manager: Arc::new(manager),
        }
    }
}
