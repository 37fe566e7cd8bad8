//! Host assembly - wires registries, services, loader and router together
//!
//! ```ignore
//! let host = Host::builder(config, platform).build()?;
//! host.start().await?;
//! host.ready().await;
//! ```

use std::sync::Arc;

use serde_json::json;
use tokio::task::JoinHandle;

use crate::application::commands::CommandRegistry;
use crate::application::context::{ConfigSource, HostHandles};
use crate::application::errors::HostError;
use crate::application::interactions::{DispatchOutcome, InteractionRouter, SessionStore};
use crate::application::lifecycle::EventBus;
use crate::application::services::{Services, StaticLocalizer};
use crate::domain::entities::Interaction;
use crate::domain::traits::{Platform, Store};
use crate::infrastructure::config::{Config, FeatureFlags};
use crate::infrastructure::modules::{HotReloader, LoadSummary, ModuleCatalog, ModuleManager};
use crate::infrastructure::storage::JsonStore;

/// Event emitted once the platform is ready and every module ran `post_ready`
pub const READY_EVENT: &str = "ready";

/// Builder for [`Host`]
pub struct HostBuilder {
    config: Config,
    platform: Arc<dyn Platform>,
    store: Option<Arc<dyn Store>>,
    catalog: Option<Arc<ModuleCatalog>>,
    flags: Option<Arc<FeatureFlags>>,
}

impl HostBuilder {
    pub fn store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    /// Catalog used by `module.yaml` entries; defaults to the built-in modules
    pub fn catalog(mut self, catalog: ModuleCatalog) -> Self {
        self.catalog = Some(Arc::new(catalog));
        self
    }

    pub fn flags(mut self, flags: Arc<FeatureFlags>) -> Self {
        self.flags = Some(flags);
        self
    }

    pub fn build(self) -> Result<Host, HostError> {
        let config = self.config;
        config.validate()?;
        let scope = config.install_scope()?;

        let mut localizer = StaticLocalizer::new();
        for (locale, table) in &config.messages {
            let locale = (locale != "default").then_some(locale.as_str());
            localizer = localizer.with_overrides(locale, table);
        }

        let store = self.store.unwrap_or_else(|| Arc::new(JsonStore::in_memory()));
        let services = Services::new(self.platform, store).with_localizer(Arc::new(localizer));
        let flags = self.flags.unwrap_or_else(|| Arc::new(FeatureFlags::new()));
        let catalog = self.catalog.unwrap_or_else(|| Arc::new(crate::builtin::catalog()));

        let registry = Arc::new(CommandRegistry::new());
        let sessions = Arc::new(SessionStore::new(config.session_ttl()));
        let events = Arc::new(EventBus::new());

        let handles = HostHandles {
            registry: Arc::clone(&registry),
            sessions: Arc::clone(&sessions),
            events: Arc::clone(&events),
            config: Arc::clone(&flags) as Arc<dyn ConfigSource>,
            services: services.clone(),
        };
        let manager = ModuleManager::new(&config.modules.directory, catalog, handles)
            .with_shadow_dir(&config.modules.shadow_directory)
            .with_scope(scope);
        let router = InteractionRouter::new(Arc::clone(&registry), Arc::clone(&sessions), services.clone());

        Ok(Host {
            config,
            flags,
            registry,
            sessions,
            events,
            services,
            manager: Arc::new(manager),
            router: Arc::new(router),
        })
    }
}

/// A running module host
pub struct Host {
    config: Config,
    flags: Arc<FeatureFlags>,
    registry: Arc<CommandRegistry>,
    sessions: Arc<SessionStore>,
    events: Arc<EventBus>,
    services: Services,
    manager: Arc<ModuleManager>,
    router: Arc<InteractionRouter>,
}

impl Host {
    pub fn builder(config: Config, platform: Arc<dyn Platform>) -> HostBuilder {
        HostBuilder {
            config,
            platform,
            store: None,
            catalog: None,
            flags: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn flags(&self) -> &Arc<FeatureFlags> {
        &self.flags
    }

    pub fn registry(&self) -> &Arc<CommandRegistry> {
        &self.registry
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn manager(&self) -> &Arc<ModuleManager> {
        &self.manager
    }

    pub fn router(&self) -> &Arc<InteractionRouter> {
        &self.router
    }

    /// Load every module and install the merged command set
    ///
    /// Individual module or install failures are logged, not returned;
    /// only an unreadable module directory fails startup.
    pub async fn start(&self) -> Result<LoadSummary, HostError> {
        let mut summary = self.manager.load_all().await?;
        let install = self.manager.install().await;
        match &install {
            Ok(count) => tracing::info!(count, scope = %self.manager.scope(), "Commands installed"),
            Err(e) => tracing::error!("Command install failed: {}", e),
        }
        summary.install = Some(install);
        Ok(summary)
    }

    /// Run `post_ready` hooks and emit the ready event; call once connected
    pub async fn ready(&self) {
        self.manager.post_ready_all().await;
        let info = self.services.platform.info();
        let listeners = self
            .events
            .emit(
                READY_EVENT,
                json!({ "platform": info.name, "application_id": info.application_id }),
            )
            .await;
        tracing::info!(listeners, "Host ready");
    }

    pub async fn dispatch(&self, interaction: Interaction) -> DispatchOutcome {
        self.router.dispatch(interaction).await
    }

    /// Dispatch on its own task so a slow handler never blocks the caller
    pub fn spawn_dispatch(&self, interaction: Interaction) -> JoinHandle<DispatchOutcome> {
        self.router.spawn(interaction)
    }

    /// Periodically drop expired sessions
    pub fn spawn_session_sweeper(&self) -> JoinHandle<()> {
        let sessions = Arc::clone(&self.sessions);
        let period = self.config.sweep_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let swept = sessions.sweep();
                if swept > 0 {
                    tracing::debug!(swept, "Expired sessions removed");
                }
            }
        })
    }

    pub fn hot_reloader(&self) -> HotReloader {
        HotReloader::new(
            Arc::clone(&self.manager),
            self.config.poll_interval(),
            self.config.debounce(),
        )
        .with_reinstall(self.config.install.reinstall_on_reload)
    }

    /// Start the watcher when enabled in config
    pub fn spawn_watcher(&self) -> Option<JoinHandle<()>> {
        self.config
            .modules
            .watch
            .then(|| self.hot_reloader().spawn())
    }

    /// Unload every module; returns how many were unloaded
    pub async fn shutdown(&self) -> usize {
        let count = self.manager.unload_all().await;
        tracing::info!(count, "Host shut down");
        count
    }
}
