//! Module loader - loads, unloads and reloads modules at runtime
//!
//! Per module name: `unloaded -> loading -> loaded -> unloading -> unloaded`.
//! Operations on one name are serialized; different names proceed
//! independently. Every load runs under a fresh generation, and the registry
//! only resolves bindings of the live generation, so nothing registered by an
//! earlier load can be reached once its successor starts.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use tracing::Instrument;

use super::catalog::ModuleCatalog;
use super::entry::{find_entry, normalize_entry, EntryFile, EntryFormat, NativeLibrary};
use crate::application::context::{HostHandles, ModuleContext};
use crate::application::errors::{ModuleError, ModuleResult, RegistryError};
use crate::application::lifecycle::tracker::panic_message;
use crate::application::lifecycle::LifecycleTracker;
use crate::application::modules::{ModuleHandle, ModuleInit};
use crate::domain::traits::InstallScope;
use crate::infrastructure::config::flag_for_module;

/// Lifecycle state of one module name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleState {
    Unloaded,
    Loading,
    Loaded,
    Unloading,
}

/// Result of a load request that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded { generation: u64 },
    /// The module's feature flag is off; nothing was loaded
    Disabled,
}

/// What `load_all` did, per module
#[derive(Debug, Default)]
pub struct LoadSummary {
    pub loaded: Vec<String>,
    pub disabled: Vec<String>,
    pub failed: Vec<(String, ModuleError)>,
    /// Outcome of the install that followed, when one ran
    pub install: Option<Result<usize, RegistryError>>,
}

/// A module folder found under the modules directory
#[derive(Debug, Clone)]
pub struct DiscoveredModule {
    pub name: String,
    pub dir: PathBuf,
    pub entry: Option<EntryFile>,
    pub flag: String,
}

/// Public snapshot of a loaded module
#[derive(Debug, Clone)]
pub struct ModuleInfo {
    pub name: String,
    pub description: String,
    pub dir: PathBuf,
    pub format: EntryFormat,
    pub generation: u64,
    pub loaded_at: DateTime<Utc>,
}

/// Live record of a loaded module
///
/// Field order matters: the handle and init hook drop before the library
/// that holds their code.
struct ModuleRecord {
    info: ModuleInfo,
    handle: Arc<dyn ModuleHandle>,
    ctx: ModuleContext,
    tracker: Arc<LifecycleTracker>,
    ready_done: bool,
    #[allow(dead_code)]
    init: Arc<dyn ModuleInit>,
    library: Option<NativeLibrary>,
}

/// Module loader and lifecycle owner
pub struct ModuleManager {
    dir: PathBuf,
    shadow_dir: PathBuf,
    catalog: Arc<ModuleCatalog>,
    host: HostHandles,
    scope: InstallScope,
    records: RwLock<HashMap<String, ModuleRecord>>,
    states: Mutex<HashMap<String, ModuleState>>,
    op_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    next_generation: AtomicU64,
}

impl ModuleManager {
    pub fn new(dir: impl Into<PathBuf>, catalog: Arc<ModuleCatalog>, host: HostHandles) -> Self {
        let dir = dir.into();
        Self {
            shadow_dir: dir.join(".shadow"),
            dir,
            catalog,
            host,
            scope: InstallScope::Global,
            records: RwLock::new(HashMap::new()),
            states: Mutex::new(HashMap::new()),
            op_locks: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(1),
        }
    }

    /// Where native libraries are copied before loading
    pub fn with_shadow_dir(mut self, shadow_dir: impl Into<PathBuf>) -> Self {
        self.shadow_dir = shadow_dir.into();
        self
    }

    pub fn with_scope(mut self, scope: InstallScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn directory(&self) -> &Path {
        &self.dir
    }

    pub fn scope(&self) -> &InstallScope {
        &self.scope
    }

    pub fn host(&self) -> &HostHandles {
        &self.host
    }

    fn op_lock(&self, name: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.op_locks.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(locks.entry(name.to_string()).or_default())
    }

    fn set_state(&self, name: &str, state: ModuleState) {
        let mut states = self.states.lock().unwrap_or_else(|e| e.into_inner());
        states.insert(name.to_string(), state);
    }

    pub fn state(&self, name: &str) -> ModuleState {
        let states = self.states.lock().unwrap_or_else(|e| e.into_inner());
        states.get(name).copied().unwrap_or(ModuleState::Unloaded)
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.records
            .read()
            .map(|r| r.contains_key(name))
            .unwrap_or(false)
    }

    pub fn info(&self, name: &str) -> Option<ModuleInfo> {
        self.records.read().ok()?.get(name).map(|r| r.info.clone())
    }

    /// Loaded modules sorted by name
    pub fn loaded(&self) -> Vec<ModuleInfo> {
        let mut infos: Vec<ModuleInfo> = self
            .records
            .read()
            .map(|r| r.values().map(|m| m.info.clone()).collect())
            .unwrap_or_default();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    /// Module folders under the modules directory, hidden ones skipped
    pub fn discover(&self) -> ModuleResult<Vec<DiscoveredModule>> {
        let mut found = Vec::new();
        if !self.dir.exists() {
            tracing::warn!("Module directory does not exist: {}", self.dir.display());
            return Ok(found);
        }

        for entry in std::fs::read_dir(&self.dir)? {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!("Failed to read directory entry: {}", e);
                    continue;
                }
            };

            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }

            found.push(DiscoveredModule {
                entry: find_entry(&path).ok(),
                flag: flag_for_module(&name),
                dir: path,
                name,
            });
        }
        found.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(found)
    }

    /// Load one module by folder name
    pub async fn load(&self, name: &str) -> ModuleResult<LoadOutcome> {
        let lock = self.op_lock(name);
        let _guard = lock.lock().await;
        self.load_locked(name).await
    }

    /// Unload one module; `Ok(false)` when it was not loaded
    pub async fn unload(&self, name: &str) -> ModuleResult<bool> {
        let lock = self.op_lock(name);
        let _guard = lock.lock().await;
        Ok(self.unload_locked(name).await)
    }

    /// Full unload then load under one lock hold
    pub async fn reload(&self, name: &str) -> ModuleResult<LoadOutcome> {
        let lock = self.op_lock(name);
        let _guard = lock.lock().await;
        self.unload_locked(name).await;
        self.load_locked(name).await
    }

    async fn load_locked(&self, name: &str) -> ModuleResult<LoadOutcome> {
        if self.is_loaded(name) {
            return Err(ModuleError::AlreadyLoaded(name.to_string()));
        }

        let flag = flag_for_module(name);
        if !self.host.config.is_enabled(&flag, true) {
            tracing::info!(module = name, flag = %flag, "Module disabled by feature flag");
            return Ok(LoadOutcome::Disabled);
        }

        let dir = self.dir.join(name);
        if !dir.is_dir() {
            return Err(ModuleError::NotFound(name.to_string()));
        }

        self.set_state(name, ModuleState::Loading);
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);

        let resolved = find_entry(&dir)
            .and_then(|entry| normalize_entry(name, &entry, &self.catalog, &self.shadow_dir, generation));
        let resolved = match resolved {
            Ok(resolved) => resolved,
            Err(e) => {
                self.set_state(name, ModuleState::Unloaded);
                tracing::error!(module = name, "Failed to resolve module entry: {}", e);
                return Err(e);
            }
        };

        self.host.registry.activate(name, generation);
        let tracker = Arc::new(LifecycleTracker::new(name));
        let ctx = ModuleContext::new(name, generation, self.host.clone(), Arc::clone(&tracker));

        let init = Arc::clone(&resolved.init);
        let init_ctx = ctx.clone();
        let joined = tokio::spawn(async move { init.init(init_ctx).await }.instrument(ctx.span().clone())).await;
        let result = match joined {
            Ok(result) => result,
            Err(e) if e.is_panic() => Err(ModuleError::Init(format!("init panicked: {}", panic_message(&*e.into_panic())))),
            Err(e) => Err(ModuleError::Init(e.to_string())),
        };

        let handle: Arc<dyn ModuleHandle> = match result {
            Ok(handle) => Arc::from(handle),
            Err(e) => {
                self.rollback(name, &tracker);
                self.set_state(name, ModuleState::Unloaded);
                tracing::error!(module = name, generation, "Module init failed: {}", e);
                return Err(e);
            }
        };

        let info = ModuleInfo {
            name: name.to_string(),
            description: resolved
                .description
                .clone()
                .unwrap_or_else(|| handle.description().to_string()),
            dir,
            format: resolved.format,
            generation,
            loaded_at: Utc::now(),
        };

        let commands = self.host.registry.commands_for(name).len();
        let mut record = ModuleRecord {
            info,
            handle,
            ctx,
            tracker,
            ready_done: false,
            init: resolved.init,
            library: resolved.library,
        };

        // Loaded after the platform connected: nobody else will call post_ready
        if self.host.services.platform.is_ready() {
            run_post_ready(&record).await;
            record.ready_done = true;
        }

        self.records
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.to_string(), record);
        self.set_state(name, ModuleState::Loaded);
        tracing::info!(module = name, generation, commands, "Loaded module");
        Ok(LoadOutcome::Loaded { generation })
    }

    /// Undo whatever a failed init managed to register
    fn rollback(&self, name: &str, tracker: &LifecycleTracker) {
        self.host.registry.remove_module(name);
        self.host.events.remove_module(name);
        tracker.dispose_all();
        self.host.sessions.remove_module(name);
    }

    async fn unload_locked(&self, name: &str) -> bool {
        let record = self
            .records
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(name);
        let Some(record) = record else {
            tracing::debug!(module = name, "Unload requested for a module that is not loaded");
            return false;
        };

        self.set_state(name, ModuleState::Unloading);
        let generation = record.info.generation;

        let removed = self.host.registry.remove_module(name);
        let listeners = self.host.events.remove_module(name);
        let report = record.tracker.dispose_all();

        let handle = Arc::clone(&record.handle);
        let disposed = tokio::spawn(async move { handle.dispose().await }.instrument(record.ctx.span().clone())).await;
        match disposed {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(module = name, "Module dispose failed: {}", e),
            Err(e) if e.is_panic() => {
                tracing::warn!(module = name, "Module dispose panicked: {}", panic_message(&*e.into_panic()))
            }
            Err(e) => tracing::warn!(module = name, "Module dispose did not finish: {}", e),
        }

        let sessions = self.host.sessions.remove_module(name);
        drop(record);

        self.set_state(name, ModuleState::Unloaded);
        tracing::info!(
            module = name,
            generation,
            commands = removed.commands,
            bindings = removed.bindings,
            listeners,
            disposers = report.attempted,
            sessions,
            "Unloaded module"
        );
        true
    }

    /// Load every discovered module; failures are logged and skipped
    pub async fn load_all(&self) -> ModuleResult<LoadSummary> {
        let mut summary = LoadSummary::default();
        for module in self.discover()? {
            match self.load(&module.name).await {
                Ok(LoadOutcome::Loaded { .. }) => summary.loaded.push(module.name),
                Ok(LoadOutcome::Disabled) => summary.disabled.push(module.name),
                Err(e) => {
                    tracing::warn!("Failed to load module from {}: {}", module.dir.display(), e);
                    summary.failed.push((module.name, e));
                }
            }
        }
        tracing::info!(
            loaded = summary.loaded.len(),
            disabled = summary.disabled.len(),
            failed = summary.failed.len(),
            "Module loading finished"
        );
        Ok(summary)
    }

    /// Unload every module, newest name order reversed
    pub async fn unload_all(&self) -> usize {
        let mut names: Vec<String> = self.loaded().into_iter().map(|m| m.name).collect();
        names.reverse();
        let mut count = 0;
        for name in names {
            if matches!(self.unload(&name).await, Ok(true)) {
                count += 1;
            }
        }
        count
    }

    /// Run `post_ready` once for every module that has not had it yet
    pub async fn post_ready_all(&self) {
        let pending: Vec<String> = self
            .records
            .read()
            .map(|r| r.iter().filter(|(_, m)| !m.ready_done).map(|(n, _)| n.clone()).collect())
            .unwrap_or_default();

        for name in pending {
            let lock = self.op_lock(&name);
            let _guard = lock.lock().await;
            let target = self.records.read().ok().and_then(|r| {
                r.get(&name)
                    .filter(|m| !m.ready_done)
                    .map(|m| (Arc::clone(&m.handle), m.ctx.clone()))
            });
            let Some((handle, ctx)) = target else {
                continue;
            };
            post_ready(&name, handle, &ctx).await;
            if let Ok(mut records) = self.records.write() {
                if let Some(record) = records.get_mut(&name) {
                    record.ready_done = true;
                }
            }
        }
    }

    /// Install the merged command set under the configured scope
    pub async fn install(&self) -> Result<usize, RegistryError> {
        self.host
            .registry
            .install(self.host.services.platform.as_ref(), &self.scope)
            .await
    }
}

async fn run_post_ready(record: &ModuleRecord) {
    post_ready(&record.info.name, Arc::clone(&record.handle), &record.ctx).await;
}

async fn post_ready(name: &str, handle: Arc<dyn ModuleHandle>, ctx: &ModuleContext) {
    let joined = tokio::spawn(async move { handle.post_ready().await }.instrument(ctx.span().clone())).await;
    match joined {
        Ok(Ok(())) => tracing::debug!(module = name, "post_ready finished"),
        Ok(Err(e)) => tracing::warn!(module = name, "post_ready failed: {}", e),
        Err(e) if e.is_panic() => {
            tracing::warn!(module = name, "post_ready panicked: {}", panic_message(&*e.into_panic()))
        }
        Err(e) => tracing::warn!(module = name, "post_ready did not finish: {}", e),
    }
}
