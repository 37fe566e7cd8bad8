//! Hot-reload watcher
//!
//! Polls the module tree for modification-time changes, maps each changed
//! path to its top-level module folder and debounces per module: every new
//! event for a module aborts that module's pending timer, so a burst of
//! saves ends in a single reload once the tree has been quiet for the
//! debounce delay.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::loader::{LoadOutcome, ModuleManager};
use crate::application::errors::ModuleResult;

/// Top-level module folder containing `path`, if any
pub fn module_for_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    match relative.components().next()? {
        Component::Normal(name) => {
            let name = name.to_str()?;
            (!name.starts_with('.')).then(|| name.to_string())
        }
        _ => None,
    }
}

/// Modification times of every file under `root`, hidden entries skipped
pub fn snapshot(root: &Path) -> HashMap<PathBuf, SystemTime> {
    let mut files = HashMap::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let hidden = entry.file_name().to_str().is_some_and(|n| n.starts_with('.'));
            if hidden {
                continue;
            }
            let Ok(meta) = entry.metadata() else {
                continue;
            };
            if meta.is_dir() {
                stack.push(entry.path());
            } else if let Ok(modified) = meta.modified() {
                files.insert(entry.path(), modified);
            }
        }
    }
    files
}

/// Paths added, removed or modified between two snapshots
pub fn changed_paths(
    before: &HashMap<PathBuf, SystemTime>,
    after: &HashMap<PathBuf, SystemTime>,
) -> Vec<PathBuf> {
    let mut changed: Vec<PathBuf> = after
        .iter()
        .filter(|(path, modified)| before.get(*path) != Some(*modified))
        .map(|(path, _)| path.clone())
        .collect();
    changed.extend(before.keys().filter(|p| !after.contains_key(*p)).cloned());
    changed
}

/// Per-key trailing-edge debouncer
///
/// Each `trigger` replaces the key's pending timer; the key is sent on the
/// channel only after `delay` passes with no further trigger.
pub struct Debouncer {
    delay: Duration,
    pending: Mutex<HashMap<String, JoinHandle<()>>>,
    tx: mpsc::UnboundedSender<String>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                delay,
                pending: Mutex::new(HashMap::new()),
                tx,
            },
            rx,
        )
    }

    pub fn trigger(&self, key: &str) {
        let tx = self.tx.clone();
        let delay = self.delay;
        let fired = key.to_string();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(fired);
        });

        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(old) = pending.insert(key.to_string(), handle) {
            tracing::trace!(module = key, "Coalescing reload trigger");
            old.abort();
        }
    }

    /// Abort every pending timer
    pub fn cancel_all(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        for (_, handle) in pending.drain() {
            handle.abort();
        }
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

/// Drives unload -> load -> reinstall cycles for changed modules
pub struct HotReloader {
    manager: Arc<ModuleManager>,
    poll_interval: Duration,
    debounce: Duration,
    reinstall: bool,
}

impl HotReloader {
    pub fn new(manager: Arc<ModuleManager>, poll_interval: Duration, debounce: Duration) -> Self {
        Self {
            manager,
            poll_interval,
            debounce,
            reinstall: true,
        }
    }

    /// Whether a successful reload resyncs commands with the platform
    pub fn with_reinstall(mut self, reinstall: bool) -> Self {
        self.reinstall = reinstall;
        self
    }

    /// Reload one module, then reinstall if connected and enabled
    ///
    /// A failed resync is returned as `ModuleError::Registry` after the
    /// reload itself has taken effect.
    pub async fn reload_module(&self, name: &str) -> ModuleResult<()> {
        let dir = self.manager.directory().join(name);
        if !dir.is_dir() {
            tracing::info!(module = name, "Module folder removed, unloading");
            self.manager.unload(name).await?;
        } else {
            match self.manager.reload(name).await? {
                LoadOutcome::Loaded { generation } => tracing::info!(module = name, generation, "Hot reloaded"),
                LoadOutcome::Disabled => tracing::info!(module = name, "Module disabled, left unloaded"),
            }
        }

        if self.reinstall && self.manager.host().services.platform.is_ready() {
            if let Err(e) = self.manager.install().await {
                tracing::error!(module = name, "Command resync after reload failed: {}", e);
                return Err(e.into());
            }
        }
        Ok(())
    }

    /// Start polling and reloading; abort the handle to stop
    pub fn spawn(self) -> JoinHandle<()> {
        let root = self.manager.directory().to_path_buf();
        let (debouncer, mut rx) = Debouncer::new(self.debounce);
        let reloader = Arc::new(self);

        let worker = Arc::clone(&reloader);
        let reloads = tokio::spawn(async move {
            while let Some(module) = rx.recv().await {
                if let Err(e) = worker.reload_module(&module).await {
                    tracing::error!(module = %module, "Hot reload failed: {}", e);
                }
            }
        });

        tokio::spawn(async move {
            tracing::info!(path = %root.display(), "Watching module directory");
            let scan_root = root.clone();
            let mut known = tokio::task::spawn_blocking(move || snapshot(&scan_root))
                .await
                .unwrap_or_default();
            let mut ticker = tokio::time::interval(reloader.poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            let _reloads = AbortOnDrop(reloads);
            loop {
                ticker.tick().await;
                let scan_root = root.clone();
                let current = match tokio::task::spawn_blocking(move || snapshot(&scan_root)).await {
                    Ok(current) => current,
                    Err(e) => {
                        tracing::warn!("Module scan failed: {}", e);
                        continue;
                    }
                };
                for path in changed_paths(&known, &current) {
                    if let Some(module) = module_for_path(&root, &path) {
                        tracing::debug!(module = %module, path = %path.display(), "Module file changed");
                        debouncer.trigger(&module);
                    }
                }
                known = current;
            }
        })
    }
}

struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}
