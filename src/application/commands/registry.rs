//! Command registry and installer
//!
//! Holds every live command definition and handler binding in one lock, so a
//! module removal is atomic with respect to dispatch lookups. Installation
//! snapshots the merged definition set and bulk-replaces it on the platform;
//! the in-memory state reflects intent, not confirmed installs, and is never
//! rolled back on failure.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::application::errors::RegistryError;
use crate::application::interactions::bindings::{Binding, BindingKey, BindingTable};
use crate::application::interactions::custom_id::ComponentKind;
use crate::application::interactions::handler::Handler;
use crate::application::lifecycle::Disposer;
use crate::domain::entities::CommandDefinition;
use crate::domain::traits::{InstallScope, Platform};

/// A handler to install alongside a command definition
pub struct PendingBinding {
    pub key: BindingKey,
    pub handler: Handler,
    pub requires_session: bool,
    /// Component prefix registration instead of an exact key
    pub prefix: bool,
}

/// Live lookup result for the router
#[derive(Clone)]
pub struct ResolvedBinding {
    pub module: String,
    pub command: Option<String>,
    pub requires_session: bool,
    pub handler: Handler,
}

struct CommandEntry {
    definition: CommandDefinition,
    generation: u64,
    token: u64,
}

#[derive(Default)]
struct RegistryState {
    /// Keyed by command name; names are unique on the platform
    commands: BTreeMap<String, CommandEntry>,
    bindings: BindingTable,
    /// Live generation per loaded module
    live: HashMap<String, u64>,
}

impl RegistryState {
    fn check_live(&self, module: &str, generation: u64) -> Result<(), RegistryError> {
        match self.live.get(module) {
            Some(live) if *live == generation => Ok(()),
            _ => Err(RegistryError::StaleGeneration {
                module: module.to_string(),
                generation,
            }),
        }
    }

    fn install_binding(&mut self, pending: PendingBinding, binding: Binding) {
        let replaced = match &pending.key {
            BindingKey::Component { module, kind, local } if pending.prefix => {
                self.bindings.insert_prefix(module, *kind, local, binding)
            }
            _ => self.bindings.insert(pending.key.clone(), binding),
        };
        if let Some(old) = replaced {
            tracing::warn!(
                key = %pending.key,
                previous_module = %old.module,
                "Handler binding replaced, last registration wins"
            );
        }
    }
}

/// Record of the most recent successful install
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallRecord {
    pub scope: InstallScope,
    pub commands: Vec<String>,
    pub installed_at: DateTime<Utc>,
}

/// Counts of what `remove_module` cleared
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Removed {
    pub commands: usize,
    pub bindings: usize,
}

/// Registry for live command definitions and handler bindings
pub struct CommandRegistry {
    state: RwLock<RegistryState>,
    next_token: AtomicU64,
    install_lock: Mutex<()>,
    last_install: RwLock<Option<InstallRecord>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            next_token: AtomicU64::new(1),
            install_lock: Mutex::new(()),
            last_install: RwLock::new(None),
        }
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Mark `generation` as the live one for `module`
    ///
    /// Anything still registered under an older generation is dropped first.
    pub fn activate(&self, module: &str, generation: u64) {
        let mut state = self.write();
        if let Some(previous) = state.live.insert(module.to_string(), generation) {
            if previous != generation {
                let dropped = state.bindings.remove_where(|b| b.module == module && b.generation != generation);
                state
                    .commands
                    .retain(|_, c| !(c.definition.module == module && c.generation != generation));
                if dropped > 0 {
                    tracing::warn!(module, previous, generation, dropped, "Dropped bindings from a stale generation");
                }
            }
        }
    }

    pub fn live_generation(&self, module: &str) -> Option<u64> {
        self.read().live.get(module).copied()
    }

    /// Register a command definition with its handler bindings
    ///
    /// Replaces any previous registration under the same command name, along
    /// with every binding declared on it. Returns the registration token.
    pub fn register_command(
        &self,
        module: &str,
        generation: u64,
        mut definition: CommandDefinition,
        bindings: Vec<PendingBinding>,
    ) -> Result<u64, RegistryError> {
        definition.validate()?;
        definition.module = module.to_string();
        let name = definition.name.clone();
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);

        let mut state = self.write();
        state.check_live(module, generation)?;

        if let Some(previous) = state.commands.remove(&name) {
            if previous.definition.module != module {
                tracing::warn!(
                    command = %name,
                    previous_module = %previous.definition.module,
                    module,
                    "Command name taken over by another module, last registration wins"
                );
            }
            state
                .bindings
                .remove_where(|b| b.command.as_deref() == Some(name.as_str()));
        }

        for pending in bindings {
            let binding = Binding {
                module: module.to_string(),
                command: Some(name.clone()),
                generation,
                token,
                requires_session: pending.requires_session,
                handler: Arc::clone(&pending.handler),
            };
            state.install_binding(pending, binding);
        }

        state.commands.insert(
            name.clone(),
            CommandEntry {
                definition,
                generation,
                token,
            },
        );
        tracing::debug!(module, command = %name, generation, "Registered command");
        Ok(token)
    }

    /// Register a standalone handler (not tied to a command definition)
    pub fn register_binding(
        &self,
        module: &str,
        generation: u64,
        pending: PendingBinding,
    ) -> Result<u64, RegistryError> {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let mut state = self.write();
        state.check_live(module, generation)?;
        let binding = Binding {
            module: module.to_string(),
            command: None,
            generation,
            token,
            requires_session: pending.requires_session,
            handler: Arc::clone(&pending.handler),
        };
        tracing::debug!(module, key = %pending.key, "Registered handler");
        state.install_binding(pending, binding);
        Ok(token)
    }

    /// Undo one registration; a newer registration under the same name is kept
    pub fn unregister(&self, token: u64) -> Removed {
        let mut state = self.write();
        let before = state.commands.len();
        state.commands.retain(|_, c| c.token != token);
        Removed {
            commands: before - state.commands.len(),
            bindings: state.bindings.remove_where(|b| b.token == token),
        }
    }

    /// Disposer that undoes the registration identified by `token`
    pub fn disposer(self: &Arc<Self>, label: impl Into<String>, token: u64) -> Disposer {
        let registry = Arc::clone(self);
        Disposer::new(label, move || {
            registry.unregister(token);
        })
    }

    /// Clear every definition and binding owned by `module`
    pub fn remove_module(&self, module: &str) -> Removed {
        let mut state = self.write();
        state.live.remove(module);
        let before = state.commands.len();
        state.commands.retain(|_, c| c.definition.module != module);
        let removed = Removed {
            commands: before - state.commands.len(),
            bindings: state.bindings.remove_where(|b| b.module == module),
        };
        tracing::debug!(module, commands = removed.commands, bindings = removed.bindings, "Removed module registrations");
        removed
    }

    /// Resolve a binding whose module generation is still live
    pub fn resolve(&self, key: &BindingKey) -> Option<ResolvedBinding> {
        let state = self.read();
        let binding = state.bindings.resolve(key)?;
        if state.live.get(&binding.module) != Some(&binding.generation) {
            return None;
        }
        Some(ResolvedBinding {
            module: binding.module.clone(),
            command: binding.command.clone(),
            requires_session: binding.requires_session,
            handler: Arc::clone(&binding.handler),
        })
    }

    /// Resolve a component binding by decoded custom id parts
    pub fn resolve_component(&self, module: &str, kind: ComponentKind, local: &str) -> Option<ResolvedBinding> {
        self.resolve(&BindingKey::component(module, kind, local))
    }

    /// Merged definition set across all loaded modules, sorted by name
    pub fn definitions(&self) -> Vec<CommandDefinition> {
        self.read()
            .commands
            .values()
            .map(|c| c.definition.clone())
            .collect()
    }

    pub fn definition(&self, name: &str) -> Option<CommandDefinition> {
        self.read().commands.get(name).map(|c| c.definition.clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read().commands.contains_key(name)
    }

    pub fn commands_for(&self, module: &str) -> Vec<String> {
        self.read()
            .commands
            .values()
            .filter(|c| c.definition.module == module)
            .map(|c| c.definition.name.clone())
            .collect()
    }

    pub fn binding_count(&self) -> usize {
        self.read().bindings.len()
    }

    pub fn last_install(&self) -> Option<InstallRecord> {
        self.last_install.read().ok().and_then(|r| r.clone())
    }

    /// Bulk-replace the platform's command set for `scope`
    ///
    /// Installs are serialized; each takes its snapshot while holding the
    /// install lock, so the last install to run carries the newest state.
    pub async fn install(&self, platform: &dyn Platform, scope: &InstallScope) -> Result<usize, RegistryError> {
        let _guard = self.install_lock.lock().await;
        let definitions = self.definitions();
        let names: Vec<String> = definitions.iter().map(|d| d.name.clone()).collect();

        tracing::info!(scope = %scope, count = definitions.len(), "Installing commands");
        match platform.bulk_overwrite_commands(scope, &definitions).await {
            Ok(count) => {
                tracing::info!(scope = %scope, count, "Installed commands");
                if let Ok(mut last) = self.last_install.write() {
                    *last = Some(InstallRecord {
                        scope: scope.clone(),
                        commands: names,
                        installed_at: Utc::now(),
                    });
                }
                Ok(count)
            }
            Err(e) => {
                tracing::error!(scope = %scope, "Command install failed: {}", e);
                Err(RegistryError::Install(e))
            }
        }
    }

    pub async fn install_global(&self, platform: &dyn Platform) -> Result<usize, RegistryError> {
        self.install(platform, &InstallScope::Global).await
    }

    pub async fn install_guild(&self, platform: &dyn Platform, guild_id: &str) -> Result<usize, RegistryError> {
        self.install(platform, &InstallScope::Guild(guild_id.to_string())).await
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}
