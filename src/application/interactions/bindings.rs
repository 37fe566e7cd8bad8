//! Handler lookup table
//!
//! Exact keys resolve through a hash map. Component handlers registered as
//! prefixes are consulted only when the exact lookup misses; the longest
//! matching prefix wins.

use std::collections::HashMap;
use std::fmt;

use super::custom_id::ComponentKind;
use super::handler::Handler;
use crate::domain::entities::CommandKind;

/// What a binding answers to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BindingKey {
    /// Chat-input execution; `path` is empty for the root command
    Execute { command: String, path: Vec<String> },
    Autocomplete { command: String, option: String },
    ContextMenu { kind: CommandKind, name: String },
    Component {
        module: String,
        kind: ComponentKind,
        local: String,
    },
}

impl BindingKey {
    pub fn execute(command: &str, path: &[String]) -> Self {
        BindingKey::Execute {
            command: command.to_string(),
            path: path.to_vec(),
        }
    }

    pub fn component(module: &str, kind: ComponentKind, local: &str) -> Self {
        BindingKey::Component {
            module: module.to_string(),
            kind,
            local: local.to_string(),
        }
    }
}

impl fmt::Display for BindingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindingKey::Execute { command, path } if path.is_empty() => write!(f, "/{}", command),
            BindingKey::Execute { command, path } => write!(f, "/{} {}", command, path.join(" ")),
            BindingKey::Autocomplete { command, option } => write!(f, "/{} ?{}", command, option),
            BindingKey::ContextMenu { kind, name } => write!(f, "{:?} '{}'", kind, name),
            BindingKey::Component { module, kind, local } => write!(f, "{}:{}:{}", module, kind, local),
        }
    }
}

/// A registered handler with its ownership tags
#[derive(Clone)]
pub struct Binding {
    pub module: String,
    /// Command the binding was declared on, for builder registrations
    pub command: Option<String>,
    pub generation: u64,
    /// Registration that created it; used by disposers
    pub token: u64,
    pub requires_session: bool,
    pub handler: Handler,
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("module", &self.module)
            .field("command", &self.command)
            .field("generation", &self.generation)
            .field("token", &self.token)
            .field("requires_session", &self.requires_session)
            .finish()
    }
}

#[derive(Clone, Debug)]
struct PrefixBinding {
    module: String,
    kind: ComponentKind,
    prefix: String,
    binding: Binding,
}

/// Exact and prefix handler lookup
#[derive(Default)]
pub struct BindingTable {
    exact: HashMap<BindingKey, Binding>,
    prefixes: Vec<PrefixBinding>,
}

impl BindingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an exact binding; returns the one it replaced
    pub fn insert(&mut self, key: BindingKey, binding: Binding) -> Option<Binding> {
        self.exact.insert(key, binding)
    }

    /// Insert a prefix binding for component ids; returns the one it replaced
    pub fn insert_prefix(
        &mut self,
        module: &str,
        kind: ComponentKind,
        prefix: &str,
        binding: Binding,
    ) -> Option<Binding> {
        let replaced = self
            .prefixes
            .iter()
            .position(|p| p.module == module && p.kind == kind && p.prefix == prefix)
            .map(|i| self.prefixes.remove(i).binding);
        self.prefixes.push(PrefixBinding {
            module: module.to_string(),
            kind,
            prefix: prefix.to_string(),
            binding,
        });
        replaced
    }

    /// Exact match first, then the longest registered prefix
    pub fn resolve(&self, key: &BindingKey) -> Option<&Binding> {
        if let Some(binding) = self.exact.get(key) {
            return Some(binding);
        }
        let BindingKey::Component { module, kind, local } = key else {
            return None;
        };
        self.prefixes
            .iter()
            .filter(|p| &p.module == module && p.kind == *kind && local.starts_with(&p.prefix))
            .max_by_key(|p| p.prefix.len())
            .map(|p| &p.binding)
    }

    /// Remove bindings matching `pred`; returns how many were removed
    pub fn remove_where<F>(&mut self, pred: F) -> usize
    where
        F: Fn(&Binding) -> bool,
    {
        let before = self.len();
        self.exact.retain(|_, b| !pred(b));
        self.prefixes.retain(|p| !pred(&p.binding));
        before - self.len()
    }

    pub fn keys_for_module(&self, module: &str) -> Vec<BindingKey> {
        self.exact
            .iter()
            .filter(|(_, b)| b.module == module)
            .map(|(k, _)| k.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.exact.len() + self.prefixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::interactions::handler::handler;

    fn binding(module: &str, token: u64) -> Binding {
        Binding {
            module: module.to_string(),
            command: None,
            generation: 1,
            token,
            requires_session: false,
            handler: handler(|_| async { Ok(()) }),
        }
    }

    #[test]
    fn exact_beats_prefix_and_longest_prefix_wins() {
        let mut table = BindingTable::new();
        table.insert_prefix("shop", ComponentKind::Button, "buy", binding("shop", 1));
        table.insert_prefix("shop", ComponentKind::Button, "buy-item", binding("shop", 2));
        table.insert(BindingKey::component("shop", ComponentKind::Button, "buy-item-7"), binding("shop", 3));

        let hit = |local: &str| {
            table
                .resolve(&BindingKey::component("shop", ComponentKind::Button, local))
                .map(|b| b.token)
        };
        assert_eq!(hit("buy-item-7"), Some(3));
        assert_eq!(hit("buy-item-8"), Some(2));
        assert_eq!(hit("buy-x"), Some(1));
        assert_eq!(hit("sell"), None);
        assert!(table
            .resolve(&BindingKey::component("other", ComponentKind::Button, "buy"))
            .is_none());
        assert!(table
            .resolve(&BindingKey::component("shop", ComponentKind::Select, "buy"))
            .is_none());
    }

    #[test]
    fn remove_where_clears_both_paths() {
        let mut table = BindingTable::new();
        table.insert(BindingKey::execute("ping", &[]), binding("ping", 1));
        table.insert_prefix("ping", ComponentKind::Modal, "form", binding("ping", 1));
        table.insert(BindingKey::execute("other", &[]), binding("other", 2));
        assert_eq!(table.remove_where(|b| b.module == "ping"), 2);
        assert_eq!(table.len(), 1);
    }
}
