//! Module catalog - init hooks compiled into the host, looked up by manifests

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::application::modules::ModuleInit;

/// Registry of compiled-in module entry points
#[derive(Default)]
pub struct ModuleCatalog {
    entries: RwLock<HashMap<String, Arc<dyn ModuleInit>>>,
}

impl ModuleCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entry; a later registration under the same name replaces it
    pub fn register(&self, name: impl Into<String>, init: Arc<dyn ModuleInit>) {
        let name = name.into();
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if entries.insert(name.clone(), init).is_some() {
            tracing::warn!(entry = %name, "Catalog entry replaced");
        }
    }

    pub fn with(self, name: impl Into<String>, init: Arc<dyn ModuleInit>) -> Self {
        self.register(name, init);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ModuleInit>> {
        self.entries
            .read()
            .ok()?
            .get(name)
            .cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .entries
            .read()
            .map(|e| e.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }
}
