//! Built-in modules, reachable from `module.yaml` manifests by entry name

pub mod core;
pub mod ping;

use crate::infrastructure::modules::ModuleCatalog;

/// Catalog with every built-in module registered
pub fn catalog() -> ModuleCatalog {
    ModuleCatalog::new()
        .with("core", core::module())
        .with("ping", ping::module())
}
