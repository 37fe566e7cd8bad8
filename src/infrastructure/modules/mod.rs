//! Module system - entry resolution, loading and hot reload

pub mod catalog;
pub mod entry;
pub mod loader;
pub mod manifest;
pub mod watcher;

pub use catalog::ModuleCatalog;
pub use entry::{find_entry, normalize_entry, EntryFile, EntryFormat, ResolvedEntry, ENTRY_SYMBOL};
pub use loader::{DiscoveredModule, LoadOutcome, LoadSummary, ModuleInfo, ModuleManager, ModuleState};
pub use manifest::{ModuleManifest, MANIFEST_FILE};
pub use watcher::{module_for_path, Debouncer, HotReloader};
