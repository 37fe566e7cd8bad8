//! Entry resolution - finds a module's entry file and normalizes both formats
//!
//! A module folder holds either a native library `module.<dll-ext>` or a
//! `module.yaml` manifest naming a catalog entry. Both end up as one
//! [`ResolvedEntry`] so the loader never cares which format it was.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use libloading::{Library, Symbol};

use super::catalog::ModuleCatalog;
use super::manifest::{ModuleManifest, MANIFEST_FILE};
use crate::application::errors::ModuleError;
use crate::application::modules::ModuleInit;

/// Symbol a native module must export
pub const ENTRY_SYMBOL: &[u8] = b"modhost_module_entry";

/// Function signature of the native entry point
///
/// Must return a pointer obtained from
/// `Box::into_raw(Box::new(Box::new(module) as Box<dyn ModuleInit>))`. The
/// outer box keeps the pointer thin across the C ABI.
pub type ModuleEntryFn = extern "C" fn() -> *mut Box<dyn ModuleInit>;

/// File name of the native library entry on this platform
pub fn library_file_name() -> String {
    format!("module.{}", std::env::consts::DLL_EXTENSION)
}

/// The two recognized module formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryFormat {
    Native,
    Manifest,
}

impl fmt::Display for EntryFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryFormat::Native => f.write_str("native"),
            EntryFormat::Manifest => f.write_str("manifest"),
        }
    }
}

/// The entry file found in a module folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryFile {
    pub format: EntryFormat,
    pub path: PathBuf,
}

/// Find the entry file, preferring the native library over the manifest
pub fn find_entry(dir: &Path) -> Result<EntryFile, ModuleError> {
    let native = dir.join(library_file_name());
    let manifest = dir.join(MANIFEST_FILE);
    match (native.is_file(), manifest.is_file()) {
        (true, has_manifest) => {
            if has_manifest {
                tracing::warn!(dir = %dir.display(), "Both native library and manifest present, using the library");
            }
            Ok(EntryFile {
                format: EntryFormat::Native,
                path: native,
            })
        }
        (false, true) => Ok(EntryFile {
            format: EntryFormat::Manifest,
            path: manifest,
        }),
        (false, false) => Err(ModuleError::MissingEntry(dir.to_path_buf())),
    }
}

/// A loaded native library, unloaded and its shadow copy removed on drop
pub struct NativeLibrary {
    library: Option<Library>,
    shadow: PathBuf,
}

impl NativeLibrary {
    pub fn shadow_path(&self) -> &Path {
        &self.shadow
    }
}

impl Drop for NativeLibrary {
    fn drop(&mut self) {
        drop(self.library.take());
        if let Err(e) = std::fs::remove_file(&self.shadow) {
            tracing::debug!(path = %self.shadow.display(), "Failed to remove shadow library: {}", e);
        }
    }
}

/// Normalized module entry, whatever format it came from
pub struct ResolvedEntry {
    pub format: EntryFormat,
    pub init: Arc<dyn ModuleInit>,
    pub description: Option<String>,
    /// Keeps native code mapped; must outlive `init` and everything it registered
    pub library: Option<NativeLibrary>,
}

/// Turn an entry file into a [`ResolvedEntry`]
///
/// Native libraries are copied to `shadow_dir` under a generation-stamped
/// name first, so each load maps a fresh file and picks up rebuilt code.
pub fn normalize_entry(
    module: &str,
    entry: &EntryFile,
    catalog: &ModuleCatalog,
    shadow_dir: &Path,
    generation: u64,
) -> Result<ResolvedEntry, ModuleError> {
    match entry.format {
        EntryFormat::Manifest => {
            let manifest = ModuleManifest::from_file(&entry.path)?;
            let init = catalog
                .get(&manifest.entry)
                .ok_or_else(|| ModuleError::UnknownEntry(manifest.entry.clone()))?;
            Ok(ResolvedEntry {
                format: EntryFormat::Manifest,
                init,
                description: manifest.description,
                library: None,
            })
        }
        EntryFormat::Native => {
            std::fs::create_dir_all(shadow_dir)?;
            let shadow = shadow_dir.join(format!(
                "{}-{}.{}",
                module,
                generation,
                std::env::consts::DLL_EXTENSION
            ));
            std::fs::copy(&entry.path, &shadow)?;
            let (library, init) = load_native(&shadow).inspect_err(|_| {
                let _ = std::fs::remove_file(&shadow);
            })?;
            tracing::debug!(module, path = %shadow.display(), "Mapped native module");
            Ok(ResolvedEntry {
                format: EntryFormat::Native,
                init,
                description: None,
                library: Some(NativeLibrary {
                    library: Some(library),
                    shadow,
                }),
            })
        }
    }
}

fn load_native(path: &Path) -> Result<(Library, Arc<dyn ModuleInit>), ModuleError> {
    // Loading runs the library's initializers; the file is the module author's build output
    let library = unsafe { Library::new(path).map_err(|e| ModuleError::Library(e.to_string()))? };

    let init = {
        let entry: Symbol<ModuleEntryFn> = unsafe {
            library.get(ENTRY_SYMBOL).map_err(|e| {
                ModuleError::InvalidExport(format!(
                    "missing {}: {}",
                    String::from_utf8_lossy(ENTRY_SYMBOL),
                    e
                ))
            })?
        };
        take_entry(*entry)?
    };
    Ok((library, init))
}

/// Call a native entry point and take ownership of the module it returns
fn take_entry(entry: ModuleEntryFn) -> Result<Arc<dyn ModuleInit>, ModuleError> {
    let raw = entry();
    if raw.is_null() {
        return Err(ModuleError::InvalidExport("entry returned null".to_string()));
    }
    // The entry contract hands over a pointer from `Box::into_raw`
    let outer: Box<Box<dyn ModuleInit>> = unsafe { Box::from_raw(raw) };
    Ok(Arc::from(*outer))
}
