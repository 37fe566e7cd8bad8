//! Module manifest definition

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::application::errors::ModuleError;

/// Manifest file name inside a module folder
pub const MANIFEST_FILE: &str = "module.yaml";

/// Module metadata from `module.yaml`
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ModuleManifest {
    /// Catalog entry providing the module's init hook (required)
    pub entry: String,

    /// Module description
    #[serde(default)]
    pub description: Option<String>,

    /// Module version
    #[serde(default)]
    pub version: Option<String>,
}

impl ModuleManifest {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ModuleError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ModuleError::InvalidManifest {
            path: path.to_path_buf(),
            reason: format!("Failed to read manifest: {}", e),
        })?;

        let manifest: ModuleManifest = serde_yaml::from_str(&content).map_err(|e| ModuleError::InvalidManifest {
            path: path.to_path_buf(),
            reason: format!("Failed to parse manifest: {}", e),
        })?;

        if manifest.entry.trim().is_empty() {
            return Err(ModuleError::InvalidManifest {
                path: path.to_path_buf(),
                reason: "entry must not be empty".to_string(),
            });
        }
        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(MANIFEST_FILE);
        std::fs::write(&path, "entry: ping\ndescription: Replies with pong\n").unwrap();
        let manifest = ModuleManifest::from_file(&path).unwrap();
        assert_eq!(manifest.entry, "ping");
        assert_eq!(manifest.description.as_deref(), Some("Replies with pong"));
    }

    #[test]
    fn rejects_missing_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(MANIFEST_FILE);
        std::fs::write(&path, "description: nothing to run\n").unwrap();
        assert!(matches!(
            ModuleManifest::from_file(&path),
            Err(ModuleError::InvalidManifest { .. })
        ));
    }
}
