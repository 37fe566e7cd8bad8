//! Feature flags - per-module enable switches read from the environment
//!
//! Runtime overrides sit on top of the live process environment, so a flag
//! can be flipped for a reload without restarting.

use std::collections::HashMap;
use std::sync::RwLock;

use once_cell::sync::Lazy;
use regex_lite::Regex;

use crate::application::context::ConfigSource;

static NON_ALNUM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9]+").unwrap_or_else(|e| panic!("invalid flag pattern: {e}")));

/// Flag name for a module folder: `music-player` -> `MODULE_MUSIC_PLAYER_ENABLED`
pub fn flag_for_module(folder: &str) -> String {
    let upper = folder.to_uppercase();
    let collapsed = NON_ALNUM.replace_all(&upper, "_");
    format!("MODULE_{}_ENABLED", collapsed.trim_matches('_'))
}

/// Parse a boolean flag value; `None` when unrecognised
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Flag lookup: runtime overrides first, then the process environment
pub struct FeatureFlags {
    overrides: RwLock<HashMap<String, String>>,
    read_env: bool,
}

impl FeatureFlags {
    pub fn new() -> Self {
        Self {
            overrides: RwLock::new(HashMap::new()),
            read_env: true,
        }
    }

    /// Flags backed only by overrides, ignoring the environment
    pub fn isolated() -> Self {
        Self {
            overrides: RwLock::new(HashMap::new()),
            read_env: false,
        }
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        let mut overrides = self.overrides.write().unwrap_or_else(|e| e.into_inner());
        overrides.insert(key.into(), value.into());
    }

    pub fn unset(&self, key: &str) {
        let mut overrides = self.overrides.write().unwrap_or_else(|e| e.into_inner());
        overrides.remove(key);
    }

    /// Whether the module in `folder` may load; modules are on unless disabled
    pub fn module_enabled(&self, folder: &str) -> bool {
        self.is_enabled(&flag_for_module(folder), true)
    }
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigSource for FeatureFlags {
    fn is_enabled(&self, flag: &str, default: bool) -> bool {
        match self.get(flag) {
            Some(value) => parse_bool(&value).unwrap_or_else(|| {
                tracing::warn!(flag, value = %value, "Unrecognised flag value, using default");
                default
            }),
            None => default,
        }
    }

    fn get(&self, key: &str) -> Option<String> {
        let overrides = self.overrides.read().unwrap_or_else(|e| e.into_inner());
        if let Some(value) = overrides.get(key) {
            return Some(value.clone());
        }
        if self.read_env {
            std::env::var(key).ok()
        } else {
            None
        }
    }
}
