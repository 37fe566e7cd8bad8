//! Configuration management

pub mod flags;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::application::errors::ConfigError;
use crate::domain::traits::InstallScope;

pub use flags::{flag_for_module, parse_bool, FeatureFlags};

/// Host configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Config {
    pub bot: BotConfig,
    pub modules: ModulesConfig,
    pub install: InstallConfig,
    pub sessions: SessionConfig,
    /// locale -> message key -> template; the `default` locale applies to all
    pub messages: HashMap<String, HashMap<String, String>>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct BotConfig {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ModulesConfig {
    pub directory: PathBuf,
    /// Where native libraries are copied before loading
    pub shadow_directory: PathBuf,
    pub watch: bool,
    pub debounce_ms: u64,
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScopeKind {
    Global,
    Guild,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct InstallConfig {
    pub scope: ScopeKind,
    pub guild_id: Option<String>,
    /// Resync commands after a successful hot reload
    pub reinstall_on_reload: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SessionConfig {
    pub ttl_seconds: u64,
    pub sweep_interval_seconds: u64,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            name: "modhost".to_string(),
        }
    }
}

impl Default for ModulesConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("./modules"),
            shadow_directory: PathBuf::from("./target/module-shadow"),
            watch: true,
            debounce_ms: 300,
            poll_interval_ms: 250,
        }
    }
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            scope: ScopeKind::Global,
            guild_id: None,
            reinstall_on_reload: true,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: 15 * 60,
            sweep_interval_seconds: 60,
        }
    }
}

impl Config {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| ConfigError::Parse(format!("Failed to read config {}: {}", path.display(), e)))?;

        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content).map_err(|e| ConfigError::Parse(format!("Failed to parse config: {}", e)))
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(self).map_err(|e| ConfigError::Parse(format!("Failed to serialize config: {}", e)))
    }

    /// Write this configuration as YAML
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        std::fs::write(path, self.to_yaml()?)
            .map_err(|e| ConfigError::Parse(format!("Failed to write config {}: {}", path.display(), e)))
    }

    /// Defaults with environment overrides applied
    pub fn load_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Apply overrides from the process environment
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("MODULES_DIR") {
            self.modules.directory = PathBuf::from(dir);
        }

        if let Some(scope) = lookup("COMMAND_SCOPE") {
            self.install.scope = match scope.trim().to_ascii_lowercase().as_str() {
                "global" => ScopeKind::Global,
                "guild" => ScopeKind::Guild,
                other => {
                    return Err(ConfigError::InvalidValue(format!(
                        "COMMAND_SCOPE must be 'global' or 'guild', got '{}'",
                        other
                    )))
                }
            };
        }

        if let Some(guild) = lookup("GUILD_ID") {
            let guild = guild.trim().to_string();
            self.install.guild_id = (!guild.is_empty()).then_some(guild);
        }

        if let Some(value) = lookup("RELOAD_RESYNC_COMMANDS") {
            self.install.reinstall_on_reload = env_bool("RELOAD_RESYNC_COMMANDS", &value)?;
        }

        if let Some(value) = lookup("HOT_RELOAD") {
            self.modules.watch = env_bool("HOT_RELOAD", &value)?;
        }

        if let Some(value) = lookup("SESSION_TTL_SECONDS") {
            self.sessions.ttl_seconds = value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(format!("SESSION_TTL_SECONDS must be a number, got '{}'", value)))?;
        }

        Ok(())
    }

    /// Startup check; any error here is fatal
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bot.name.trim().is_empty() {
            return Err(ConfigError::MissingField("bot.name".to_string()));
        }
        if !self.modules.directory.is_dir() {
            return Err(ConfigError::InvalidValue(format!(
                "module directory {} does not exist",
                self.modules.directory.display()
            )));
        }
        if self.modules.debounce_ms == 0 {
            return Err(ConfigError::InvalidValue("modules.debounce-ms must be positive".to_string()));
        }
        if self.modules.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidValue("modules.poll-interval-ms must be positive".to_string()));
        }
        self.install_scope()?;
        Ok(())
    }

    /// Where commands are installed, taken only from `install.scope`
    pub fn install_scope(&self) -> Result<InstallScope, ConfigError> {
        match (self.install.scope, self.install.guild_id.as_deref()) {
            (ScopeKind::Guild, Some(id)) if !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) => {
                Ok(InstallScope::Guild(id.to_string()))
            }
            (ScopeKind::Guild, Some(id)) => Err(ConfigError::InvalidValue(format!(
                "install.guild-id must be numeric, got '{}'",
                id
            ))),
            (ScopeKind::Guild, None) => Err(ConfigError::MissingField("install.guild-id".to_string())),
            (ScopeKind::Global, guild) => {
                if let Some(id) = guild {
                    tracing::warn!(guild_id = id, "Guild id set but install scope is global; installing globally");
                }
                Ok(InstallScope::Global)
            }
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.modules.debounce_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.modules.poll_interval_ms)
    }

    pub fn session_ttl(&self) -> Option<Duration> {
        (self.sessions.ttl_seconds > 0).then(|| Duration::from_secs(self.sessions.ttl_seconds))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sessions.sweep_interval_seconds.max(1))
    }
}

fn env_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    parse_bool(value).ok_or_else(|| ConfigError::InvalidValue(format!("{} must be a boolean, got '{}'", key, value)))
}
