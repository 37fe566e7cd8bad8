//! Shared fixtures for unit tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::application::commands::CommandRegistry;
use crate::application::context::{ConfigSource, HostHandles};
use crate::application::errors::PlatformError;
use crate::application::interactions::SessionStore;
use crate::application::lifecycle::EventBus;
use crate::application::services::Services;
use crate::domain::entities::{CommandDefinition, OptionChoice, Reply};
use crate::domain::traits::{InstallScope, Platform, PlatformInfo};
use crate::infrastructure::config::parse_bool;
use crate::infrastructure::storage::JsonStore;

/// Fixed key/value config
#[derive(Default)]
pub struct StaticConfig {
    pub values: HashMap<String, String>,
}

impl StaticConfig {
    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.values.insert(key.to_string(), value.to_string());
        self
    }
}

impl ConfigSource for StaticConfig {
    fn is_enabled(&self, flag: &str, default: bool) -> bool {
        self.values.get(flag).and_then(|v| parse_bool(v)).unwrap_or(default)
    }

    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

/// Platform that records every call
#[derive(Default)]
pub struct RecordingPlatform {
    pub ready: AtomicBool,
    next_message: AtomicU64,
    pub replies: Mutex<Vec<Reply>>,
    pub installs: Mutex<Vec<(InstallScope, Vec<String>)>>,
}

impl RecordingPlatform {
    pub fn replies(&self) -> Vec<Reply> {
        self.replies.lock().unwrap().clone()
    }

    fn record(&self, reply: &Reply) -> String {
        self.replies.lock().unwrap().push(reply.clone());
        format!("m{}", self.next_message.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[async_trait]
impl Platform for RecordingPlatform {
    async fn defer(&self, _interaction_id: &str, _ephemeral: bool) -> Result<(), PlatformError> {
        Ok(())
    }

    async fn respond(&self, _interaction_id: &str, reply: &Reply) -> Result<String, PlatformError> {
        Ok(self.record(reply))
    }

    async fn edit_original(&self, _interaction_id: &str, reply: &Reply) -> Result<String, PlatformError> {
        Ok(self.record(reply))
    }

    async fn follow_up(&self, _interaction_id: &str, reply: &Reply) -> Result<String, PlatformError> {
        Ok(self.record(reply))
    }

    async fn autocomplete(&self, _interaction_id: &str, _choices: &[OptionChoice]) -> Result<(), PlatformError> {
        Ok(())
    }

    async fn bulk_overwrite_commands(
        &self,
        scope: &InstallScope,
        commands: &[CommandDefinition],
    ) -> Result<usize, PlatformError> {
        let names = commands.iter().map(|c| c.name.clone()).collect();
        self.installs.lock().unwrap().push((scope.clone(), names));
        Ok(commands.len())
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn info(&self) -> PlatformInfo {
        PlatformInfo {
            name: "test".to_string(),
            application_id: "app".to_string(),
        }
    }
}

pub fn host_handles(config: StaticConfig) -> HostHandles {
    host_handles_with(config, Arc::new(RecordingPlatform::default()))
}

pub fn host_handles_with(config: StaticConfig, platform: Arc<RecordingPlatform>) -> HostHandles {
    HostHandles {
        registry: Arc::new(CommandRegistry::new()),
        sessions: Arc::new(SessionStore::default()),
        events: Arc::new(EventBus::new()),
        config: Arc::new(config),
        services: Services::new(platform, Arc::new(JsonStore::in_memory())),
    }
}
