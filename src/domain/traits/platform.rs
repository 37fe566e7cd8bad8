use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::application::errors::PlatformError;
use crate::domain::entities::{CommandDefinition, OptionChoice, Reply};

/// Platform trait - abstraction for the chat platform client
///
/// The host never manages the gateway connection itself; adapters translate
/// platform events into [`Interaction`](crate::domain::entities::Interaction)s
/// and implement these calls on top of their own client.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Acknowledge an interaction without a visible reply yet
    async fn defer(&self, interaction_id: &str, ephemeral: bool) -> Result<(), PlatformError>;

    /// Send the initial reply; returns the created message id
    async fn respond(&self, interaction_id: &str, reply: &Reply) -> Result<String, PlatformError>;

    /// Replace the deferred placeholder; returns the message id
    async fn edit_original(&self, interaction_id: &str, reply: &Reply) -> Result<String, PlatformError>;

    /// Send an additional message after the initial reply
    async fn follow_up(&self, interaction_id: &str, reply: &Reply) -> Result<String, PlatformError>;

    /// Answer an autocomplete request
    async fn autocomplete(&self, interaction_id: &str, choices: &[OptionChoice]) -> Result<(), PlatformError>;

    /// Replace the full command set for a scope; returns the number installed
    async fn bulk_overwrite_commands(
        &self,
        scope: &InstallScope,
        commands: &[CommandDefinition],
    ) -> Result<usize, PlatformError>;

    /// Whether the connection has signalled readiness
    fn is_ready(&self) -> bool;

    /// Get platform info
    fn info(&self) -> PlatformInfo;
}

/// Where a command set is installed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", content = "guild-id", rename_all = "kebab-case")]
pub enum InstallScope {
    Global,
    Guild(String),
}

impl fmt::Display for InstallScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstallScope::Global => f.write_str("global"),
            InstallScope::Guild(id) => write!(f, "guild {}", id),
        }
    }
}

/// Platform information
#[derive(Debug, Clone)]
pub struct PlatformInfo {
    pub name: String,
    pub application_id: String,
}
