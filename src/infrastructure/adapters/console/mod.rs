//! Console adapter for development/testing

pub mod parser;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use crate::application::errors::PlatformError;
use crate::domain::entities::{CommandDefinition, Component, OptionChoice, Reply};
use crate::domain::traits::{InstallScope, Platform, PlatformInfo};

pub use parser::{ConsoleLine, ConsoleParser, MetaCommand, ParseError};

/// Console platform adapter for local development
///
/// Replies are printed to stdout; message ids are `msg-1`, `msg-2`, ...
pub struct ConsolePlatform {
    info: PlatformInfo,
    ready: AtomicBool,
    next_message: AtomicU64,
    /// interaction id -> id of its original reply
    originals: Mutex<HashMap<String, String>>,
}

impl ConsolePlatform {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            info: PlatformInfo {
                name: name.into(),
                application_id: "console".to_string(),
            },
            ready: AtomicBool::new(false),
            next_message: AtomicU64::new(1),
            originals: Mutex::new(HashMap::new()),
        }
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    fn message_id(&self) -> String {
        format!("msg-{}", self.next_message.fetch_add(1, Ordering::Relaxed))
    }

    fn print(&self, message_id: &str, reply: &Reply) {
        let marker = if reply.ephemeral { " (only you)" } else { "" };
        println!("[BOT] [{}]{} {}", message_id, marker, reply.content);
        for component in &reply.components {
            match component {
                Component::Button { custom_id, label, .. } => {
                    println!("  [Button] {} -> {}", label, custom_id);
                }
                Component::Select {
                    custom_id,
                    placeholder,
                    options,
                } => {
                    let values: Vec<&str> = options.iter().map(|o| o.value.as_str()).collect();
                    println!(
                        "  [Select] {} -> {} ({})",
                        placeholder.as_deref().unwrap_or("choose"),
                        custom_id,
                        values.join(", ")
                    );
                }
            }
        }
    }

    fn originals(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.originals.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for ConsolePlatform {
    fn default() -> Self {
        Self::new("modhost")
    }
}

#[async_trait]
impl Platform for ConsolePlatform {
    async fn defer(&self, interaction_id: &str, ephemeral: bool) -> Result<(), PlatformError> {
        let id = self.message_id();
        println!("[BOT] [{}] thinking...{}", id, if ephemeral { " (only you)" } else { "" });
        self.originals().insert(interaction_id.to_string(), id);
        Ok(())
    }

    async fn respond(&self, interaction_id: &str, reply: &Reply) -> Result<String, PlatformError> {
        let id = self.message_id();
        self.print(&id, reply);
        self.originals().insert(interaction_id.to_string(), id.clone());
        Ok(id)
    }

    async fn edit_original(&self, interaction_id: &str, reply: &Reply) -> Result<String, PlatformError> {
        let id = self
            .originals()
            .get(interaction_id)
            .cloned()
            .ok_or_else(|| PlatformError::Rejected(format!("no original reply for {}", interaction_id)))?;
        self.print(&id, reply);
        Ok(id)
    }

    async fn follow_up(&self, _interaction_id: &str, reply: &Reply) -> Result<String, PlatformError> {
        let id = self.message_id();
        self.print(&id, reply);
        Ok(id)
    }

    async fn autocomplete(&self, _interaction_id: &str, choices: &[OptionChoice]) -> Result<(), PlatformError> {
        if choices.is_empty() {
            println!("[BOT] (no suggestions)");
        }
        for choice in choices {
            println!("[BOT] ? {} = {}", choice.name, choice.value);
        }
        Ok(())
    }

    async fn bulk_overwrite_commands(
        &self,
        scope: &InstallScope,
        commands: &[CommandDefinition],
    ) -> Result<usize, PlatformError> {
        let names: Vec<String> = commands.iter().map(|c| format!("/{}", c.name)).collect();
        println!("[INSTALL] {}: {}", scope, names.join(" "));
        Ok(commands.len())
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn info(&self) -> PlatformInfo {
        self.info.clone()
    }
}
