//! Interaction router - single entry point for inbound interactions
//!
//! Classifies each interaction, resolves its binding through the registry
//! and runs it with error containment. Unknown commands, undecodable custom
//! ids and missing sessions all end in a benign notice, never an error.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::Instrument;

use super::bindings::BindingKey;
use super::custom_id::{self, ComponentKind, ScopedId};
use super::handler::{HandlerContext, Responder};
use super::middleware::run_and_contain;
use super::session::{SessionHandle, SessionStore};
use crate::application::commands::{CommandRegistry, ResolvedBinding};
use crate::application::errors::HandlerError;
use crate::application::services::{localizer, Services};
use crate::domain::entities::{CommandKind, Interaction, InteractionKind, Reply};

/// How a dispatch ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A handler ran to completion
    Handled,
    /// No live handler; the user was told the action is unavailable
    UnknownAction,
    /// The component needed a session that no longer exists
    SessionExpired,
    /// The handler failed; the error was contained
    Failed,
}

/// Routes interactions to registered handlers
pub struct InteractionRouter {
    registry: Arc<CommandRegistry>,
    sessions: Arc<SessionStore>,
    services: Services,
}

impl InteractionRouter {
    pub fn new(registry: Arc<CommandRegistry>, sessions: Arc<SessionStore>, services: Services) -> Self {
        Self {
            registry,
            sessions,
            services,
        }
    }

    pub fn registry(&self) -> &Arc<CommandRegistry> {
        &self.registry
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Dispatch on a separate task so a slow handler never blocks the next one
    pub fn spawn(self: &Arc<Self>, interaction: Interaction) -> JoinHandle<DispatchOutcome> {
        let router = Arc::clone(self);
        tokio::spawn(async move { router.dispatch(interaction).await })
    }

    /// Dispatch one interaction to completion
    pub async fn dispatch(&self, interaction: Interaction) -> DispatchOutcome {
        let span = tracing::info_span!(
            "interaction",
            id = %interaction.id,
            kind = interaction.kind.as_str(),
            user = %interaction.user.id,
        );
        let interaction = Arc::new(interaction);
        let responder = Responder::new(Arc::clone(&self.services.platform), interaction.id.clone());
        self.route(interaction, responder).instrument(span).await
    }

    async fn route(&self, interaction: Arc<Interaction>, responder: Responder) -> DispatchOutcome {
        match interaction.kind {
            InteractionKind::ChatInput => {
                let Some(name) = interaction.command_name.clone() else {
                    return self.unknown(&interaction, &responder, "chat input without a command name").await;
                };
                let exact = BindingKey::execute(&name, &interaction.subcommand_path);
                let resolved = self.registry.resolve(&exact).or_else(|| {
                    if interaction.subcommand_path.is_empty() {
                        None
                    } else {
                        self.registry.resolve(&BindingKey::execute(&name, &[]))
                    }
                });
                match resolved {
                    Some(binding) => self.invoke(binding, interaction, responder, None, None).await,
                    None => self.unknown(&interaction, &responder, &format!("no handler for /{}", interaction.command_path())).await,
                }
            }
            InteractionKind::UserContext | InteractionKind::MessageContext => {
                let kind = if interaction.kind == InteractionKind::UserContext {
                    CommandKind::UserContext
                } else {
                    CommandKind::MessageContext
                };
                let key = BindingKey::ContextMenu {
                    kind,
                    name: interaction.command_name.clone().unwrap_or_default(),
                };
                match self.registry.resolve(&key) {
                    Some(binding) => self.invoke(binding, interaction, responder, None, None).await,
                    None => self.unknown(&interaction, &responder, &format!("no handler for {}", key)).await,
                }
            }
            InteractionKind::Autocomplete => {
                let key = match (&interaction.command_name, &interaction.focused) {
                    (Some(command), Some(focused)) => Some(BindingKey::Autocomplete {
                        command: command.clone(),
                        option: focused.name.clone(),
                    }),
                    _ => None,
                };
                match key.and_then(|k| self.registry.resolve(&k)) {
                    Some(binding) => self.invoke(binding, interaction, responder, None, None).await,
                    None => {
                        tracing::debug!(command = %interaction.command_path(), "No autocomplete handler");
                        if let Err(e) = responder.autocomplete(&[]).await {
                            tracing::warn!("Failed to answer autocomplete: {}", e);
                        }
                        DispatchOutcome::UnknownAction
                    }
                }
            }
            InteractionKind::Button | InteractionKind::Select | InteractionKind::Modal => {
                self.route_component(interaction, responder).await
            }
        }
    }

    async fn route_component(&self, interaction: Arc<Interaction>, responder: Responder) -> DispatchOutcome {
        let Some(raw) = interaction.custom_id.as_deref() else {
            return self.unknown(&interaction, &responder, "component without custom id").await;
        };
        let scoped: ScopedId = match custom_id::decode(raw) {
            Ok(id) => id,
            Err(e) => return self.unknown(&interaction, &responder, &format!("{} ({:?})", e, raw)).await,
        };
        if ComponentKind::from_interaction(interaction.kind) != Some(scoped.kind) {
            return self
                .unknown(&interaction, &responder, &format!("kind mismatch for {:?}", raw))
                .await;
        }
        let Some(binding) = self.registry.resolve_component(&scoped.module, scoped.kind, &scoped.local) else {
            return self.unknown(&interaction, &responder, &format!("no live handler for {:?}", raw)).await;
        };

        let session_key = interaction.message_id.clone();
        if binding.requires_session {
            let live = session_key.as_deref().is_some_and(|key| self.sessions.contains(key));
            if !live {
                tracing::info!(custom_id = raw, message = ?session_key, "Session expired");
                self.notify(&interaction, &responder, localizer::SESSION_EXPIRED).await;
                return DispatchOutcome::SessionExpired;
            }
        }

        self.invoke(binding, interaction, responder, Some(scoped), session_key).await
    }

    async fn invoke(
        &self,
        binding: ResolvedBinding,
        interaction: Arc<Interaction>,
        responder: Responder,
        scoped: Option<ScopedId>,
        session_key: Option<String>,
    ) -> DispatchOutcome {
        let session = SessionHandle::new(Arc::clone(&self.sessions), binding.module.clone(), session_key);
        let cx = HandlerContext::new(
            interaction,
            binding.module,
            binding.command,
            scoped,
            responder,
            session,
            self.services.clone(),
        );
        match run_and_contain(&binding.handler, cx).await {
            None => DispatchOutcome::Handled,
            Some(HandlerError::SessionExpired) => DispatchOutcome::SessionExpired,
            Some(_) => DispatchOutcome::Failed,
        }
    }

    async fn unknown(&self, interaction: &Interaction, responder: &Responder, reason: &str) -> DispatchOutcome {
        tracing::warn!(interaction = %interaction.id, "Unknown action: {}", reason);
        self.notify(interaction, responder, localizer::UNKNOWN_ACTION).await;
        DispatchOutcome::UnknownAction
    }

    async fn notify(&self, interaction: &Interaction, responder: &Responder, key: &str) {
        let text = self
            .services
            .localizer
            .text(key, interaction.locale.as_deref(), &[]);
        if let Err(e) = responder.reply(&Reply::ephemeral(text)).await {
            tracing::warn!(interaction = %interaction.id, "Failed to send notice: {}", e);
        }
    }
}
