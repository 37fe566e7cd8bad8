//! Handler function types and the per-interaction context

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;

use super::custom_id::{self, ComponentKind, ScopedId};
use super::session::SessionHandle;
use crate::application::errors::{HandlerResult, IdentifierError, PlatformError};
use crate::application::services::Services;
use crate::domain::entities::{Interaction, InteractionKind, OptionChoice, Reply};
use crate::domain::traits::Platform;

/// Boxed future returned by handlers
pub type HandlerFuture = Pin<Box<dyn Future<Output = HandlerResult> + Send + 'static>>;

/// Handler function type
pub type Handler = Arc<dyn Fn(HandlerContext) -> HandlerFuture + Send + Sync>;

/// Wrap an async closure as a [`Handler`]
pub fn handler<F, Fut>(f: F) -> Handler
where
    F: Fn(HandlerContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(move |cx| Box::pin(f(cx)))
}

/// Acknowledgement state of an interaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckState {
    Pending,
    Deferred,
    Replied,
}

/// Sends responses for one interaction, tracking what was already sent
#[derive(Clone)]
pub struct Responder {
    platform: Arc<dyn Platform>,
    interaction_id: String,
    state: Arc<Mutex<AckState>>,
}

impl Responder {
    pub fn new(platform: Arc<dyn Platform>, interaction_id: impl Into<String>) -> Self {
        Self {
            platform,
            interaction_id: interaction_id.into(),
            state: Arc::new(Mutex::new(AckState::Pending)),
        }
    }

    pub async fn state(&self) -> AckState {
        *self.state.lock().await
    }

    pub async fn is_acknowledged(&self) -> bool {
        self.state().await != AckState::Pending
    }

    /// Acknowledge without replying; no-op (returns false) if already acknowledged
    pub async fn defer(&self, ephemeral: bool) -> Result<bool, PlatformError> {
        let mut state = self.state.lock().await;
        if *state != AckState::Pending {
            return Ok(false);
        }
        self.platform.defer(&self.interaction_id, ephemeral).await?;
        *state = AckState::Deferred;
        Ok(true)
    }

    /// Reply, edit the deferred placeholder, or follow up, depending on state
    pub async fn reply(&self, reply: &Reply) -> Result<String, PlatformError> {
        let mut state = self.state.lock().await;
        let message_id = match *state {
            AckState::Pending => self.platform.respond(&self.interaction_id, reply).await?,
            AckState::Deferred => self.platform.edit_original(&self.interaction_id, reply).await?,
            AckState::Replied => self.platform.follow_up(&self.interaction_id, reply).await?,
        };
        *state = AckState::Replied;
        Ok(message_id)
    }

    /// Answer an autocomplete request
    pub async fn autocomplete(&self, choices: &[OptionChoice]) -> Result<(), PlatformError> {
        let mut state = self.state.lock().await;
        if *state != AckState::Pending {
            return Err(PlatformError::AlreadyAcknowledged);
        }
        self.platform.autocomplete(&self.interaction_id, choices).await?;
        *state = AckState::Replied;
        Ok(())
    }
}

/// Everything a handler receives: the interaction, its arguments, its session
#[derive(Clone)]
pub struct HandlerContext {
    interaction: Arc<Interaction>,
    module: String,
    command: Option<String>,
    scoped_id: Option<ScopedId>,
    responder: Responder,
    session: SessionHandle,
    services: Services,
}

impl HandlerContext {
    pub fn new(
        interaction: Arc<Interaction>,
        module: impl Into<String>,
        command: Option<String>,
        scoped_id: Option<ScopedId>,
        responder: Responder,
        session: SessionHandle,
        services: Services,
    ) -> Self {
        Self {
            interaction,
            module: module.into(),
            command,
            scoped_id,
            responder,
            session,
            services,
        }
    }

    pub fn interaction(&self) -> &Interaction {
        &self.interaction
    }

    /// Module owning the handler being run
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Command the handler was registered under, if any
    pub fn command(&self) -> Option<&str> {
        self.command.as_deref()
    }

    /// Decoded custom id for component interactions
    pub fn scoped_id(&self) -> Option<&ScopedId> {
        self.scoped_id.as_ref()
    }

    /// Read an extra from the decoded custom id
    pub fn extra(&self, key: &str) -> Option<&str> {
        self.scoped_id.as_ref().and_then(|id| id.extra(key))
    }

    /// Command options, or modal fields for modal submissions
    pub fn arg(&self, name: &str) -> Option<&Value> {
        self.interaction
            .options
            .get(name)
            .or_else(|| self.interaction.fields.get(name))
    }

    pub fn responder(&self) -> &Responder {
        &self.responder
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Localized text for the interaction's locale
    pub fn text(&self, key: &str, args: &[(&str, String)]) -> String {
        self.services
            .localizer
            .text(key, self.interaction.locale.as_deref(), args)
    }

    /// Reply and bind the session to the resulting message
    pub async fn reply(&self, reply: Reply) -> Result<String, PlatformError> {
        let message_id = self.responder.reply(&reply).await?;
        if matches!(
            self.interaction.kind,
            InteractionKind::ChatInput | InteractionKind::UserContext | InteractionKind::MessageContext
        ) {
            self.session.bind(&message_id);
        }
        Ok(message_id)
    }

    pub async fn defer(&self, ephemeral: bool) -> Result<bool, PlatformError> {
        self.responder.defer(ephemeral).await
    }

    /// Encode a custom id for a component handled by this command
    pub fn component_id(
        &self,
        kind: ComponentKind,
        local: &str,
        extras: &[(String, String)],
    ) -> Result<String, IdentifierError> {
        let local = match &self.command {
            Some(command) => scoped_local(command, local),
            None => local.to_string(),
        };
        custom_id::encode(&self.module, kind, &local, extras)
    }

    pub fn button_id(&self, local: &str) -> Result<String, IdentifierError> {
        self.component_id(ComponentKind::Button, local, &[])
    }
}

/// Local name of a component declared on a command builder
pub fn scoped_local(command: &str, local: &str) -> String {
    format!("{}.{}", command, local)
}
