//! Module context - the namespaced surface each module receives at init
//!
//! Every shared registry reaches modules through this value; nothing is
//! looked up globally, so tests can build isolated hosts side by side.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::AbortHandle;
use tracing::Instrument;

use crate::application::commands::{CommandBuilder, CommandRegistry, PendingBinding};
use crate::application::errors::RegistryError;
use crate::application::interactions::bindings::BindingKey;
use crate::application::interactions::custom_id::{self, ComponentKind};
use crate::application::interactions::{Handler, SessionStore};
use crate::application::lifecycle::{Disposer, EventBus, EventListener, LifecycleTracker};
use crate::application::services::Services;
use crate::domain::entities::CommandKind;

/// Read access to host configuration and feature flags
pub trait ConfigSource: Send + Sync {
    /// Boolean flag, falling back to `default` when unset or unparsable
    fn is_enabled(&self, flag: &str, default: bool) -> bool;

    fn get(&self, key: &str) -> Option<String>;
}

/// Host-wide collaborators shared by every module context
#[derive(Clone)]
pub struct HostHandles {
    pub registry: Arc<CommandRegistry>,
    pub sessions: Arc<SessionStore>,
    pub events: Arc<EventBus>,
    pub config: Arc<dyn ConfigSource>,
    pub services: Services,
}

/// Context handed to a module's init hook
#[derive(Clone)]
pub struct ModuleContext {
    module: String,
    generation: u64,
    host: HostHandles,
    tracker: Arc<LifecycleTracker>,
    span: tracing::Span,
}

impl ModuleContext {
    pub fn new(module: impl Into<String>, generation: u64, host: HostHandles, tracker: Arc<LifecycleTracker>) -> Self {
        let module = module.into();
        let span = tracing::info_span!("module", module = %module, generation);
        Self {
            module,
            generation,
            host,
            tracker,
            span,
        }
    }

    pub fn name(&self) -> &str {
        &self.module
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Span carrying `module` and `generation`; the loader enters it around hooks
    pub fn span(&self) -> &tracing::Span {
        &self.span
    }

    pub fn config(&self) -> &dyn ConfigSource {
        self.host.config.as_ref()
    }

    pub fn is_enabled(&self, flag: &str, default: bool) -> bool {
        self.host.config.is_enabled(flag, default)
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.host.config.get(key)
    }

    pub fn services(&self) -> &Services {
        &self.host.services
    }

    pub fn registry(&self) -> &Arc<CommandRegistry> {
        &self.host.registry
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.host.sessions
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.host.events
    }

    pub fn tracker(&self) -> &Arc<LifecycleTracker> {
        &self.tracker
    }

    /// Register a teardown to run when this module unloads
    pub fn track(&self, disposer: Disposer) {
        self.tracker.add(disposer);
    }

    /// Start a chat-input command builder
    pub fn command(&self, name: &str) -> CommandBuilder {
        CommandBuilder::new(Arc::clone(&self.host.registry), self.generation, name, CommandKind::ChatInput)
    }

    pub fn user_context(&self, name: &str) -> CommandBuilder {
        CommandBuilder::new(Arc::clone(&self.host.registry), self.generation, name, CommandKind::UserContext)
    }

    pub fn message_context(&self, name: &str) -> CommandBuilder {
        CommandBuilder::new(Arc::clone(&self.host.registry), self.generation, name, CommandKind::MessageContext)
    }

    /// Register a built command under this module and track its disposer
    pub fn register_command(&self, builder: CommandBuilder) -> Result<(), RegistryError> {
        let disposer = builder.register(&self.module)?;
        self.track(disposer);
        Ok(())
    }

    fn own_module(&self, module: &str) -> Result<(), RegistryError> {
        if module == self.module {
            Ok(())
        } else {
            Err(RegistryError::InvalidDefinition(format!(
                "module '{}' cannot register handlers for '{}'",
                self.module, module
            )))
        }
    }

    fn register_component(
        &self,
        module: &str,
        kind: ComponentKind,
        local: &str,
        handler: Handler,
        requires_session: bool,
        prefix: bool,
    ) -> Result<Disposer, RegistryError> {
        self.own_module(module)?;
        custom_id::encode(module, kind, local, &[])?;
        let token = self.host.registry.register_binding(
            module,
            self.generation,
            PendingBinding {
                key: BindingKey::component(module, kind, local),
                handler,
                requires_session,
                prefix,
            },
        )?;
        Ok(self.host.registry.disposer(format!("{}:{}", kind, local), token))
    }

    pub fn register_button(&self, module: &str, local: &str, handler: Handler) -> Result<Disposer, RegistryError> {
        self.register_component(module, ComponentKind::Button, local, handler, false, false)
    }

    /// Button that fails with a session-expired notice when its message has no session
    pub fn register_stateful_button(&self, module: &str, local: &str, handler: Handler) -> Result<Disposer, RegistryError> {
        self.register_component(module, ComponentKind::Button, local, handler, true, false)
    }

    pub fn register_button_prefix(&self, module: &str, prefix: &str, handler: Handler) -> Result<Disposer, RegistryError> {
        self.register_component(module, ComponentKind::Button, prefix, handler, false, true)
    }

    pub fn register_select(&self, module: &str, local: &str, handler: Handler) -> Result<Disposer, RegistryError> {
        self.register_component(module, ComponentKind::Select, local, handler, false, false)
    }

    pub fn register_modal(&self, module: &str, local: &str, handler: Handler) -> Result<Disposer, RegistryError> {
        self.register_component(module, ComponentKind::Modal, local, handler, false, false)
    }

    pub fn register_modal_prefix(&self, module: &str, prefix: &str, handler: Handler) -> Result<Disposer, RegistryError> {
        self.register_component(module, ComponentKind::Modal, prefix, handler, false, true)
    }

    pub fn register_user_context(&self, module: &str, name: &str, handler: Handler) -> Result<Disposer, RegistryError> {
        self.own_module(module)?;
        self.user_context(name).on_execute(handler).register(module)
    }

    pub fn register_message_context(&self, module: &str, name: &str, handler: Handler) -> Result<Disposer, RegistryError> {
        self.own_module(module)?;
        self.message_context(name).on_execute(handler).register(module)
    }

    /// Subscribe to a host event
    pub fn on(&self, module: &str, event: &str, listener: EventListener) -> Disposer {
        self.host.events.on(module, event, listener)
    }

    pub fn once(&self, module: &str, event: &str, listener: EventListener) -> Disposer {
        self.host.events.once(module, event, listener)
    }

    /// Drop every event subscription owned by `module`
    pub fn remove_module(&self, module: &str) -> usize {
        self.host.events.remove_module(module)
    }

    /// Run a background task that is aborted when the module unloads
    pub fn spawn<F>(&self, label: &str, future: F) -> AbortHandle
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(future.instrument(self.span.clone())).abort_handle();
        let abort = handle.clone();
        self.track(Disposer::new(format!("task:{}", label), move || abort.abort()));
        handle
    }

    /// Run `tick` every `period`, first after one period, until unload
    pub fn interval<F, Fut>(&self, label: &str, period: Duration, tick: F) -> AbortHandle
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let label_owned = label.to_string();
        self.spawn(label, async move {
            let start = tokio::time::Instant::now() + period;
            let mut ticker = tokio::time::interval_at(start, period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                tracing::trace!(interval = %label_owned, "tick");
                tick().await;
            }
        })
    }
}
