//! Fluent command builder
//!
//! Accumulates a definition and its handlers, then `register` performs one
//! snapshot-to-registry transition and hands back a single disposer.

use std::sync::Arc;

use crate::application::errors::RegistryError;
use crate::application::interactions::bindings::BindingKey;
use crate::application::interactions::custom_id::{self, ComponentKind};
use crate::application::interactions::handler::{scoped_local, Handler};
use crate::application::interactions::middleware::{with_preconditions, Middleware, MiddlewareChain, Precondition};
use crate::application::lifecycle::Disposer;
use crate::domain::entities::{CommandDefinition, CommandKind, CommandOption, Permission};

use super::registry::{CommandRegistry, PendingBinding};

struct ComponentHandler {
    kind: ComponentKind,
    local: String,
    handler: Handler,
    requires_session: bool,
    prefix: bool,
}

/// Builder for one command and its handlers
pub struct CommandBuilder {
    registry: Arc<CommandRegistry>,
    generation: u64,
    definition: CommandDefinition,
    execute: Option<Handler>,
    subcommands: Vec<(Vec<String>, Handler)>,
    autocomplete: Vec<(String, Handler)>,
    components: Vec<ComponentHandler>,
    middleware: MiddlewareChain,
    preconditions: Vec<Precondition>,
}

impl CommandBuilder {
    pub fn new(registry: Arc<CommandRegistry>, generation: u64, name: impl Into<String>, kind: CommandKind) -> Self {
        Self {
            registry,
            generation,
            definition: CommandDefinition::new(name, kind),
            execute: None,
            subcommands: Vec::new(),
            autocomplete: Vec::new(),
            components: Vec::new(),
            middleware: MiddlewareChain::new(),
            preconditions: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.definition.description = description.into();
        self
    }

    pub fn default_permissions(mut self, permissions: &[Permission]) -> Self {
        self.definition.default_member_permissions = permissions.to_vec();
        self
    }

    pub fn dm_permission(mut self, allowed: bool) -> Self {
        self.definition.dm_permission = allowed;
        self
    }

    /// Add a top-level option, subcommand or subcommand group
    pub fn option(mut self, option: CommandOption) -> Self {
        self.definition.options.push(option);
        self
    }

    /// Handler for the root command (and any subcommand without its own)
    pub fn on_execute(mut self, handler: Handler) -> Self {
        self.execute = Some(handler);
        self
    }

    /// Handler for a subcommand path, e.g. `"add"` or `"tag remove"`
    pub fn on_subcommand(mut self, path: &str, handler: Handler) -> Self {
        let path = path.split_whitespace().map(str::to_string).collect();
        self.subcommands.push((path, handler));
        self
    }

    pub fn on_autocomplete(mut self, option: impl Into<String>, handler: Handler) -> Self {
        self.autocomplete.push((option.into(), handler));
        self
    }

    fn component(mut self, kind: ComponentKind, local: &str, handler: Handler, requires_session: bool, prefix: bool) -> Self {
        self.components.push(ComponentHandler {
            kind,
            local: local.to_string(),
            handler,
            requires_session,
            prefix,
        });
        self
    }

    pub fn on_button(self, local: &str, handler: Handler) -> Self {
        self.component(ComponentKind::Button, local, handler, false, false)
    }

    /// Button that needs the session recorded for its message
    pub fn on_stateful_button(self, local: &str, handler: Handler) -> Self {
        self.component(ComponentKind::Button, local, handler, true, false)
    }

    /// Button handler matching every local name starting with `prefix`
    pub fn on_button_prefix(self, prefix: &str, handler: Handler) -> Self {
        self.component(ComponentKind::Button, prefix, handler, false, true)
    }

    pub fn on_select(self, local: &str, handler: Handler) -> Self {
        self.component(ComponentKind::Select, local, handler, false, false)
    }

    pub fn on_stateful_select(self, local: &str, handler: Handler) -> Self {
        self.component(ComponentKind::Select, local, handler, true, false)
    }

    pub fn on_modal(self, local: &str, handler: Handler) -> Self {
        self.component(ComponentKind::Modal, local, handler, false, false)
    }

    /// Add a middleware layer around execute handlers; first added is outermost
    pub fn middleware<M: Middleware + 'static>(mut self, layer: M) -> Self {
        self.middleware = self.middleware.add(layer);
        self
    }

    /// Add a check that runs before any middleware
    pub fn precondition(mut self, check: Precondition) -> Self {
        self.preconditions.push(check);
        self
    }

    /// Preconditions, then middleware, then the handler
    fn wrap_execute(&self, handler: Handler) -> Handler {
        let wrapped = self.middleware.wrap(handler);
        if self.preconditions.is_empty() {
            wrapped
        } else {
            with_preconditions(self.preconditions.clone(), wrapped)
        }
    }

    /// Register the command under `module`; the returned disposer undoes it
    pub fn register(self, module: &str) -> Result<Disposer, RegistryError> {
        let name = self.definition.name.clone();
        let mut bindings = Vec::new();

        if let Some(handler) = &self.execute {
            let key = match self.definition.kind {
                CommandKind::ChatInput => BindingKey::execute(&name, &[]),
                kind => BindingKey::ContextMenu {
                    kind,
                    name: name.clone(),
                },
            };
            bindings.push(PendingBinding {
                key,
                handler: self.wrap_execute(Arc::clone(handler)),
                requires_session: false,
                prefix: false,
            });
        }

        let known_paths = self.definition.subcommand_paths();
        for (path, handler) in &self.subcommands {
            if !known_paths.contains(path) {
                return Err(RegistryError::InvalidDefinition(format!(
                    "handler for unknown subcommand '{} {}'",
                    name,
                    path.join(" ")
                )));
            }
            bindings.push(PendingBinding {
                key: BindingKey::execute(&name, path),
                handler: self.wrap_execute(Arc::clone(handler)),
                requires_session: false,
                prefix: false,
            });
        }

        let autocomplete_options = self.definition.autocomplete_options();
        for (option, handler) in &self.autocomplete {
            if !autocomplete_options.contains(&option.as_str()) {
                tracing::warn!(command = %name, option = %option, "Autocomplete handler for an option not flagged autocomplete");
            }
            bindings.push(PendingBinding {
                key: BindingKey::Autocomplete {
                    command: name.clone(),
                    option: option.clone(),
                },
                handler: Arc::clone(handler),
                requires_session: false,
                prefix: false,
            });
        }

        for component in &self.components {
            let local = scoped_local(&name, &component.local);
            // Reject ids that could never be sent before touching the registry
            custom_id::encode(module, component.kind, &local, &[])?;
            bindings.push(PendingBinding {
                key: BindingKey::component(module, component.kind, &local),
                handler: Arc::clone(&component.handler),
                requires_session: component.requires_session,
                prefix: component.prefix,
            });
        }

        let token = self
            .registry
            .register_command(module, self.generation, self.definition, bindings)?;
        Ok(self.registry.disposer(format!("command:{}", name), token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::interactions::handler::handler;

    fn noop() -> Handler {
        handler(|_| async { Ok(()) })
    }

    fn registry() -> Arc<CommandRegistry> {
        let registry = Arc::new(CommandRegistry::new());
        registry.activate("ping", 1);
        registry
    }

    #[test]
    fn scopes_components_by_command_name() {
        let registry = registry();
        let disposer = CommandBuilder::new(registry.clone(), 1, "ping", CommandKind::ChatInput)
            .description("Pong")
            .on_execute(noop())
            .on_button("details", noop())
            .register("ping")
            .unwrap();

        assert!(registry
            .resolve_component("ping", ComponentKind::Button, "ping.details")
            .is_some());
        assert!(registry
            .resolve_component("ping", ComponentKind::Button, "details")
            .is_none());

        disposer.dispose().unwrap();
        assert!(!registry.contains("ping"));
        assert_eq!(registry.binding_count(), 0);
    }

    #[test]
    fn subcommand_handlers_must_exist_in_tree() {
        let err = CommandBuilder::new(registry(), 1, "tags", CommandKind::ChatInput)
            .description("Tags")
            .option(CommandOption::subcommand("add", "Add"))
            .on_subcommand("remove", noop())
            .register("ping")
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidDefinition(_)));
    }

    #[test]
    fn overlong_component_id_is_rejected() {
        let long = "x".repeat(120);
        let err = CommandBuilder::new(registry(), 1, "ping", CommandKind::ChatInput)
            .description("Pong")
            .on_button(&long, noop())
            .register("ping")
            .unwrap_err();
        assert!(matches!(err, RegistryError::Identifier(_)));
    }

    #[test]
    fn context_menu_binds_by_kind() {
        let registry = registry();
        CommandBuilder::new(registry.clone(), 1, "Inspect", CommandKind::UserContext)
            .on_execute(noop())
            .register("ping")
            .unwrap();
        assert!(registry
            .resolve(&BindingKey::ContextMenu {
                kind: CommandKind::UserContext,
                name: "Inspect".into()
            })
            .is_some());
    }
}
