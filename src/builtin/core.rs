//! Core module: /help and /version

use std::sync::Arc;

use serde_json::Value;

use crate::application::commands::CommandRegistry;
use crate::application::context::ModuleContext;
use crate::application::errors::{HandlerResult, ModuleResult};
use crate::application::interactions::{handler, HandlerContext};
use crate::application::modules::{module_fn, BasicHandle, ModuleHandle, ModuleInit};
use crate::domain::entities::{CommandDefinition, CommandKind, CommandOption, OptionChoice, Reply};

/// Platforms cap autocomplete answers at 25 choices
const MAX_CHOICES: usize = 25;

pub fn module() -> Arc<dyn ModuleInit> {
    module_fn(init)
}

async fn init(ctx: ModuleContext) -> ModuleResult<Box<dyn ModuleHandle>> {
    let registry = Arc::clone(ctx.registry());
    let suggest_registry = Arc::clone(&registry);

    ctx.register_command(
        ctx.command("help")
            .description("List available commands")
            .option(CommandOption::string("command", "Show details for one command").with_autocomplete())
            .on_execute(handler(move |cx| {
                let registry = Arc::clone(&registry);
                async move { help(cx, registry).await }
            }))
            .on_autocomplete(
                "command",
                handler(move |cx| {
                    let registry = Arc::clone(&suggest_registry);
                    async move { suggest(cx, registry).await }
                }),
            ),
    )?;

    ctx.register_command(
        ctx.command("version")
            .description("Show the host version")
            .on_execute(handler(version)),
    )?;

    Ok(Box::new(BasicHandle::new(ctx.name(), "Help and version commands")))
}

async fn help(cx: HandlerContext, registry: Arc<CommandRegistry>) -> HandlerResult {
    let text = match cx.interaction().option_str("command") {
        Some(name) => match registry.definition(name.trim_start_matches('/')) {
            Some(def) => describe(&def),
            None => format!("No command named /{}", name.trim_start_matches('/')),
        },
        None => {
            let mut defs: Vec<CommandDefinition> = registry
                .definitions()
                .into_iter()
                .filter(|d| d.kind == CommandKind::ChatInput)
                .collect();
            defs.sort_by(|a, b| a.name.cmp(&b.name));

            let mut text = String::from("Available commands:\n");
            for def in &defs {
                text.push_str(&format!("/{} - {}\n", def.name, def.description));
            }
            text
        }
    };

    cx.reply(Reply::ephemeral(text.trim_end())).await?;
    Ok(())
}

fn describe(def: &CommandDefinition) -> String {
    let mut text = format!("/{} - {} (module {})", def.name, def.description, def.module);
    for option in &def.options {
        let marker = if option.required { " (required)" } else { "" };
        text.push_str(&format!("\n  {}{}: {}", option.name, marker, option.description));
    }
    text
}

async fn suggest(cx: HandlerContext, registry: Arc<CommandRegistry>) -> HandlerResult {
    let partial = cx
        .interaction()
        .focused
        .as_ref()
        .map(|f| f.partial.to_lowercase())
        .unwrap_or_default();

    let mut names: Vec<String> = registry
        .definitions()
        .into_iter()
        .filter(|d| d.kind == CommandKind::ChatInput && d.name.starts_with(&partial))
        .map(|d| d.name)
        .collect();
    names.sort();

    let choices: Vec<OptionChoice> = names
        .into_iter()
        .take(MAX_CHOICES)
        .map(|name| OptionChoice {
            value: Value::String(name.clone()),
            name,
        })
        .collect();
    cx.responder().autocomplete(&choices).await?;
    Ok(())
}

async fn version(cx: HandlerContext) -> HandlerResult {
    let platform = cx.services().platform.info();
    cx.reply(Reply::ephemeral(format!(
        "modhost v{} on {}",
        env!("CARGO_PKG_VERSION"),
        platform.name
    )))
    .await?;
    Ok(())
}
