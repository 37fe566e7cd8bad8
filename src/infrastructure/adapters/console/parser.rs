//! Console line parser - turns REPL input into interactions
//!
//! ```text
//! /cmd [sub ...] [key=value ...]         chat input
//! ? cmd option [partial]                 autocomplete
//! click <message-id> <custom-id>         button
//! select <message-id> <custom-id> a,b    select menu
//! modal <message-id> <custom-id> k=v ... modal submit
//! user <target-id> <name>                user context menu
//! message <target-id> <name>             message context menu
//! :load|:unload|:reload <module>, :modules, :install, :help, :quit
//! ```

use serde_json::Value;
use thiserror::Error;

use crate::domain::entities::{Interaction, InteractionKind, User};

/// Console parse errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("unrecognised input: {0} (try :help)")]
    Unknown(String),
}

/// Host control commands typed at the console
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetaCommand {
    Load(String),
    Unload(String),
    Reload(String),
    Modules,
    Install,
    Help,
    Quit,
}

/// One parsed console line
#[derive(Debug, Clone)]
pub enum ConsoleLine {
    Empty,
    Interaction(Box<Interaction>),
    Meta(MetaCommand),
}

/// Parses console lines on behalf of one console user
pub struct ConsoleParser {
    user: User,
    guild_id: Option<String>,
}

impl ConsoleParser {
    pub fn new(user: User) -> Self {
        Self { user, guild_id: None }
    }

    pub fn in_guild(mut self, guild_id: impl Into<String>) -> Self {
        self.guild_id = Some(guild_id.into());
        self
    }

    pub fn parse(&self, line: &str) -> Result<ConsoleLine, ParseError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(ConsoleLine::Empty);
        }
        if let Some(rest) = line.strip_prefix(':') {
            return parse_meta(rest).map(ConsoleLine::Meta);
        }

        let interaction = if let Some(rest) = line.strip_prefix('/') {
            self.parse_command(rest)?
        } else if let Some(rest) = line.strip_prefix('?') {
            self.parse_autocomplete(rest)?
        } else {
            let (verb, rest) = split_first(line);
            match verb {
                "click" => self.parse_component(InteractionKind::Button, rest)?,
                "select" => self.parse_component(InteractionKind::Select, rest)?,
                "modal" => self.parse_component(InteractionKind::Modal, rest)?,
                "user" => self.parse_context(InteractionKind::UserContext, rest)?,
                "message" => self.parse_context(InteractionKind::MessageContext, rest)?,
                _ => return Err(ParseError::Unknown(line.to_string())),
            }
        };

        let interaction = match &self.guild_id {
            Some(guild) => interaction.in_guild(guild.clone()),
            None => interaction,
        };
        Ok(ConsoleLine::Interaction(Box::new(interaction.in_channel("console"))))
    }

    /// Parse a chat-input command; bare words before the first `k=v` are subcommands
    fn parse_command(&self, text: &str) -> Result<Interaction, ParseError> {
        let mut parts = text.split_whitespace();
        let name = parts.next().ok_or(ParseError::Usage("/cmd [sub ...] [key=value ...]"))?;
        let mut interaction = Interaction::chat_input(name, self.user.clone());
        let mut in_options = false;
        for part in parts {
            match part.split_once('=') {
                Some((key, value)) => {
                    in_options = true;
                    interaction = interaction.with_option(key, parse_value(value));
                }
                None if !in_options => interaction.subcommand_path.push(part.to_string()),
                None => return Err(ParseError::Usage("subcommands must come before key=value options")),
            }
        }
        Ok(interaction)
    }

    fn parse_autocomplete(&self, text: &str) -> Result<Interaction, ParseError> {
        const USAGE: &str = "? cmd option [partial]";
        let mut parts = text.split_whitespace();
        let command = parts.next().ok_or(ParseError::Usage(USAGE))?;
        let option = parts.next().ok_or(ParseError::Usage(USAGE))?;
        let partial = parts.collect::<Vec<_>>().join(" ");
        Ok(Interaction::autocomplete(command, option, partial, self.user.clone()))
    }

    fn parse_component(&self, kind: InteractionKind, text: &str) -> Result<Interaction, ParseError> {
        let usage = match kind {
            InteractionKind::Select => "select <message-id> <custom-id> v1,v2",
            InteractionKind::Modal => "modal <message-id> <custom-id> key=value ...",
            _ => "click <message-id> <custom-id>",
        };
        let mut parts = text.split_whitespace();
        let message_id = parts.next().ok_or(ParseError::Usage(usage))?;
        let custom_id = parts.next().ok_or(ParseError::Usage(usage))?;
        let mut interaction = Interaction::component(kind, message_id, custom_id, self.user.clone());

        match kind {
            InteractionKind::Select => {
                let values = parts.next().ok_or(ParseError::Usage(usage))?;
                interaction = interaction.with_values(
                    values
                        .split(',')
                        .filter(|v| !v.is_empty())
                        .map(str::to_string)
                        .collect(),
                );
            }
            InteractionKind::Modal => {
                for part in parts {
                    let (key, value) = part.split_once('=').ok_or(ParseError::Usage(usage))?;
                    interaction = interaction.with_field(key, value);
                }
            }
            _ => {}
        }
        Ok(interaction)
    }

    fn parse_context(&self, kind: InteractionKind, text: &str) -> Result<Interaction, ParseError> {
        let (target, name) = split_first(text);
        if target.is_empty() || name.is_empty() {
            return Err(ParseError::Usage("user|message <target-id> <command name>"));
        }
        Ok(Interaction::context_menu(kind, name, target, self.user.clone()))
    }
}

fn split_first(text: &str) -> (&str, &str) {
    let text = text.trim();
    match text.split_once(char::is_whitespace) {
        Some((first, rest)) => (first, rest.trim()),
        None => (text, ""),
    }
}

fn parse_meta(text: &str) -> Result<MetaCommand, ParseError> {
    let (verb, arg) = split_first(text);
    let module = || {
        if arg.is_empty() {
            Err(ParseError::Usage(":load|:unload|:reload <module>"))
        } else {
            Ok(arg.to_string())
        }
    };
    match verb {
        "load" => Ok(MetaCommand::Load(module()?)),
        "unload" => Ok(MetaCommand::Unload(module()?)),
        "reload" => Ok(MetaCommand::Reload(module()?)),
        "modules" => Ok(MetaCommand::Modules),
        "install" => Ok(MetaCommand::Install),
        "help" => Ok(MetaCommand::Help),
        "quit" | "exit" | "q" => Ok(MetaCommand::Quit),
        other => Err(ParseError::Unknown(format!(":{}", other))),
    }
}

/// Option values: integers and booleans are typed, everything else is a string
fn parse_value(raw: &str) -> Value {
    if let Ok(n) = raw.parse::<i64>() {
        return Value::from(n);
    }
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(raw.to_string()),
    }
}
