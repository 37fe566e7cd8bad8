use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};

use super::Permission;
use crate::application::errors::RegistryError;

/// Platform limits on command definitions
pub const MAX_OPTIONS: usize = 25;
pub const MAX_DESCRIPTION_LEN: usize = 100;

static NAME_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[-_a-z0-9]{1,32}$").unwrap_or_else(|e| panic!("invalid name pattern: {e}"))
});

/// What kind of command the platform shows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    ChatInput,
    UserContext,
    MessageContext,
}

/// Option value types, including subcommand nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionKind {
    SubcommandGroup,
    Subcommand,
    String,
    Integer,
    Number,
    Boolean,
    User,
    Channel,
    Role,
}

impl OptionKind {
    pub fn is_subcommand(&self) -> bool {
        matches!(self, OptionKind::Subcommand | OptionKind::SubcommandGroup)
    }
}

/// A fixed choice for an option
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionChoice {
    pub name: String,
    pub value: serde_json::Value,
}

/// One node of a command's option tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandOption {
    pub name: String,
    pub description: String,
    pub kind: OptionKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub autocomplete: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<OptionChoice>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<CommandOption>,
}

impl CommandOption {
    pub fn new(name: impl Into<String>, description: impl Into<String>, kind: OptionKind) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            kind,
            required: false,
            autocomplete: false,
            choices: Vec::new(),
            options: Vec::new(),
        }
    }

    pub fn string(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, description, OptionKind::String)
    }

    pub fn integer(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, description, OptionKind::Integer)
    }

    pub fn boolean(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, description, OptionKind::Boolean)
    }

    pub fn user(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, description, OptionKind::User)
    }

    pub fn subcommand(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, description, OptionKind::Subcommand)
    }

    pub fn group(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, description, OptionKind::SubcommandGroup)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_autocomplete(mut self) -> Self {
        self.autocomplete = true;
        self
    }

    pub fn with_choice(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.choices.push(OptionChoice {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    pub fn with_option(mut self, option: CommandOption) -> Self {
        self.options.push(option);
        self
    }

    fn validate(&self, depth: usize) -> Result<(), RegistryError> {
        validate_name(&self.name)?;
        validate_description(&self.name, &self.description)?;
        if self.options.len() > MAX_OPTIONS {
            return Err(RegistryError::InvalidDefinition(format!(
                "option '{}' has more than {} children",
                self.name, MAX_OPTIONS
            )));
        }
        match self.kind {
            OptionKind::SubcommandGroup => {
                if depth > 0 {
                    return Err(RegistryError::InvalidDefinition(format!(
                        "group '{}' must be at the top level",
                        self.name
                    )));
                }
                if let Some(bad) = self.options.iter().find(|o| o.kind != OptionKind::Subcommand) {
                    return Err(RegistryError::InvalidDefinition(format!(
                        "group '{}' may only contain subcommands, found '{}'",
                        self.name, bad.name
                    )));
                }
            }
            OptionKind::Subcommand => {
                if let Some(bad) = self.options.iter().find(|o| o.kind.is_subcommand()) {
                    return Err(RegistryError::InvalidDefinition(format!(
                        "subcommand '{}' cannot nest '{}'",
                        self.name, bad.name
                    )));
                }
            }
            _ => {
                if !self.options.is_empty() {
                    return Err(RegistryError::InvalidDefinition(format!(
                        "value option '{}' cannot have children",
                        self.name
                    )));
                }
            }
        }
        for child in &self.options {
            child.validate(depth + 1)?;
        }
        Ok(())
    }
}

/// A command as submitted to the platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandDefinition {
    /// Owning module; never sent to the platform
    #[serde(skip)]
    pub module: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub kind: CommandKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<CommandOption>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub default_member_permissions: Vec<Permission>,
    #[serde(default = "default_true")]
    pub dm_permission: bool,
}

fn default_true() -> bool {
    true
}

impl CommandDefinition {
    pub fn new(name: impl Into<String>, kind: CommandKind) -> Self {
        Self {
            module: String::new(),
            name: name.into(),
            description: String::new(),
            kind,
            options: Vec::new(),
            default_member_permissions: Vec::new(),
            dm_permission: true,
        }
    }

    pub fn chat_input(name: impl Into<String>, description: impl Into<String>) -> Self {
        let mut def = Self::new(name, CommandKind::ChatInput);
        def.description = description.into();
        def
    }

    /// Check the definition against platform limits
    pub fn validate(&self) -> Result<(), RegistryError> {
        match self.kind {
            CommandKind::ChatInput => {
                validate_name(&self.name)?;
                validate_description(&self.name, &self.description)?;
                if self.options.len() > MAX_OPTIONS {
                    return Err(RegistryError::InvalidDefinition(format!(
                        "command '{}' has more than {} options",
                        self.name, MAX_OPTIONS
                    )));
                }
                for option in &self.options {
                    option.validate(0)?;
                }
            }
            CommandKind::UserContext | CommandKind::MessageContext => {
                let len = self.name.chars().count();
                if len == 0 || len > 32 {
                    return Err(RegistryError::InvalidDefinition(format!(
                        "context menu name '{}' must be 1-32 characters",
                        self.name
                    )));
                }
                if !self.description.is_empty() || !self.options.is_empty() {
                    return Err(RegistryError::InvalidDefinition(format!(
                        "context menu '{}' cannot have a description or options",
                        self.name
                    )));
                }
            }
        }
        Ok(())
    }

    /// Options flagged for autocomplete, at any depth
    pub fn autocomplete_options(&self) -> Vec<&str> {
        fn walk<'a>(options: &'a [CommandOption], out: &mut Vec<&'a str>) {
            for option in options {
                if option.autocomplete {
                    out.push(&option.name);
                }
                walk(&option.options, out);
            }
        }
        let mut out = Vec::new();
        walk(&self.options, &mut out);
        out
    }

    /// Every invocable subcommand path, e.g. `["add"]` or `["tag", "remove"]`
    pub fn subcommand_paths(&self) -> Vec<Vec<String>> {
        let mut paths = Vec::new();
        for option in &self.options {
            match option.kind {
                OptionKind::Subcommand => paths.push(vec![option.name.clone()]),
                OptionKind::SubcommandGroup => {
                    for sub in &option.options {
                        paths.push(vec![option.name.clone(), sub.name.clone()]);
                    }
                }
                _ => {}
            }
        }
        paths
    }
}

fn validate_name(name: &str) -> Result<(), RegistryError> {
    if NAME_PATTERN.is_match(name) {
        Ok(())
    } else {
        Err(RegistryError::InvalidDefinition(format!(
            "name '{}' must match {}",
            name,
            NAME_PATTERN.as_str()
        )))
    }
}

fn validate_description(name: &str, description: &str) -> Result<(), RegistryError> {
    let len = description.chars().count();
    if len == 0 || len > MAX_DESCRIPTION_LEN {
        return Err(RegistryError::InvalidDefinition(format!(
            "description of '{}' must be 1-{} characters",
            name, MAX_DESCRIPTION_LEN
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_uppercase_names() {
        let def = CommandDefinition::chat_input("Ping", "Check latency");
        assert!(def.validate().is_err());
    }

    #[test]
    fn accepts_nested_group() {
        let def = CommandDefinition {
            options: vec![CommandOption::group("tag", "Tags")
                .with_option(CommandOption::subcommand("add", "Add a tag")
                    .with_option(CommandOption::string("name", "Tag name").required().with_autocomplete()))],
            ..CommandDefinition::chat_input("tags", "Manage tags")
        };
        assert!(def.validate().is_ok());
        assert_eq!(def.subcommand_paths(), vec![vec!["tag".to_string(), "add".to_string()]]);
        assert_eq!(def.autocomplete_options(), vec!["name"]);
    }

    #[test]
    fn rejects_group_inside_subcommand() {
        let def = CommandDefinition {
            options: vec![CommandOption::subcommand("add", "Add")
                .with_option(CommandOption::group("inner", "Nope"))],
            ..CommandDefinition::chat_input("tags", "Manage tags")
        };
        assert!(def.validate().is_err());
    }

    #[test]
    fn context_menu_has_no_description() {
        let mut def = CommandDefinition::new("Report Message", CommandKind::MessageContext);
        assert!(def.validate().is_ok());
        def.description = "nope".to_string();
        assert!(def.validate().is_err());
    }

    #[test]
    fn module_is_not_serialized() {
        let mut def = CommandDefinition::chat_input("ping", "Check latency");
        def.module = "ping".to_string();
        let json = serde_json::to_value(&def).unwrap();
        assert!(json.get("module").is_none());
        assert_eq!(json["kind"], "chat_input");
    }
}
