use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{Permissions, User};

/// Kind of inbound interaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    ChatInput,
    Autocomplete,
    Button,
    Select,
    Modal,
    UserContext,
    MessageContext,
}

impl InteractionKind {
    pub fn as_str(&self) -> &str {
        match self {
            InteractionKind::ChatInput => "chat_input",
            InteractionKind::Autocomplete => "autocomplete",
            InteractionKind::Button => "button",
            InteractionKind::Select => "select",
            InteractionKind::Modal => "modal",
            InteractionKind::UserContext => "user_context",
            InteractionKind::MessageContext => "message_context",
        }
    }

    pub fn is_component(&self) -> bool {
        matches!(self, InteractionKind::Button | InteractionKind::Select | InteractionKind::Modal)
    }
}

/// The option currently being typed during autocomplete
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FocusedOption {
    pub name: String,
    pub partial: String,
}

/// An inbound interaction event, as decoded by the platform adapter
#[derive(Debug, Clone)]
pub struct Interaction {
    pub id: String,
    pub kind: InteractionKind,
    pub guild_id: Option<String>,
    pub channel_id: Option<String>,
    pub user: User,
    /// Permissions the bot itself holds in the channel
    pub app_permissions: Permissions,
    pub locale: Option<String>,
    pub command_name: Option<String>,
    pub subcommand_path: Vec<String>,
    pub options: Map<String, Value>,
    pub focused: Option<FocusedOption>,
    pub custom_id: Option<String>,
    /// The message a component is attached to
    pub message_id: Option<String>,
    /// Selected values for select menus
    pub values: Vec<String>,
    /// Submitted fields for modals
    pub fields: Map<String, Value>,
    /// Target user or message for context menus
    pub target_id: Option<String>,
    pub received_at: DateTime<Utc>,
}

impl Interaction {
    pub fn new(kind: InteractionKind, user: User) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            guild_id: None,
            channel_id: None,
            user,
            app_permissions: Permissions::all(),
            locale: None,
            command_name: None,
            subcommand_path: Vec::new(),
            options: Map::new(),
            focused: None,
            custom_id: None,
            message_id: None,
            values: Vec::new(),
            fields: Map::new(),
            target_id: None,
            received_at: Utc::now(),
        }
    }

    pub fn chat_input(name: impl Into<String>, user: User) -> Self {
        let mut interaction = Self::new(InteractionKind::ChatInput, user);
        interaction.command_name = Some(name.into());
        interaction
    }

    pub fn autocomplete(
        name: impl Into<String>,
        option: impl Into<String>,
        partial: impl Into<String>,
        user: User,
    ) -> Self {
        let mut interaction = Self::new(InteractionKind::Autocomplete, user);
        interaction.command_name = Some(name.into());
        interaction.focused = Some(FocusedOption {
            name: option.into(),
            partial: partial.into(),
        });
        interaction
    }

    pub fn component(
        kind: InteractionKind,
        message_id: impl Into<String>,
        custom_id: impl Into<String>,
        user: User,
    ) -> Self {
        let mut interaction = Self::new(kind, user);
        interaction.message_id = Some(message_id.into());
        interaction.custom_id = Some(custom_id.into());
        interaction
    }

    pub fn context_menu(
        kind: InteractionKind,
        name: impl Into<String>,
        target_id: impl Into<String>,
        user: User,
    ) -> Self {
        let mut interaction = Self::new(kind, user);
        interaction.command_name = Some(name.into());
        interaction.target_id = Some(target_id.into());
        interaction
    }

    pub fn in_guild(mut self, guild_id: impl Into<String>) -> Self {
        self.guild_id = Some(guild_id.into());
        self
    }

    pub fn in_channel(mut self, channel_id: impl Into<String>) -> Self {
        self.channel_id = Some(channel_id.into());
        self
    }

    pub fn with_subcommand(mut self, path: &[&str]) -> Self {
        self.subcommand_path = path.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_option(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(name.into(), value.into());
        self
    }

    pub fn with_values(mut self, values: Vec<String>) -> Self {
        self.values = values;
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn with_app_permissions(mut self, permissions: Permissions) -> Self {
        self.app_permissions = permissions;
        self
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    /// Read a string option by name
    pub fn option_str(&self, name: &str) -> Option<&str> {
        self.options.get(name).and_then(Value::as_str)
    }

    /// Read an integer option by name
    pub fn option_i64(&self, name: &str) -> Option<i64> {
        self.options.get(name).and_then(Value::as_i64)
    }

    /// Human-readable command path, e.g. `tags add`
    pub fn command_path(&self) -> String {
        let mut parts: Vec<&str> = self.command_name.iter().map(String::as_str).collect();
        parts.extend(self.subcommand_path.iter().map(String::as_str));
        parts.join(" ")
    }
}

/// Style of a button component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonStyle {
    Primary,
    Secondary,
    Success,
    Danger,
}

/// An option inside a select menu
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    pub label: String,
    pub value: String,
}

/// An interactive component attached to a reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Component {
    Button {
        custom_id: String,
        label: String,
        style: ButtonStyle,
    },
    Select {
        custom_id: String,
        placeholder: Option<String>,
        options: Vec<SelectOption>,
    },
}

impl Component {
    pub fn button(custom_id: impl Into<String>, label: impl Into<String>) -> Self {
        Component::Button {
            custom_id: custom_id.into(),
            label: label.into(),
            style: ButtonStyle::Secondary,
        }
    }

    pub fn custom_id(&self) -> &str {
        match self {
            Component::Button { custom_id, .. } | Component::Select { custom_id, .. } => custom_id,
        }
    }
}

/// A reply sent back for an interaction
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub content: String,
    pub ephemeral: bool,
    pub components: Vec<Component>,
}

impl Reply {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn ephemeral(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ephemeral: true,
            components: Vec::new(),
        }
    }

    pub fn with_component(mut self, component: Component) -> Self {
        self.components.push(component);
        self
    }
}
