//! Domain entities - Core business objects with no external dependencies

pub mod user;
pub mod command;
pub mod interaction;

pub use user::{Permission, Permissions, User};
pub use command::{CommandDefinition, CommandKind, CommandOption, OptionChoice, OptionKind};
pub use interaction::{ButtonStyle, Component, FocusedOption, Interaction, InteractionKind, Reply, SelectOption};
