use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Platform capabilities a member or the bot may hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Permission {
    /// Implies every other permission
    Administrator,
    ManageGuild,
    ManageRoles,
    ManageChannels,
    ManageMessages,
    KickMembers,
    BanMembers,
    ModerateMembers,
    SendMessages,
    EmbedLinks,
    AttachFiles,
    Connect,
    Speak,
}

impl Permission {
    pub fn as_str(&self) -> &str {
        match self {
            Permission::Administrator => "administrator",
            Permission::ManageGuild => "manage-guild",
            Permission::ManageRoles => "manage-roles",
            Permission::ManageChannels => "manage-channels",
            Permission::ManageMessages => "manage-messages",
            Permission::KickMembers => "kick-members",
            Permission::BanMembers => "ban-members",
            Permission::ModerateMembers => "moderate-members",
            Permission::SendMessages => "send-messages",
            Permission::EmbedLinks => "embed-links",
            Permission::AttachFiles => "attach-files",
            Permission::Connect => "connect",
            Permission::Speak => "speak",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A set of granted permissions
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Permissions(HashSet<Permission>);

impl Permissions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        Self::from_iter([Permission::Administrator])
    }

    pub fn with(mut self, permission: Permission) -> Self {
        self.0.insert(permission);
        self
    }

    pub fn has(&self, permission: Permission) -> bool {
        self.0.contains(&Permission::Administrator) || self.0.contains(&permission)
    }

    /// Permissions from `required` that this set does not grant
    pub fn missing(&self, required: &[Permission]) -> Vec<Permission> {
        required.iter().copied().filter(|p| !self.has(*p)).collect()
    }
}

impl FromIterator<Permission> for Permissions {
    fn from_iter<I: IntoIterator<Item = Permission>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// The user behind an interaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub username: Option<String>,
    pub global_name: Option<String>,
    pub is_bot: bool,
    /// Guild member permissions; empty outside guilds
    pub permissions: Permissions,
}

impl User {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: None,
            global_name: None,
            is_bot: false,
            permissions: Permissions::new(),
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_permissions(mut self, permissions: Permissions) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn display_name(&self) -> String {
        self.global_name
            .clone()
            .or_else(|| self.username.clone())
            .unwrap_or_else(|| self.id.clone())
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn administrator_implies_everything() {
        let perms = Permissions::all();
        assert!(perms.has(Permission::BanMembers));
        assert!(perms.missing(&[Permission::ManageGuild, Permission::Speak]).is_empty());
    }

    #[test]
    fn missing_lists_only_absent() {
        let perms = Permissions::new().with(Permission::SendMessages);
        assert_eq!(
            perms.missing(&[Permission::SendMessages, Permission::KickMembers]),
            vec![Permission::KickMembers]
        );
    }
}
