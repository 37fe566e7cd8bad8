//! User-facing strings sent by the core

use std::collections::HashMap;

pub const GENERIC_FAILURE: &str = "error.generic";
pub const PERMISSION_DENIED: &str = "error.permission_denied";
pub const BOT_PERMISSION_DENIED: &str = "error.bot_permission_denied";
pub const COOLDOWN: &str = "error.cooldown";
pub const SESSION_EXPIRED: &str = "error.session_expired";
pub const UNKNOWN_ACTION: &str = "error.unknown_action";

/// Resolves message keys to text
pub trait Localizer: Send + Sync {
    /// Look up `key` for `locale`, substituting `{name}` placeholders
    fn text(&self, key: &str, locale: Option<&str>, args: &[(&str, String)]) -> String;
}

/// Table-backed localizer with English defaults
pub struct StaticLocalizer {
    /// locale -> key -> template; the `""` locale is the fallback
    tables: HashMap<String, HashMap<String, String>>,
}

impl StaticLocalizer {
    pub fn new() -> Self {
        let defaults = [
            (GENERIC_FAILURE, "Something went wrong while handling that. Please try again."),
            (PERMISSION_DENIED, "You need the following permissions: {permissions}"),
            (BOT_PERMISSION_DENIED, "I am missing the following permissions: {permissions}"),
            (COOLDOWN, "Slow down! Try again in {seconds}s."),
            (SESSION_EXPIRED, "This session has expired. Run the command again."),
            (UNKNOWN_ACTION, "This action is no longer available."),
        ];
        let fallback = defaults
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let mut tables = HashMap::new();
        tables.insert(String::new(), fallback);
        Self { tables }
    }

    /// Override or add templates, e.g. from configuration
    pub fn with_overrides(mut self, locale: Option<&str>, overrides: &HashMap<String, String>) -> Self {
        let table = self.tables.entry(locale.unwrap_or_default().to_string()).or_default();
        for (key, value) in overrides {
            table.insert(key.clone(), value.clone());
        }
        self
    }

    fn template(&self, key: &str, locale: Option<&str>) -> Option<&String> {
        locale
            .and_then(|l| self.tables.get(l))
            .and_then(|t| t.get(key))
            .or_else(|| self.tables.get("").and_then(|t| t.get(key)))
    }
}

impl Default for StaticLocalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Localizer for StaticLocalizer {
    fn text(&self, key: &str, locale: Option<&str>, args: &[(&str, String)]) -> String {
        let Some(template) = self.template(key, locale) else {
            return key.to_string();
        };
        args.iter().fold(template.clone(), |text, (name, value)| {
            text.replace(&format!("{{{}}}", name), value)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_placeholders() {
        let l = StaticLocalizer::new();
        assert_eq!(
            l.text(COOLDOWN, None, &[("seconds", "3".into())]),
            "Slow down! Try again in 3s."
        );
    }

    #[test]
    fn locale_falls_back_to_default() {
        let mut fr = HashMap::new();
        fr.insert(UNKNOWN_ACTION.to_string(), "Action inconnue.".to_string());
        let l = StaticLocalizer::new().with_overrides(Some("fr"), &fr);
        assert_eq!(l.text(UNKNOWN_ACTION, Some("fr"), &[]), "Action inconnue.");
        assert_eq!(l.text(SESSION_EXPIRED, Some("fr"), &[]), "This session has expired. Run the command again.");
        assert_eq!(l.text("missing.key", None, &[]), "missing.key");
    }
}
