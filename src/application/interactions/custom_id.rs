//! Scoped custom-id codec
//!
//! Every interactive component carries a custom id of the form
//!
//! ```text
//! <module>:<kind>:<local>[|k=v;k=v...]
//! ```
//!
//! The three name segments may not contain any of the reserved delimiters.
//! Extras keys may not either; extras values only exclude `;` and `|`, so a
//! value may carry `:` or `=`. The whole id must fit the platform's 100-byte
//! custom-id limit.

use std::fmt;

use crate::application::errors::IdentifierError;
use crate::domain::entities::InteractionKind;

/// Platform limit on a component custom id, in bytes
pub const MAX_CUSTOM_ID_LEN: usize = 100;

const SEGMENT_DELIM: char = ':';
const EXTRAS_DELIM: char = '|';
const PAIR_DELIM: char = ';';
const KV_DELIM: char = '=';
const RESERVED: [char; 4] = [SEGMENT_DELIM, EXTRAS_DELIM, PAIR_DELIM, KV_DELIM];

/// Component kinds that carry a custom id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    Button,
    Select,
    Modal,
}

impl ComponentKind {
    pub fn tag(&self) -> &'static str {
        match self {
            ComponentKind::Button => "btn",
            ComponentKind::Select => "sel",
            ComponentKind::Modal => "mdl",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "btn" => Some(ComponentKind::Button),
            "sel" => Some(ComponentKind::Select),
            "mdl" => Some(ComponentKind::Modal),
            _ => None,
        }
    }

    pub fn from_interaction(kind: InteractionKind) -> Option<Self> {
        match kind {
            InteractionKind::Button => Some(ComponentKind::Button),
            InteractionKind::Select => Some(ComponentKind::Select),
            InteractionKind::Modal => Some(ComponentKind::Modal),
            _ => None,
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// A decoded custom id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopedId {
    pub module: String,
    pub kind: ComponentKind,
    pub local: String,
    /// Small ordered payload, e.g. a record id
    pub extras: Vec<(String, String)>,
}

impl ScopedId {
    pub fn new(module: impl Into<String>, kind: ComponentKind, local: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            kind,
            local: local.into(),
            extras: Vec::new(),
        }
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extras.push((key.into(), value.into()));
        self
    }

    /// Look up an extra by key
    pub fn extra(&self, key: &str) -> Option<&str> {
        self.extras
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn encode(&self) -> Result<String, IdentifierError> {
        encode(&self.module, self.kind, &self.local, &self.extras)
    }
}

fn check_segment(field: &'static str, value: &str) -> Result<(), IdentifierError> {
    if value.is_empty() || value.contains(RESERVED) {
        return Err(IdentifierError::InvalidSegment {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

/// Encode a custom id; deterministic for identical inputs
pub fn encode(
    module: &str,
    kind: ComponentKind,
    local: &str,
    extras: &[(String, String)],
) -> Result<String, IdentifierError> {
    check_segment("module", module)?;
    check_segment("local", local)?;

    let mut out = String::with_capacity(MAX_CUSTOM_ID_LEN);
    out.push_str(module);
    out.push(SEGMENT_DELIM);
    out.push_str(kind.tag());
    out.push(SEGMENT_DELIM);
    out.push_str(local);

    for (i, (key, value)) in extras.iter().enumerate() {
        check_segment("extra key", key)?;
        if value.contains([EXTRAS_DELIM, PAIR_DELIM]) {
            return Err(IdentifierError::InvalidSegment {
                field: "extra value",
                value: value.clone(),
            });
        }
        out.push(if i == 0 { EXTRAS_DELIM } else { PAIR_DELIM });
        out.push_str(key);
        out.push(KV_DELIM);
        out.push_str(value);
    }

    if out.len() > MAX_CUSTOM_ID_LEN {
        return Err(IdentifierError::TooLong {
            len: out.len(),
            max: MAX_CUSTOM_ID_LEN,
        });
    }
    Ok(out)
}

/// Decode a raw custom id
pub fn decode(raw: &str) -> Result<ScopedId, IdentifierError> {
    if raw.len() > MAX_CUSTOM_ID_LEN {
        return Err(IdentifierError::TooLong {
            len: raw.len(),
            max: MAX_CUSTOM_ID_LEN,
        });
    }

    let (head, tail) = match raw.split_once(EXTRAS_DELIM) {
        Some((head, tail)) => (head, Some(tail)),
        None => (raw, None),
    };

    let mut segments = head.split(SEGMENT_DELIM);
    let (Some(module), Some(tag), Some(local), None) =
        (segments.next(), segments.next(), segments.next(), segments.next())
    else {
        return Err(IdentifierError::Malformed(format!("expected 3 segments in {raw:?}")));
    };
    if module.is_empty() || local.is_empty() {
        return Err(IdentifierError::Malformed(format!("empty segment in {raw:?}")));
    }
    let kind = ComponentKind::from_tag(tag)
        .ok_or_else(|| IdentifierError::Malformed(format!("unknown kind tag {tag:?}")))?;

    let mut extras = Vec::new();
    if let Some(tail) = tail {
        for pair in tail.split(PAIR_DELIM) {
            let (key, value) = pair
                .split_once(KV_DELIM)
                .ok_or_else(|| IdentifierError::Malformed(format!("extra {pair:?} has no '='")))?;
            if key.is_empty() || key.contains(RESERVED) {
                return Err(IdentifierError::Malformed(format!("bad extra key {key:?}")));
            }
            if value.contains(EXTRAS_DELIM) {
                return Err(IdentifierError::Malformed(format!("bad extra value {value:?}")));
            }
            extras.push((key.to_string(), value.to_string()));
        }
    }

    Ok(ScopedId {
        module: module.to_string(),
        kind,
        local: local.to_string(),
        extras,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extras(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn round_trips_with_extras() {
        let id = ScopedId::new("tickets", ComponentKind::Button, "close.confirm")
            .with_extra("id", "8812")
            .with_extra("at", "12:30=noon");
        let raw = id.encode().unwrap();
        assert_eq!(raw, "tickets:btn:close.confirm|id=8812;at=12:30=noon");
        assert_eq!(decode(&raw).unwrap(), id);
    }

    #[test]
    fn round_trips_without_extras() {
        for kind in [ComponentKind::Button, ComponentKind::Select, ComponentKind::Modal] {
            let id = ScopedId::new("music", kind, "queue-page");
            assert_eq!(decode(&id.encode().unwrap()).unwrap(), id);
        }
    }

    #[test]
    fn encoding_is_deterministic() {
        let a = encode("m", ComponentKind::Select, "x", &extras(&[("k", "v")])).unwrap();
        let b = encode("m", ComponentKind::Select, "x", &extras(&[("k", "v")])).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_reserved_delimiters_in_names() {
        for bad in ["a:b", "a|b", "a;b", "a=b", ""] {
            let err = encode(bad, ComponentKind::Button, "ok", &[]).unwrap_err();
            assert!(matches!(err, IdentifierError::InvalidSegment { field: "module", .. }));
            let err = encode("ok", ComponentKind::Button, bad, &[]).unwrap_err();
            assert!(matches!(err, IdentifierError::InvalidSegment { field: "local", .. }));
        }
        let err = encode("m", ComponentKind::Button, "l", &extras(&[("k", "a;b")])).unwrap_err();
        assert!(matches!(err, IdentifierError::InvalidSegment { field: "extra value", .. }));
    }

    #[test]
    fn length_limit_is_exact() {
        // "m:btn:" is 6 bytes
        let fits = "x".repeat(MAX_CUSTOM_ID_LEN - 6);
        let raw = encode("m", ComponentKind::Button, &fits, &[]).unwrap();
        assert_eq!(raw.len(), MAX_CUSTOM_ID_LEN);
        assert_eq!(decode(&raw).unwrap().local, fits);

        let over = "x".repeat(MAX_CUSTOM_ID_LEN - 5);
        assert_eq!(
            encode("m", ComponentKind::Button, &over, &[]).unwrap_err(),
            IdentifierError::TooLong {
                len: MAX_CUSTOM_ID_LEN + 1,
                max: MAX_CUSTOM_ID_LEN
            }
        );
    }

    #[test]
    fn extras_count_towards_the_limit() {
        let value = "v".repeat(MAX_CUSTOM_ID_LEN);
        let err = encode("m", ComponentKind::Button, "l", &extras(&[("k", &value)])).unwrap_err();
        assert!(matches!(err, IdentifierError::TooLong { .. }));
    }

    #[test]
    fn rejects_malformed_input() {
        for raw in [
            "no-delimiters",
            "a:btn",
            "a:btn:b:c",
            "a:zzz:b",
            ":btn:b",
            "a:btn:b|novalue",
            "a:btn:b|=v",
            "a:btn:b|k=v|w",
        ] {
            assert!(
                matches!(decode(raw), Err(IdentifierError::Malformed(_))),
                "{raw} should be malformed"
            );
        }
        assert!(matches!(
            decode(&"a".repeat(MAX_CUSTOM_ID_LEN + 1)),
            Err(IdentifierError::TooLong { .. })
        ));
    }
}
