//! Ephemeral per-message session state
//!
//! Sessions bridge a command's reply and later component clicks on the same
//! message. They are process-local and vanish on restart, TTL expiry, an
//! explicit save/cancel, or when the owning module unloads.

use dashmap::DashMap;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Default time a session stays alive after its last write
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(15 * 60);

/// Message-scoped key/value state
#[derive(Debug, Clone)]
pub struct Session {
    pub key: String,
    pub module: String,
    pub fields: Map<String, Value>,
    pub created_at: Instant,
    pub expires_at: Option<Instant>,
}

impl Session {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// Store of live sessions keyed by message id
pub struct SessionStore {
    sessions: DashMap<String, Session>,
    ttl: Option<Duration>,
}

impl SessionStore {
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl,
        }
    }

    fn expiry(&self, now: Instant) -> Option<Instant> {
        self.ttl.map(|ttl| now + ttl)
    }

    /// Create or replace the session for `key`
    pub fn insert(&self, key: impl Into<String>, module: impl Into<String>, fields: Map<String, Value>) {
        let key = key.into();
        let now = Instant::now();
        let session = Session {
            key: key.clone(),
            module: module.into(),
            fields,
            created_at: now,
            expires_at: self.expiry(now),
        };
        self.sessions.insert(key, session);
    }

    /// Fetch a live session; expired sessions are dropped on read
    pub fn get(&self, key: &str) -> Option<Session> {
        let now = Instant::now();
        let expired = match self.sessions.get(key) {
            Some(entry) if !entry.is_expired(now) => return Some(entry.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.sessions.remove_if(key, |_, s| s.is_expired(now));
        }
        None
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Mutate a live session in place and refresh its expiry
    pub fn update<F, R>(&self, key: &str, f: F) -> Option<R>
    where
        F: FnOnce(&mut Map<String, Value>) -> R,
    {
        let now = Instant::now();
        let mut entry = self.sessions.get_mut(key)?;
        if entry.is_expired(now) {
            drop(entry);
            self.sessions.remove_if(key, |_, s| s.is_expired(now));
            return None;
        }
        let result = f(&mut entry.fields);
        entry.expires_at = self.expiry(now);
        Some(result)
    }

    /// Write one field, creating the session on first write
    pub fn set_field(&self, key: &str, module: &str, field: impl Into<String>, value: Value) {
        let field = field.into();
        let updated = self.update(key, |fields| {
            fields.insert(field.clone(), value.clone());
        });
        if updated.is_none() {
            let mut fields = Map::new();
            fields.insert(field, value);
            self.insert(key, module, fields);
        }
    }

    /// Explicitly end a session (save or cancel)
    pub fn remove(&self, key: &str) -> Option<Session> {
        self.sessions.remove(key).map(|(_, s)| s)
    }

    /// Drop every session owned by `module`; returns how many were removed
    pub fn remove_module(&self, module: &str) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, s| s.module != module);
        before.saturating_sub(self.sessions.len())
    }

    /// Drop expired sessions; returns how many were removed
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.sessions.len();
        self.sessions.retain(|_, s| !s.is_expired(now));
        before.saturating_sub(self.sessions.len())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(Some(DEFAULT_SESSION_TTL))
    }
}

/// Session access bound to one interaction
///
/// For component interactions the key is the clicked message. For command
/// executions it stays unbound until the first reply creates a message.
#[derive(Clone)]
pub struct SessionHandle {
    store: Arc<SessionStore>,
    module: String,
    key: Arc<std::sync::Mutex<Option<String>>>,
}

impl SessionHandle {
    pub fn new(store: Arc<SessionStore>, module: impl Into<String>, key: Option<String>) -> Self {
        Self {
            store,
            module: module.into(),
            key: Arc::new(std::sync::Mutex::new(key)),
        }
    }

    pub fn key(&self) -> Option<String> {
        self.key.lock().map(|k| k.clone()).unwrap_or_else(|e| e.into_inner().clone())
    }

    /// Bind to a message id if not already bound
    pub fn bind(&self, message_id: &str) {
        let mut key = self.key.lock().unwrap_or_else(|e| e.into_inner());
        if key.is_none() {
            *key = Some(message_id.to_string());
        }
    }

    pub fn get(&self) -> Option<Session> {
        self.key().and_then(|key| self.store.get(&key))
    }

    pub fn field(&self, name: &str) -> Option<Value> {
        self.get().and_then(|s| s.fields.get(name).cloned())
    }

    /// Write a field; returns false when no message is bound yet
    pub fn set(&self, name: impl Into<String>, value: impl Into<Value>) -> bool {
        match self.key() {
            Some(key) => {
                self.store.set_field(&key, &self.module, name, value.into());
                true
            }
            None => false,
        }
    }

    /// End the session (save or cancel)
    pub fn clear(&self) -> Option<Session> {
        self.key().and_then(|key| self.store.remove(&key))
    }
}
