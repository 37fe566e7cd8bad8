//! Module-scoped event subscriptions

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde_json::Value;

use super::tracker::{panic_message, Disposer};
use crate::application::errors::HandlerResult;

/// Boxed future returned by event listeners
pub type EventFuture = Pin<Box<dyn Future<Output = HandlerResult> + Send + 'static>>;

/// Event listener function type
pub type EventListener = Arc<dyn Fn(Value) -> EventFuture + Send + Sync>;

/// Wrap an async closure as an [`EventListener`]
pub fn listener<F, Fut>(f: F) -> EventListener
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(move |payload| Box::pin(f(payload)))
}

struct Subscription {
    id: u64,
    module: String,
    once: bool,
    listener: EventListener,
}

/// Event bus shared by all modules
pub struct EventBus {
    subscriptions: Arc<RwLock<HashMap<String, Vec<Subscription>>>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscriptions: Arc::new(RwLock::new(HashMap::new())),
            next_id: AtomicU64::new(1),
        }
    }

    fn subscribe(&self, module: &str, event: &str, once: bool, listener: EventListener) -> Disposer {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        {
            let mut subs = self.subscriptions.write().unwrap_or_else(|e| e.into_inner());
            subs.entry(event.to_string()).or_default().push(Subscription {
                id,
                module: module.to_string(),
                once,
                listener,
            });
        }

        let subscriptions = Arc::clone(&self.subscriptions);
        let event = event.to_string();
        Disposer::new(format!("event:{}#{}", event, id), move || {
            let mut subs = subscriptions.write().unwrap_or_else(|e| e.into_inner());
            if let Some(list) = subs.get_mut(&event) {
                list.retain(|s| s.id != id);
            }
        })
    }

    /// Subscribe for every emission of `event`
    pub fn on(&self, module: &str, event: &str, listener: EventListener) -> Disposer {
        self.subscribe(module, event, false, listener)
    }

    /// Subscribe for the next emission of `event` only
    pub fn once(&self, module: &str, event: &str, listener: EventListener) -> Disposer {
        self.subscribe(module, event, true, listener)
    }

    /// Drop every subscription owned by `module`
    pub fn remove_module(&self, module: &str) -> usize {
        let mut subs = self.subscriptions.write().unwrap_or_else(|e| e.into_inner());
        let mut removed = 0;
        for list in subs.values_mut() {
            let before = list.len();
            list.retain(|s| s.module != module);
            removed += before - list.len();
        }
        removed
    }

    /// Deliver `payload` to all listeners of `event`, in subscription order
    ///
    /// Listener errors and panics are logged; returns the number of listeners invoked.
    pub async fn emit(&self, event: &str, payload: Value) -> usize {
        let targets: Vec<(String, EventListener)> = {
            let mut subs = self.subscriptions.write().unwrap_or_else(|e| e.into_inner());
            let Some(list) = subs.get_mut(event) else {
                return 0;
            };
            let targets = list
                .iter()
                .map(|s| (s.module.clone(), Arc::clone(&s.listener)))
                .collect();
            list.retain(|s| !s.once);
            targets
        };

        let count = targets.len();
        for (module, listener) in targets {
            match tokio::spawn(listener(payload.clone())).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(module = %module, event, "Event listener failed: {}", e),
                Err(e) if e.is_panic() => {
                    tracing::warn!(module = %module, event, "Event listener panicked: {}", panic_message(&*e.into_panic()))
                }
                Err(e) => tracing::warn!(module = %module, event, "Event listener cancelled: {}", e),
            }
        }
        count
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.subscriptions
            .read()
            .map(|s| s.get(event).map(Vec::len).unwrap_or(0))
            .unwrap_or(0)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
