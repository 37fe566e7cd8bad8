//! Module lifecycle - teardown tracking and event subscriptions

pub mod events;
pub mod tracker;

pub use events::{listener, EventBus, EventListener};
pub use tracker::{DisposeReport, Disposer, LifecycleTracker};
