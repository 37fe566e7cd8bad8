//! Application layer - the module host core
//!
//! This layer contains:
//! - Interactions: custom ids, sessions, middleware and the router
//! - Commands: command builder, registry and installer
//! - Lifecycle: disposers and the event bus
//! - Context: what each module receives at init
//! - Errors: one error type per concern

pub mod commands;
pub mod context;
pub mod errors;
pub mod interactions;
pub mod lifecycle;
pub mod modules;
pub mod services;
