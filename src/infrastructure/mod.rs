//! Infrastructure layer - External concerns
//!
//! This layer contains:
//! - Config: Configuration loading and feature flags
//! - Storage: Document store
//! - Adapters: Platform integrations (console)
//! - Modules: Module loading and hot reload

pub mod adapters;
pub mod config;
pub mod modules;
pub mod storage;
