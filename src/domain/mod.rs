//! Domain layer - Plain data and the boundaries the core talks through
//! 
//! This layer contains:
//! - Entities: Command definitions, interactions, replies, users
//! - Traits: Abstractions for external collaborators (Platform, Store)

pub mod entities;
pub mod traits;
