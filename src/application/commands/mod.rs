//! Commands - fluent builder and the registry/installer

pub mod builder;
pub mod registry;

pub use builder::CommandBuilder;
pub use registry::{CommandRegistry, InstallRecord, PendingBinding, Removed, ResolvedBinding};
