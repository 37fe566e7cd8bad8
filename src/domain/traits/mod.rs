//! Domain traits - Abstractions for infrastructure implementations

pub mod platform;
pub mod store;

pub use platform::{InstallScope, Platform, PlatformInfo};
pub use store::Store;
