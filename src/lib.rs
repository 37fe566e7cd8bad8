//! modhost - a hot-reloadable module host for slash-command chat bots
//!
//! Feature modules live in folders under a module directory. Each one is
//! loaded into its own namespace, registers commands and component
//! handlers through a [`ModuleContext`](application::context::ModuleContext),
//! and can be unloaded or reloaded at runtime without touching the others.

pub mod application;
pub mod builtin;
pub mod domain;
pub mod host;
pub mod infrastructure;

pub use host::{Host, HostBuilder};

#[cfg(test)]
pub(crate) mod test_support;
