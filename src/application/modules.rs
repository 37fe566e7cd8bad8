//! Module contract - what a loadable feature unit exposes to the host

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::application::context::ModuleContext;
use crate::application::errors::ModuleResult;

/// Entry point of a module
///
/// `init` receives a context scoped to this module and generation and
/// returns the handle the loader keeps until unload.
#[async_trait]
pub trait ModuleInit: Send + Sync {
    async fn init(&self, ctx: ModuleContext) -> ModuleResult<Box<dyn ModuleHandle>>;
}

/// Handle returned by a successful init
#[async_trait]
pub trait ModuleHandle: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// Called once after the platform connection is ready
    async fn post_ready(&self) -> ModuleResult<()> {
        Ok(())
    }

    /// Release anything not already covered by the lifecycle tracker
    async fn dispose(&self) -> ModuleResult<()> {
        Ok(())
    }
}

/// Handle with no hooks
#[derive(Debug, Clone)]
pub struct BasicHandle {
    name: String,
    description: String,
}

impl BasicHandle {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

#[async_trait]
impl ModuleHandle for BasicHandle {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }
}

/// [`ModuleInit`] backed by an async closure
pub struct FnModule<F> {
    init: F,
}

#[async_trait]
impl<F, Fut> ModuleInit for FnModule<F>
where
    F: Fn(ModuleContext) -> Fut + Send + Sync,
    Fut: Future<Output = ModuleResult<Box<dyn ModuleHandle>>> + Send,
{
    async fn init(&self, ctx: ModuleContext) -> ModuleResult<Box<dyn ModuleHandle>> {
        (self.init)(ctx).await
    }
}

/// Build a module from an async init closure
pub fn module_fn<F, Fut>(init: F) -> Arc<dyn ModuleInit>
where
    F: Fn(ModuleContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ModuleResult<Box<dyn ModuleHandle>>> + Send + 'static,
{
    Arc::new(FnModule { init })
}
