//! Shared services passed to every module through its context

pub mod localizer;

use std::sync::Arc;

pub use localizer::{Localizer, StaticLocalizer};

use crate::application::interactions::cooldown::CooldownBuckets;
use crate::domain::traits::{Platform, Store};

/// Pass-through handles to the host's external collaborators
#[derive(Clone)]
pub struct Services {
    pub platform: Arc<dyn Platform>,
    pub store: Arc<dyn Store>,
    pub http: reqwest::Client,
    pub localizer: Arc<dyn Localizer>,
    pub cooldowns: Arc<CooldownBuckets>,
}

impl Services {
    pub fn new(platform: Arc<dyn Platform>, store: Arc<dyn Store>) -> Self {
        Self {
            platform,
            store,
            http: reqwest::Client::new(),
            localizer: Arc::new(StaticLocalizer::default()),
            cooldowns: Arc::new(CooldownBuckets::new()),
        }
    }

    pub fn with_localizer(mut self, localizer: Arc<dyn Localizer>) -> Self {
        self.localizer = localizer;
        self
    }
}
