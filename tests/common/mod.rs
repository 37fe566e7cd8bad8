//! Shared fixtures: a recording platform and temporary module trees

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;

use modhost::application::errors::PlatformError;
use modhost::domain::entities::{CommandDefinition, Component, Interaction, InteractionKind, OptionChoice, Reply, User};
use modhost::domain::traits::{InstallScope, Platform, PlatformInfo};
use modhost::infrastructure::config::{Config, FeatureFlags};
use modhost::infrastructure::modules::{ModuleCatalog, MANIFEST_FILE};
use modhost::Host;

static INIT: Once = Once::new();

pub fn ensure_init() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Counts ERROR events seen on the current thread
#[derive(Clone, Default)]
pub struct ErrorCount(Arc<AtomicU64>);

impl ErrorCount {
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

impl<S: tracing::Subscriber> Layer<S> for ErrorCount {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == tracing::Level::ERROR {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Install an error-counting subscriber for this thread until the guard drops
///
/// Tests using it run on the current-thread runtime, so spawned tasks
/// report to it as well.
pub fn count_errors() -> (ErrorCount, tracing::subscriber::DefaultGuard) {
    let count = ErrorCount::default();
    let subscriber = tracing_subscriber::registry().with(count.clone());
    (count, tracing::subscriber::set_default(subscriber))
}

/// One call the host made into the platform
#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Defer { interaction: String },
    Respond { interaction: String, message: String, reply: Reply },
    Edit { interaction: String, message: String, reply: Reply },
    FollowUp { interaction: String, message: String, reply: Reply },
    Autocomplete { interaction: String, choices: Vec<String> },
}

impl Sent {
    pub fn reply(&self) -> Option<&Reply> {
        match self {
            Sent::Respond { reply, .. } | Sent::Edit { reply, .. } | Sent::FollowUp { reply, .. } => Some(reply),
            _ => None,
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Sent::Respond { message, .. } | Sent::Edit { message, .. } | Sent::FollowUp { message, .. } => {
                Some(message)
            }
            _ => None,
        }
    }
}

/// Platform double that records every call
#[derive(Default)]
pub struct RecordingPlatform {
    ready: AtomicBool,
    fail_install: AtomicBool,
    next_message: AtomicU64,
    sent: Mutex<Vec<Sent>>,
    installs: Mutex<Vec<(InstallScope, Vec<String>)>>,
}

impl RecordingPlatform {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    pub fn fail_installs(&self, fail: bool) {
        self.fail_install.store(fail, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn replies(&self) -> Vec<Reply> {
        self.sent().iter().filter_map(|s| s.reply().cloned()).collect()
    }

    pub fn last_reply(&self) -> Reply {
        self.replies().pop().expect("no reply sent")
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }

    pub fn installs(&self) -> Vec<(InstallScope, Vec<String>)> {
        self.installs.lock().unwrap().clone()
    }

    /// Command names of the most recent install
    pub fn installed(&self) -> Vec<String> {
        let mut names = self.installs().pop().map(|(_, n)| n).unwrap_or_default();
        names.sort();
        names
    }

    fn message_id(&self) -> String {
        format!("m{}", self.next_message.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn push(&self, sent: Sent) {
        self.sent.lock().unwrap().push(sent);
    }
}

#[async_trait]
impl Platform for RecordingPlatform {
    async fn defer(&self, interaction_id: &str, _ephemeral: bool) -> Result<(), PlatformError> {
        self.push(Sent::Defer {
            interaction: interaction_id.to_string(),
        });
        Ok(())
    }

    async fn respond(&self, interaction_id: &str, reply: &Reply) -> Result<String, PlatformError> {
        let message = self.message_id();
        self.push(Sent::Respond {
            interaction: interaction_id.to_string(),
            message: message.clone(),
            reply: reply.clone(),
        });
        Ok(message)
    }

    async fn edit_original(&self, interaction_id: &str, reply: &Reply) -> Result<String, PlatformError> {
        let message = self.message_id();
        self.push(Sent::Edit {
            interaction: interaction_id.to_string(),
            message: message.clone(),
            reply: reply.clone(),
        });
        Ok(message)
    }

    async fn follow_up(&self, interaction_id: &str, reply: &Reply) -> Result<String, PlatformError> {
        let message = self.message_id();
        self.push(Sent::FollowUp {
            interaction: interaction_id.to_string(),
            message: message.clone(),
            reply: reply.clone(),
        });
        Ok(message)
    }

    async fn autocomplete(&self, interaction_id: &str, choices: &[OptionChoice]) -> Result<(), PlatformError> {
        self.push(Sent::Autocomplete {
            interaction: interaction_id.to_string(),
            choices: choices.iter().map(|c| c.name.clone()).collect(),
        });
        Ok(())
    }

    async fn bulk_overwrite_commands(
        &self,
        scope: &InstallScope,
        commands: &[CommandDefinition],
    ) -> Result<usize, PlatformError> {
        if self.fail_install.load(Ordering::SeqCst) {
            return Err(PlatformError::RateLimited {
                retry_after: Duration::from_secs(1),
            });
        }
        let names = commands.iter().map(|c| c.name.clone()).collect();
        self.installs.lock().unwrap().push((scope.clone(), names));
        Ok(commands.len())
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn info(&self) -> PlatformInfo {
        PlatformInfo {
            name: "recording".to_string(),
            application_id: "test-app".to_string(),
        }
    }
}

/// Write `<root>/<module>/module.yaml` pointing at catalog entry `entry`
pub fn write_manifest(root: &Path, module: &str, entry: &str) {
    let dir = root.join(module);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join(MANIFEST_FILE), format!("entry: {}\n", entry)).unwrap();
}

/// A module tree where each folder's manifest names the catalog entry of the same name
pub fn module_tree(modules: &[&str]) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    for module in modules {
        write_manifest(dir.path(), module, module);
    }
    dir
}

pub fn config_for(dir: &Path) -> Config {
    let mut config = Config::default();
    config.modules.directory = dir.to_path_buf();
    config.modules.shadow_directory = dir.join(".shadow");
    config.modules.watch = false;
    config
}

/// A host over a temporary module tree, isolated from the process environment
pub struct TestHost {
    pub host: Host,
    pub platform: Arc<RecordingPlatform>,
    pub flags: Arc<FeatureFlags>,
    pub dir: TempDir,
}

impl TestHost {
    pub fn new(modules: &[&str], catalog: ModuleCatalog) -> Self {
        Self::with_config(module_tree(modules), catalog, |_| {})
    }

    pub fn with_config(dir: TempDir, catalog: ModuleCatalog, tweak: impl FnOnce(&mut Config)) -> Self {
        ensure_init();
        let platform = RecordingPlatform::new();
        let flags = Arc::new(FeatureFlags::isolated());
        let mut config = config_for(dir.path());
        tweak(&mut config);
        let host = Host::builder(config, platform.clone())
            .catalog(catalog)
            .flags(Arc::clone(&flags))
            .build()
            .unwrap();
        Self {
            host,
            platform,
            flags,
            dir,
        }
    }

    /// Load everything, install, then mark the platform ready
    pub async fn start(&self) {
        self.host.start().await.unwrap();
        self.platform.set_ready(true);
        self.host.ready().await;
    }
}

pub fn user(id: &str) -> User {
    User::new(id).with_username(id)
}

/// Custom id of the first button on a reply
pub fn first_button(reply: &Reply) -> String {
    match reply.components.first() {
        Some(Component::Button { custom_id, .. }) => custom_id.clone(),
        other => panic!("expected a button, got {:?}", other),
    }
}

pub fn click(message_id: &str, custom_id: &str, user: User) -> Interaction {
    Interaction::component(InteractionKind::Button, message_id, custom_id, user)
}
