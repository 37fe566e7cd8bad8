//! Loader lifecycle: flags, failures, reload isolation and teardown
//! Run with: cargo test --test module_lifecycle

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{user, write_manifest, TestHost};
use modhost::application::context::ModuleContext;
use modhost::application::errors::{ModuleError, ModuleResult, RegistryError};
use modhost::application::interactions::{handler, DispatchOutcome, HandlerContext};
use modhost::application::lifecycle::listener;
use modhost::application::modules::{module_fn, BasicHandle, ModuleHandle, ModuleInit};
use modhost::builtin;
use modhost::domain::entities::{Interaction, Reply};
use modhost::domain::traits::InstallScope;
use modhost::infrastructure::modules::{LoadOutcome, ModuleCatalog, ModuleState};

/// Module whose `/<name>` command replies with the generation that registered it
fn echo_generation(command: &'static str) -> Arc<dyn ModuleInit> {
    module_fn(move |ctx: ModuleContext| async move {
        let generation = ctx.generation();
        let module = ctx.name().to_string();
        ctx.register_command(ctx.command(command).description("Echo generation").on_execute(handler(
            move |cx: HandlerContext| {
                let module = module.clone();
                async move {
                    cx.reply(Reply::new(format!("{} gen {}", module, generation))).await?;
                    Ok(())
                }
            },
        )))?;
        Ok(Box::new(BasicHandle::new(ctx.name(), "")) as Box<dyn ModuleHandle>)
    })
}

#[tokio::test]
async fn disabled_module_is_absent_until_reenabled() {
    let t = TestHost::new(&["core", "ping"], builtin::catalog());
    t.flags.set("MODULE_PING_ENABLED", "false");
    t.start().await;

    assert!(!t.host.manager().is_loaded("ping"));
    assert_eq!(t.platform.installed(), vec!["help", "version"]);

    let platform = Arc::clone(&t.host.services().platform);
    t.host.registry().install_global(platform.as_ref()).await.unwrap();
    assert!(!t.platform.installed().contains(&"ping".to_string()));

    t.flags.set("MODULE_PING_ENABLED", "yes");
    let outcome = t.host.manager().reload("ping").await.unwrap();
    assert!(matches!(outcome, LoadOutcome::Loaded { .. }));
    t.host.registry().install_global(platform.as_ref()).await.unwrap();
    assert_eq!(t.platform.installed(), vec!["help", "ping", "version"]);
    assert_eq!(t.platform.installs().last().unwrap().0, InstallScope::Global);
}

#[tokio::test]
async fn unrecognised_flag_value_falls_back_to_enabled() {
    let t = TestHost::new(&["ping"], builtin::catalog());
    t.flags.set("MODULE_PING_ENABLED", "maybe");
    t.start().await;
    assert!(t.host.manager().is_loaded("ping"));
}

#[tokio::test]
async fn unload_is_idempotent() {
    let t = TestHost::new(&["ping"], builtin::catalog());
    t.start().await;

    assert!(t.host.manager().unload("ping").await.unwrap());
    assert!(!t.host.manager().unload("ping").await.unwrap());
    assert!(!t.host.manager().unload("never-existed").await.unwrap());
    assert_eq!(t.host.manager().state("ping"), ModuleState::Unloaded);
    assert!(!t.host.registry().contains("ping"));
}

/// `shop` module with a `buy` button that records which generation answered
fn shop(hits: Arc<std::sync::Mutex<Vec<u64>>>) -> Arc<dyn ModuleInit> {
    module_fn(move |ctx: ModuleContext| {
        let hits = Arc::clone(&hits);
        async move {
            let generation = ctx.generation();
            let disposer = ctx.register_button(
                ctx.name(),
                "buy",
                handler(move |cx: HandlerContext| {
                    let hits = Arc::clone(&hits);
                    async move {
                        hits.lock().unwrap().push(generation);
                        cx.reply(Reply::new(format!("gen {}", generation))).await?;
                        Ok(())
                    }
                }),
            )?;
            ctx.track(disposer);
            Ok(Box::new(BasicHandle::new(ctx.name(), "")) as Box<dyn ModuleHandle>)
        }
    })
}

#[tokio::test]
async fn component_clicks_follow_reload_and_stop_after_unload() {
    let hits = Arc::new(std::sync::Mutex::new(Vec::new()));
    let catalog = ModuleCatalog::new().with("shop", shop(Arc::clone(&hits)));
    let t = TestHost::new(&["shop"], catalog);
    t.start().await;
    let first = t.host.manager().info("shop").unwrap().generation;

    t.host.manager().reload("shop").await.unwrap();
    let second = t.host.manager().info("shop").unwrap().generation;

    let outcome = t.host.dispatch(common::click("m1", "shop:btn:buy", user("ana"))).await;
    assert_eq!(outcome, DispatchOutcome::Handled);
    assert_eq!(t.platform.last_reply().content, format!("gen {}", second));

    t.host.manager().unload("shop").await.unwrap();
    let outcome = t.host.dispatch(common::click("m1", "shop:btn:buy", user("ana"))).await;
    assert_eq!(outcome, DispatchOutcome::UnknownAction);

    let hits = hits.lock().unwrap().clone();
    assert_eq!(hits, vec![second]);
    assert!(!hits.contains(&first));
}

#[tokio::test]
async fn second_load_is_rejected() {
    let t = TestHost::new(&["ping"], builtin::catalog());
    t.start().await;

    let err = t.host.manager().load("ping").await.unwrap_err();
    assert!(matches!(err, ModuleError::AlreadyLoaded(name) if name == "ping"));
    assert_eq!(t.host.manager().loaded().len(), 1);
}

#[tokio::test]
async fn reload_routes_only_to_new_generation() {
    let catalog = ModuleCatalog::new().with("echo", echo_generation("echo"));
    let t = TestHost::new(&["echo"], catalog);
    t.start().await;

    let first = t.host.manager().info("echo").unwrap().generation;
    t.host.dispatch(Interaction::chat_input("echo", user("ana"))).await;
    assert_eq!(t.platform.last_reply().content, format!("echo gen {}", first));

    t.host.manager().reload("echo").await.unwrap();
    let second = t.host.manager().info("echo").unwrap().generation;
    assert!(second > first);
    t.host.dispatch(Interaction::chat_input("echo", user("ana"))).await;
    assert_eq!(t.platform.last_reply().content, format!("echo gen {}", second));

    t.host.manager().unload("echo").await.unwrap();
    let outcome = t.host.dispatch(Interaction::chat_input("echo", user("ana"))).await;
    assert_eq!(outcome, DispatchOutcome::UnknownAction);
}

#[tokio::test]
async fn same_command_from_two_modules_last_writer_wins() {
    let catalog = ModuleCatalog::new()
        .with("alpha", echo_generation("shared"))
        .with("beta", echo_generation("shared"));
    let t = TestHost::new(&["alpha", "beta"], catalog);
    t.start().await;

    // load_all goes in name order, so beta registered last
    t.host.dispatch(Interaction::chat_input("shared", user("ana"))).await;
    assert!(t.platform.last_reply().content.starts_with("beta"));
    assert_eq!(t.host.registry().definition("shared").unwrap().module, "beta");
    assert_eq!(t.platform.installed(), vec!["shared"]);
}

async fn half_registered(ctx: ModuleContext) -> ModuleResult<Box<dyn ModuleHandle>> {
    ctx.register_command(
        ctx.command("half")
            .description("Registered before failing")
            .on_execute(handler(|_| async { Ok(()) })),
    )?;
    ctx.interval("never", Duration::from_millis(10), || async {});
    Err(ModuleError::Init("database unreachable".to_string()))
}

async fn panicking(_ctx: ModuleContext) -> ModuleResult<Box<dyn ModuleHandle>> {
    panic!("init exploded");
}

#[tokio::test]
async fn load_failures_are_isolated_and_rolled_back() {
    let catalog = builtin::catalog()
        .with("half", module_fn(half_registered))
        .with("boom", module_fn(panicking));
    let dir = common::module_tree(&["half", "boom", "ping"]);
    std::fs::create_dir_all(dir.path().join("empty")).unwrap();
    write_manifest(dir.path(), "ghost", "no-such-entry");
    let t = TestHost::with_config(dir, catalog, |_| {});

    let summary = t.host.start().await.unwrap();
    assert_eq!(summary.loaded, vec!["ping"]);

    let failed: Vec<(&str, &ModuleError)> = summary.failed.iter().map(|(n, e)| (n.as_str(), e)).collect();
    assert_eq!(failed.len(), 4);
    for (name, error) in failed {
        match name {
            "boom" => assert!(matches!(error, ModuleError::Init(msg) if msg.contains("init exploded"))),
            "empty" => assert!(matches!(error, ModuleError::MissingEntry(_))),
            "ghost" => assert!(matches!(error, ModuleError::UnknownEntry(e) if e == "no-such-entry")),
            "half" => assert!(matches!(error, ModuleError::Init(_))),
            other => panic!("unexpected failure for {}", other),
        }
    }

    assert!(!t.host.registry().contains("half"));
    assert!(!t.host.manager().is_loaded("half"));
    assert_eq!(t.host.manager().state("half"), ModuleState::Unloaded);
    assert_eq!(t.platform.installed(), vec!["ping"]);
}

#[tokio::test]
async fn missing_folder_is_not_found() {
    let t = TestHost::new(&[], builtin::catalog());
    let err = t.host.manager().load("nowhere").await.unwrap_err();
    assert!(matches!(err, ModuleError::NotFound(_)));
}

/// Counts hook calls and ticks a timer until unloaded
struct Probe {
    ready: Arc<AtomicUsize>,
    disposed: Arc<AtomicUsize>,
}

#[async_trait]
impl ModuleHandle for Probe {
    fn name(&self) -> &str {
        "probe"
    }

    async fn post_ready(&self) -> ModuleResult<()> {
        self.ready.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn dispose(&self) -> ModuleResult<()> {
        self.disposed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Clone, Default)]
struct Counters {
    ready: Arc<AtomicUsize>,
    disposed: Arc<AtomicUsize>,
    ticks: Arc<AtomicUsize>,
    events: Arc<AtomicUsize>,
}

fn probe_module(counters: Counters) -> Arc<dyn ModuleInit> {
    module_fn(move |ctx: ModuleContext| {
        let counters = counters.clone();
        async move {
            let ticks = Arc::clone(&counters.ticks);
            ctx.interval("tick", Duration::from_secs(1), move || {
                let ticks = Arc::clone(&ticks);
                async move {
                    ticks.fetch_add(1, Ordering::SeqCst);
                }
            });
            let events = Arc::clone(&counters.events);
            let subscription = ctx.on(
                ctx.name(),
                "ready",
                listener(move |_payload| {
                    let events = Arc::clone(&events);
                    async move {
                        events.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                }),
            );
            ctx.track(subscription);
            Ok(Box::new(Probe {
                ready: Arc::clone(&counters.ready),
                disposed: Arc::clone(&counters.disposed),
            }) as Box<dyn ModuleHandle>)
        }
    })
}

#[tokio::test(start_paused = true)]
async fn unload_cancels_timers_and_runs_dispose() {
    let counters = Counters::default();
    let catalog = ModuleCatalog::new().with("probe", probe_module(counters.clone()));
    let t = TestHost::new(&["probe"], catalog);
    t.start().await;

    assert_eq!(counters.ready.load(Ordering::SeqCst), 1);
    assert_eq!(counters.events.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert_eq!(counters.ticks.load(Ordering::SeqCst), 2);

    t.host.manager().unload("probe").await.unwrap();
    assert_eq!(counters.disposed.load(Ordering::SeqCst), 1);
    assert_eq!(t.host.events().listener_count("ready"), 0);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(counters.ticks.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn post_ready_runs_on_load_after_connect() {
    let counters = Counters::default();
    let catalog = ModuleCatalog::new().with("probe", probe_module(counters.clone()));
    let t = TestHost::new(&["probe"], catalog);
    t.start().await;
    assert_eq!(counters.ready.load(Ordering::SeqCst), 1);

    // A second ready pass must not repeat the hook
    t.host.manager().post_ready_all().await;
    assert_eq!(counters.ready.load(Ordering::SeqCst), 1);

    t.host.manager().reload("probe").await.unwrap();
    assert_eq!(counters.ready.load(Ordering::SeqCst), 2);
    assert_eq!(counters.disposed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn install_failure_keeps_registry_state() {
    let t = TestHost::new(&["ping"], builtin::catalog());
    t.platform.fail_installs(true);

    let summary = t.host.start().await.unwrap();
    assert_eq!(summary.loaded, vec!["ping"]);
    assert!(matches!(summary.install, Some(Err(RegistryError::Install(_)))));
    assert!(t.platform.installs().is_empty());
    assert!(t.host.registry().contains("ping"));
    assert!(t.host.registry().last_install().is_none());

    t.platform.fail_installs(false);
    assert_eq!(t.host.manager().install().await.unwrap(), 1);
    assert_eq!(t.host.registry().last_install().unwrap().commands, vec!["ping"]);
}

#[tokio::test]
async fn guild_scope_installs_to_guild() {
    let t = TestHost::with_config(common::module_tree(&["ping"]), builtin::catalog(), |config| {
        config.install.scope = modhost::infrastructure::config::ScopeKind::Guild;
        config.install.guild_id = Some("1234".to_string());
    });
    t.start().await;
    assert_eq!(t.platform.installs()[0].0, InstallScope::Guild("1234".to_string()));
}

#[tokio::test]
async fn shutdown_unloads_everything() {
    let t = TestHost::new(&["core", "ping"], builtin::catalog());
    t.start().await;
    assert_eq!(t.host.shutdown().await, 2);
    assert!(t.host.manager().loaded().is_empty());
    assert!(t.host.registry().definitions().is_empty());
}
