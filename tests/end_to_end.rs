//! End-to-end dispatch through the host with the built-in modules
//! Run with: cargo test --test end_to_end

mod common;

use std::time::Duration;

use common::{click, first_button, user, Sent, TestHost};
use modhost::application::context::ModuleContext;
use modhost::application::errors::HandlerError;
use modhost::application::interactions::middleware::{Cooldown, DeferredReply, TryCatch};
use modhost::application::interactions::{handler, CooldownPolicy, DispatchOutcome, HandlerContext};
use modhost::application::modules::{module_fn, BasicHandle, ModuleHandle};
use modhost::builtin;
use modhost::domain::entities::{Interaction, Reply};
use modhost::infrastructure::modules::ModuleCatalog;

#[tokio::test]
async fn ping_then_details_replies_twice() {
    let t = TestHost::new(&["core", "ping"], builtin::catalog());
    let (errors, _guard) = common::count_errors();
    t.start().await;
    assert_eq!(t.platform.installed(), vec!["help", "ping", "version"]);

    let outcome = t.host.dispatch(Interaction::chat_input("ping", user("ana"))).await;
    assert_eq!(outcome, DispatchOutcome::Handled);
    let sent = t.platform.sent();
    let pong = sent[0].reply().unwrap();
    assert!(pong.content.starts_with("Pong! (1"));
    let message = sent[0].message().unwrap().to_string();
    let custom_id = first_button(pong);
    assert_eq!(custom_id, "ping:btn:ping.details");

    let outcome = t.host.dispatch(click(&message, &custom_id, user("ana"))).await;
    assert_eq!(outcome, DispatchOutcome::Handled);

    let replies = t.platform.replies();
    assert_eq!(replies.len(), 2);
    assert!(replies[1].ephemeral);
    assert!(replies[1].content.starts_with("Ping #1 from ana"));
    assert!(replies.iter().all(|r| !r.content.starts_with("Something went wrong")));
    assert_eq!(errors.get(), 0);
}

#[tokio::test]
async fn ping_counts_per_user_in_store() {
    let t = TestHost::new(&["ping"], builtin::catalog());
    t.start().await;

    for _ in 0..2 {
        t.host.dispatch(Interaction::chat_input("ping", user("ana"))).await;
    }
    t.host.dispatch(Interaction::chat_input("ping", user("ben"))).await;

    let store = &t.host.services().store;
    let ana = store.get(builtin::ping::COLLECTION, "ana").await.unwrap().unwrap();
    assert_eq!(ana["count"], 2);
    let ben = store.get(builtin::ping::COLLECTION, "ben").await.unwrap().unwrap();
    assert_eq!(ben["count"], 1);
}

#[tokio::test]
async fn cooldown_allows_capacity_then_rate_limits() {
    let catalog = ModuleCatalog::new().with(
        "limited",
        module_fn(|ctx: ModuleContext| async move {
            ctx.register_command(
                ctx.command("roll")
                    .description("Roll a die")
                    .middleware(Cooldown::per_user(CooldownPolicy::new(2, 0.0)))
                    .on_execute(handler(|cx: HandlerContext| async move {
                        cx.reply(Reply::new("rolled")).await?;
                        Ok(())
                    })),
            )?;
            Ok(Box::new(BasicHandle::new(ctx.name(), "")) as Box<dyn ModuleHandle>)
        }),
    );
    let t = TestHost::new(&["limited"], catalog);
    t.start().await;

    for _ in 0..3 {
        let outcome = t.host.dispatch(Interaction::chat_input("roll", user("ana"))).await;
        assert_eq!(outcome, DispatchOutcome::Handled);
    }

    let contents: Vec<String> = t.platform.replies().into_iter().map(|r| r.content).collect();
    assert_eq!(contents[0], "rolled");
    assert_eq!(contents[1], "rolled");
    assert!(contents[2].starts_with("Slow down"), "got {:?}", contents[2]);
}

#[tokio::test(start_paused = true)]
async fn expired_session_degrades_to_notice() {
    let t = TestHost::with_config(common::module_tree(&["ping"]), builtin::catalog(), |config| {
        config.sessions.ttl_seconds = 30;
    });
    t.start().await;

    t.host.dispatch(Interaction::chat_input("ping", user("ana"))).await;
    let sent = t.platform.sent();
    let message = sent[0].message().unwrap().to_string();
    let custom_id = first_button(sent[0].reply().unwrap());

    tokio::time::advance(Duration::from_secs(31)).await;
    let outcome = t.host.dispatch(click(&message, &custom_id, user("ana"))).await;
    assert_eq!(outcome, DispatchOutcome::SessionExpired);
    let notice = t.platform.last_reply();
    assert!(notice.ephemeral);
    assert!(notice.content.contains("expired"));
}

#[tokio::test]
async fn click_on_unknown_message_is_session_expired() {
    let t = TestHost::new(&["ping"], builtin::catalog());
    t.start().await;

    let outcome = t
        .host
        .dispatch(click("m404", "ping:btn:ping.details", user("ana")))
        .await;
    assert_eq!(outcome, DispatchOutcome::SessionExpired);
}

#[tokio::test]
async fn malformed_and_foreign_ids_get_benign_notice() {
    let t = TestHost::new(&["ping"], builtin::catalog());
    t.start().await;

    for raw in ["garbage", "ghost:btn:nothing", "ping:sel:ping.details"] {
        let outcome = t.host.dispatch(click("m1", raw, user("ana"))).await;
        assert_eq!(outcome, DispatchOutcome::UnknownAction, "custom id {}", raw);
    }
    let replies = t.platform.replies();
    assert_eq!(replies.len(), 3);
    assert!(replies.iter().all(|r| r.ephemeral && r.content == "This action is no longer available."));
}

#[tokio::test]
async fn help_lists_commands_and_autocompletes() {
    let t = TestHost::new(&["core", "ping"], builtin::catalog());
    t.start().await;

    t.host.dispatch(Interaction::chat_input("help", user("ana"))).await;
    let help = t.platform.last_reply();
    assert!(help.content.contains("/ping - Check that the bot is alive"));
    assert!(help.content.contains("/version"));

    t.host
        .dispatch(Interaction::chat_input("help", user("ana")).with_option("command", "ping"))
        .await;
    assert!(t.platform.last_reply().content.contains("module ping"));

    t.platform.clear();
    t.host
        .dispatch(Interaction::autocomplete("help", "command", "p", user("ana")))
        .await;
    match t.platform.sent().as_slice() {
        [Sent::Autocomplete { choices, .. }] => assert_eq!(choices, &vec!["ping".to_string()]),
        other => panic!("expected one autocomplete answer, got {:?}", other),
    }
}

#[tokio::test]
async fn handler_failure_is_contained_with_one_notice() {
    let catalog = ModuleCatalog::new().with(
        "flaky",
        module_fn(|ctx: ModuleContext| async move {
            ctx.register_command(
                ctx.command("flaky")
                    .description("Always fails")
                    .middleware(TryCatch)
                    .middleware(DeferredReply { ephemeral: true })
                    .on_execute(handler(|_| async { Err(HandlerError::Failed("database down".into())) })),
            )?;
            Ok(Box::new(BasicHandle::new(ctx.name(), "")) as Box<dyn ModuleHandle>)
        }),
    );
    let t = TestHost::new(&["flaky"], catalog);
    let (errors, _guard) = common::count_errors();
    t.start().await;

    let outcome = t.host.dispatch(Interaction::chat_input("flaky", user("ana"))).await;
    // TryCatch swallows the error, so the router sees success
    assert_eq!(outcome, DispatchOutcome::Handled);

    let sent = t.platform.sent();
    assert!(matches!(sent[0], Sent::Defer { .. }));
    assert!(matches!(&sent[1], Sent::Edit { reply, .. } if reply.content.starts_with("Something went wrong")));
    assert_eq!(sent.len(), 2);
    assert!(errors.get() >= 1, "handler failure is logged at error level");
}

#[tokio::test]
async fn slow_handler_does_not_block_other_dispatches() {
    let catalog = ModuleCatalog::new().with(
        "slow",
        module_fn(|ctx: ModuleContext| async move {
            ctx.register_command(ctx.command("slow").description("Takes a while").on_execute(handler(
                |cx: HandlerContext| async move {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    cx.reply(Reply::new("slow done")).await?;
                    Ok(())
                },
            )))?;
            ctx.register_command(ctx.command("fast").description("Instant").on_execute(handler(
                |cx: HandlerContext| async move {
                    cx.reply(Reply::new("fast done")).await?;
                    Ok(())
                },
            )))?;
            Ok(Box::new(BasicHandle::new(ctx.name(), "")) as Box<dyn ModuleHandle>)
        }),
    );
    let t = TestHost::new(&["slow"], catalog);
    t.start().await;

    let slow = t.host.spawn_dispatch(Interaction::chat_input("slow", user("ana")));
    let fast = t.host.spawn_dispatch(Interaction::chat_input("fast", user("ben")));
    assert_eq!(fast.await.unwrap(), DispatchOutcome::Handled);
    assert_eq!(slow.await.unwrap(), DispatchOutcome::Handled);

    let contents: Vec<String> = t.platform.replies().into_iter().map(|r| r.content).collect();
    assert_eq!(contents, vec!["fast done", "slow done"]);
}
