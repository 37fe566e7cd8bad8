//! Ping module: /ping with a stateful details button
//!
//! Each reply opens a session keyed by its message; the `details` button
//! reads it back. A per-user counter lives in the shared store.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};

use crate::application::context::ModuleContext;
use crate::application::errors::{HandlerError, HandlerResult, ModuleResult};
use crate::application::interactions::middleware::{Cooldown, LoggingMiddleware};
use crate::application::interactions::{handler, CooldownPolicy, HandlerContext};
use crate::application::modules::{module_fn, ModuleHandle, ModuleInit};
use crate::application::services::Services;
use crate::domain::entities::{Component, Reply};

/// Store collection holding per-user ping counts
pub const COLLECTION: &str = "ping";

pub fn module() -> Arc<dyn ModuleInit> {
    module_fn(init)
}

async fn init(ctx: ModuleContext) -> ModuleResult<Box<dyn ModuleHandle>> {
    ctx.register_command(
        ctx.command("ping")
            .description("Check that the bot is alive")
            .middleware(LoggingMiddleware)
            .middleware(Cooldown::per_user(CooldownPolicy::new(5, 0.5)))
            .on_execute(handler(ping))
            .on_stateful_button("details", handler(details)),
    )?;

    Ok(Box::new(PingHandle {
        name: ctx.name().to_string(),
        services: ctx.services().clone(),
    }))
}

struct PingHandle {
    name: String,
    services: Services,
}

#[async_trait]
impl ModuleHandle for PingHandle {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Latency check with a stateful details button"
    }

    async fn post_ready(&self) -> ModuleResult<()> {
        let counters = self.services.store.list(COLLECTION).await.map(|c| c.len()).unwrap_or(0);
        tracing::info!(module = %self.name, users = counters, "Ping ready on {}", self.services.platform.info().name);
        Ok(())
    }
}

async fn ping(cx: HandlerContext) -> HandlerResult {
    let user = cx.interaction().user.id.clone();
    let store = &cx.services().store;
    let count = store
        .get(COLLECTION, &user)
        .await?
        .and_then(|doc| doc.get("count").and_then(Value::as_u64))
        .unwrap_or(0)
        + 1;
    store.upsert(COLLECTION, &user, json!({ "count": count })).await?;

    let button = Component::button(cx.button_id("details").map_err(HandlerError::other)?, "Details");
    cx.reply(Reply::new(format!("Pong! ({} so far)", count)).with_component(button))
        .await?;

    let session = cx.session();
    session.set("sent_at", Utc::now().to_rfc3339());
    session.set("count", count);
    Ok(())
}

async fn details(cx: HandlerContext) -> HandlerResult {
    let session = cx.session();
    let sent_at = session
        .field("sent_at")
        .and_then(|v| v.as_str().map(str::to_string))
        .ok_or(HandlerError::SessionExpired)?;
    let count = session.field("count").and_then(|v| v.as_u64()).unwrap_or(0);

    cx.reply(Reply::ephemeral(format!(
        "Ping #{} from {} was sent at {}",
        count,
        cx.interaction().user.display_name(),
        sent_at
    )))
    .await?;
    Ok(())
}
