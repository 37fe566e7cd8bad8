//! Middleware chain - composable handler wrappers
//!
//! Every wrapper takes a [`Handler`] and returns a handler of the same shape.
//! In a [`MiddlewareChain`] the first layer added is the outermost; the
//! handler itself is innermost.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::cooldown::CooldownPolicy;
use super::handler::{AckState, Handler, HandlerContext};
use crate::application::errors::HandlerError;
use crate::application::lifecycle::tracker::panic_message;
use crate::application::services::localizer;
use crate::domain::entities::{InteractionKind, Permission, Reply};

/// Middleware trait - wraps a handler with a cross-cutting policy
pub trait Middleware: Send + Sync {
    fn name(&self) -> &str;

    fn wrap(&self, inner: Handler) -> Handler;
}

/// Middleware chain builder
#[derive(Clone, Default)]
pub struct MiddlewareChain {
    layers: Vec<Arc<dyn Middleware>>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self { layers: Vec::new() }
    }

    /// Add a layer inside the ones already added
    pub fn add<M: Middleware + 'static>(mut self, middleware: M) -> Self {
        self.layers.push(Arc::new(middleware));
        self
    }

    pub fn push(&mut self, middleware: Arc<dyn Middleware>) {
        self.layers.push(middleware);
    }

    pub fn names(&self) -> Vec<&str> {
        self.layers.iter().map(|m| m.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Wrap `handler` so the first layer runs first
    pub fn wrap(&self, handler: Handler) -> Handler {
        self.layers
            .iter()
            .rev()
            .fold(handler, |inner, layer| layer.wrap(inner))
    }
}

/// Run a handler on its own task so panics surface as errors
async fn run_contained(inner: &Handler, cx: HandlerContext) -> Result<(), HandlerError> {
    match tokio::spawn(inner(cx)).await {
        Ok(result) => result,
        Err(e) if e.is_panic() => Err(HandlerError::Panicked(panic_message(&*e.into_panic()))),
        Err(e) => Err(HandlerError::Failed(e.to_string())),
    }
}

/// Run `inner`, logging any failure with correlation context and, when the
/// user has not seen a reply yet, sending a failure notice. Returns the
/// contained error, if any.
pub(crate) async fn run_and_contain(inner: &Handler, cx: HandlerContext) -> Option<HandlerError> {
    let err = run_contained(inner, cx.clone()).await.err()?;

    let interaction = cx.interaction();
    tracing::error!(
        module = cx.module(),
        command = %interaction.command_path(),
        user = %interaction.user.id,
        interaction = %interaction.id,
        kind = interaction.kind.as_str(),
        "Handler failed: {}",
        err
    );

    if cx.responder().state().await != AckState::Replied {
        let sent = if interaction.kind == InteractionKind::Autocomplete {
            cx.responder().autocomplete(&[]).await
        } else {
            let key = match err {
                HandlerError::SessionExpired => localizer::SESSION_EXPIRED,
                _ => localizer::GENERIC_FAILURE,
            };
            cx.responder().reply(&Reply::ephemeral(cx.text(key, &[]))).await.map(|_| ())
        };
        if let Err(e) = sent {
            tracing::warn!(interaction = %interaction.id, "Failed to send failure notice: {}", e);
        }
    }
    Some(err)
}

/// Contain errors and panics: log with correlation context and, when the user
/// has not seen a reply yet, send a generic failure notice. Never rethrows.
pub fn with_try_catch(inner: Handler) -> Handler {
    Arc::new(move |cx: HandlerContext| {
        let inner = Arc::clone(&inner);
        Box::pin(async move {
            run_and_contain(&inner, cx).await;
            Ok(())
        })
    })
}

/// Acknowledge first, then run the handler; safe if the handler defers too
pub fn with_deferred_reply(ephemeral: bool, inner: Handler) -> Handler {
    Arc::new(move |cx: HandlerContext| {
        let inner = Arc::clone(&inner);
        Box::pin(async move {
            cx.defer(ephemeral).await?;
            inner(cx).await
        })
    })
}

/// Required member and bot permissions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionRequirements {
    pub member: Vec<Permission>,
    pub bot: Vec<Permission>,
}

impl PermissionRequirements {
    pub fn member(permissions: &[Permission]) -> Self {
        Self {
            member: permissions.to_vec(),
            bot: Vec::new(),
        }
    }

    pub fn with_bot(mut self, permissions: &[Permission]) -> Self {
        self.bot = permissions.to_vec();
        self
    }
}

fn join_permissions(permissions: &[Permission]) -> String {
    permissions
        .iter()
        .map(Permission::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Reject with a localized denial unless the member (and bot) hold `required`
pub fn with_perms(required: PermissionRequirements, inner: Handler) -> Handler {
    let required = Arc::new(required);
    Arc::new(move |cx: HandlerContext| {
        let inner = Arc::clone(&inner);
        let required = Arc::clone(&required);
        Box::pin(async move {
            let interaction = cx.interaction();
            let missing = interaction.user.permissions.missing(&required.member);
            if !missing.is_empty() {
                tracing::debug!(user = %interaction.user.id, missing = %join_permissions(&missing), "Permission check failed");
                let text = cx.text(localizer::PERMISSION_DENIED, &[("permissions", join_permissions(&missing))]);
                cx.responder().reply(&Reply::ephemeral(text)).await?;
                return Ok(());
            }

            let missing = interaction.app_permissions.missing(&required.bot);
            if !missing.is_empty() {
                let text = cx.text(localizer::BOT_PERMISSION_DENIED, &[("permissions", join_permissions(&missing))]);
                cx.responder().reply(&Reply::ephemeral(text)).await?;
                return Ok(());
            }

            inner(cx).await
        })
    })
}

/// Computes a cooldown bucket key from the handler context
pub type CooldownKey = Arc<dyn Fn(&HandlerContext) -> String + Send + Sync>;

/// One bucket per user per command
pub fn per_user_key() -> CooldownKey {
    Arc::new(|cx: &HandlerContext| {
        format!(
            "{}:{}:{}",
            cx.module(),
            cx.command().unwrap_or("-"),
            cx.interaction().user.id
        )
    })
}

/// Reject with a rate-limited notice when the bucket for the key is empty
pub fn with_cooldown(policy: CooldownPolicy, key: CooldownKey, inner: Handler) -> Handler {
    Arc::new(move |cx: HandlerContext| {
        let inner = Arc::clone(&inner);
        let key = key(&cx);
        Box::pin(async move {
            match cx.services().cooldowns.try_acquire(&key, policy) {
                Ok(()) => inner(cx).await,
                Err(retry_after) => {
                    tracing::debug!(key = %key, ?retry_after, "Cooldown rejected");
                    let seconds = retry_after.as_secs_f64().ceil().min(u32::MAX as f64) as u64;
                    let text = cx.text(localizer::COOLDOWN, &[("seconds", seconds.to_string())]);
                    cx.responder().reply(&Reply::ephemeral(text)).await?;
                    Ok(())
                }
            }
        })
    })
}

/// Boxed future returned by preconditions
pub type PreconditionFuture = Pin<Box<dyn Future<Output = Result<(), String>> + Send + 'static>>;

/// An async check; `Err(text)` aborts and replies with `text`
pub type Precondition = Arc<dyn Fn(HandlerContext) -> PreconditionFuture + Send + Sync>;

/// Wrap an async closure as a [`Precondition`]
pub fn precondition<F, Fut>(f: F) -> Precondition
where
    F: Fn(HandlerContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), String>> + Send + 'static,
{
    Arc::new(move |cx| Box::pin(f(cx)))
}

/// Run checks in order, short-circuiting on the first rejection
pub fn with_preconditions(checks: Vec<Precondition>, inner: Handler) -> Handler {
    let checks = Arc::new(checks);
    Arc::new(move |cx: HandlerContext| {
        let inner = Arc::clone(&inner);
        let checks = Arc::clone(&checks);
        Box::pin(async move {
            for check in checks.iter() {
                if let Err(reason) = check(cx.clone()).await {
                    tracing::debug!(interaction = %cx.interaction().id, reason = %reason, "Precondition rejected");
                    cx.responder().reply(&Reply::ephemeral(reason)).await?;
                    return Ok(());
                }
            }
            inner(cx).await
        })
    })
}

/// Layer form of [`with_try_catch`]
pub struct TryCatch;

impl Middleware for TryCatch {
    fn name(&self) -> &str {
        "try-catch"
    }

    fn wrap(&self, inner: Handler) -> Handler {
        with_try_catch(inner)
    }
}

/// Layer form of [`with_deferred_reply`]
pub struct DeferredReply {
    pub ephemeral: bool,
}

impl Middleware for DeferredReply {
    fn name(&self) -> &str {
        "deferred-reply"
    }

    fn wrap(&self, inner: Handler) -> Handler {
        with_deferred_reply(self.ephemeral, inner)
    }
}

/// Layer form of [`with_perms`]
pub struct RequirePermissions(pub PermissionRequirements);

impl Middleware for RequirePermissions {
    fn name(&self) -> &str {
        "permissions"
    }

    fn wrap(&self, inner: Handler) -> Handler {
        with_perms(self.0.clone(), inner)
    }
}

/// Layer form of [`with_cooldown`]
pub struct Cooldown {
    pub policy: CooldownPolicy,
    pub key: CooldownKey,
}

impl Cooldown {
    pub fn per_user(policy: CooldownPolicy) -> Self {
        Self {
            policy,
            key: per_user_key(),
        }
    }
}

impl Middleware for Cooldown {
    fn name(&self) -> &str {
        "cooldown"
    }

    fn wrap(&self, inner: Handler) -> Handler {
        with_cooldown(self.policy, Arc::clone(&self.key), inner)
    }
}

/// Layer form of [`with_preconditions`]
pub struct Preconditions(pub Vec<Precondition>);

impl Middleware for Preconditions {
    fn name(&self) -> &str {
        "preconditions"
    }

    fn wrap(&self, inner: Handler) -> Handler {
        with_preconditions(self.0.clone(), inner)
    }
}

/// Logging middleware for debugging
pub struct LoggingMiddleware;

impl Middleware for LoggingMiddleware {
    fn name(&self) -> &str {
        "logging"
    }

    fn wrap(&self, inner: Handler) -> Handler {
        Arc::new(move |cx: HandlerContext| {
            let inner = Arc::clone(&inner);
            Box::pin(async move {
                let started = Instant::now();
                let id = cx.interaction().id.clone();
                tracing::debug!(interaction = %id, module = cx.module(), "[{}] start", cx.interaction().command_path());

                let result = inner(cx).await;
                let elapsed: Duration = started.elapsed();
                match &result {
                    Ok(_) => tracing::debug!(interaction = %id, ?elapsed, "Processed OK"),
                    Err(e) => tracing::warn!(interaction = %id, ?elapsed, "Error: {}", e),
                }
                result
            })
        })
    }
}
