//! Interaction handling - custom ids, sessions, middleware and dispatch

pub mod bindings;
pub mod cooldown;
pub mod custom_id;
pub mod handler;
pub mod middleware;
pub mod router;
pub mod session;

pub use cooldown::{CooldownBuckets, CooldownPolicy};
pub use custom_id::{ComponentKind, ScopedId, MAX_CUSTOM_ID_LEN};
pub use handler::{handler, AckState, Handler, HandlerContext, Responder};
pub use middleware::{Middleware, MiddlewareChain};
pub use router::{DispatchOutcome, InteractionRouter};
pub use session::{Session, SessionHandle, SessionStore};
