//! WebSocket upgrade subscription.
//!
//! # Responsibilities
//! - Let a server object offer upgrade events to attached listeners
//! - Attach a mount's listener to a server exactly once
//!
//! # Data Flow
//! ```text
//! first in-context request (ws = true)
//!     → Subscription::try_subscribe (false → true, once)
//!     → UpgradeServer::attach(listener)
//!
//! later upgrade request
//!     → server offers it to listeners in attachment order
//!     → Accepted(future) or Declined(request) → next listener
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use futures_util::future::BoxFuture;

/// Result of offering an upgrade request to a listener.
pub enum UpgradeOutcome {
    Accepted(BoxFuture<'static, Response>),
    /// Not for this listener; the request is handed back untouched.
    Declined(Request<Body>),
}

impl UpgradeOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, UpgradeOutcome::Accepted(_))
    }
}

impl fmt::Debug for UpgradeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpgradeOutcome::Accepted(_) => f.write_str("Accepted"),
            UpgradeOutcome::Declined(req) => f.debug_tuple("Declined").field(req.uri()).finish(),
        }
    }
}

/// Something that handles upgrade events.
pub trait UpgradeListener: Send + Sync {
    fn on_upgrade(self: Arc<Self>, req: Request<Body>) -> UpgradeOutcome;
}

/// Server object that upgrade listeners attach to.
pub trait UpgradeServer: Send + Sync {
    fn attach(&self, listener: Arc<dyn UpgradeListener>);
}

/// Handle to the server a request arrived on, stored in request extensions.
#[derive(Clone)]
pub struct ServerRef(pub Arc<dyn UpgradeServer>);

impl fmt::Debug for ServerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ServerRef")
    }
}

/// Single-use `unsubscribed → subscribed` transition.
#[derive(Debug, Default)]
pub struct Subscription {
    subscribed: AtomicBool,
}

impl Subscription {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true for exactly one caller, the one that performs the transition.
    pub fn try_subscribe(&self) -> bool {
        self.subscribed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscribed.load(Ordering::Acquire)
    }
}
