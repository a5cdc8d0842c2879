//! Transport engine interface.
//!
//! # Data Flow
//! ```text
//! Dispatcher (effective uri + ForwardOptions)
//!     → Transport::forward          (plain request/response)
//!     → Transport::forward_upgrade  (101 handshake + byte tunnel)
//!     → Err(TransportError) routed back to the error reporter
//! ```
//!
//! # Design Decisions
//! - The dispatcher never touches sockets; everything below this trait is
//!   swappable (tests use a recording transport)
//! - Futures are `'static` so the transport can run them on its own tasks

pub mod client;

use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use futures_util::future::BoxFuture;

use crate::error::TransportError;
use crate::proxy::options::ForwardOptions;

pub use client::HttpTransport;

pub type TransportFuture = BoxFuture<'static, Result<Response, TransportError>>;

pub trait Transport: Send + Sync + 'static {
    /// Forward a standard request to `options.target`.
    fn forward(&self, req: Request<Body>, options: ForwardOptions) -> TransportFuture;

    /// Forward an upgrade handshake. The client connection travels in the
    /// request's upgrade extension.
    fn forward_upgrade(&self, req: Request<Body>, options: ForwardOptions) -> TransportFuture;
}
