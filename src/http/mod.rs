//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, upgrade events, mount layers)
//!     → request.rs (routing view of the request, hostname fallback)
//!     → proxy::Dispatcher (per mount)
//!     → transport (upstream)
//! ```

pub mod request;
pub mod server;

pub use request::RequestParts;
pub use server::{HttpServer, ServerHandle};
