//! Context-based reverse proxy middleware.
//!
//! A mount decides per request whether it is in scope (context), where it
//! goes (router, rewriter) and hands it to a transport engine. WebSocket
//! upgrades are picked up from the server once the mount has seen traffic.

pub mod config;
pub mod error;
pub mod http;
pub mod observability;
pub mod proxy;
pub mod routing;
pub mod transport;

pub use config::schema::ProxyConfig;
pub use error::{ConfigError, TransportError};
pub use http::{HttpServer, ServerHandle};
pub use proxy::{Dispatcher, ProxyOptions};
pub use routing::{ContextFilter, PathRewriteConfig, Target, TargetRouter};
pub use transport::{HttpTransport, Transport};
