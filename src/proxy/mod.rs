//! Proxy mounts.
//!
//! # Responsibilities
//! - Turn [`ProxyOptions`] into a request [`Dispatcher`]
//! - Subscribe mounts to server upgrade events
//! - Report transport failures
//!
//! # Data Flow
//! ```text
//! ProxyOptions + ContextFilter ──▶ Dispatcher::new ──▶ Arc<Dispatcher>
//!                                                         │
//!                     axum middleware (proxy_middleware) ◀┘
//! ```

pub mod dispatcher;
pub mod options;
pub mod report;
pub mod upgrade;

pub use dispatcher::{proxy_middleware, Dispatcher};
pub use options::{ErrorHook, ForwardOptions, ProxyOptions, ProxyReqHook};
pub use report::{report, ErrorRecord, ERROR_REFERENCE};
pub use upgrade::{ServerRef, UpgradeListener, UpgradeOutcome, UpgradeServer};
