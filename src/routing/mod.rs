//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (original path, host, headers)
//!     → matcher.rs (is the request in this mount's context?)
//!     → router.rs (optional per-request target override)
//!     → rewrite.rs (optional path rewrite)
//!     → Return: effective target + path
//!
//! Compilation (at mount construction):
//!     context / rewrite table / router table
//!     → validate and compile (globs, regexes, targets)
//!     → freeze as immutable values
//! ```
//!
//! # Design Decisions
//! - Everything compiled once, immutable at runtime
//! - Deterministic: same input always gives the same decision
//! - First match wins (declaration order)
//! - Router runs before the rewriter and only sees the original path

pub mod matcher;
pub mod rewrite;
pub mod router;
pub mod target;

pub use matcher::ContextFilter;
pub use rewrite::{PathRewriteConfig, PathRewriter, RewriteRule};
pub use router::TargetRouter;
pub use target::Target;
