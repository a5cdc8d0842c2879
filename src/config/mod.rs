//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks, every mount compiled once)
//!     → ProxyConfig (validated, immutable)
//!     → MountConfig::compile → Dispatcher per mount
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Rewrite and router tables keep declaration order

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config};
pub use schema::{
    ContextConfig, ListenerConfig, MountConfig, ObservabilityConfig, ProxyConfig, TimeoutConfig,
};
pub use validation::validate_config;
