//! Dynamic target resolution.
//!
//! # Responsibilities
//! - Pick a per-request upstream target from a table or a function
//! - Return explicit "no change" when nothing matches
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - Table keys are evaluated in declaration order; first match wins
//! - A key containing `/` is matched against `host + path`, any other key
//!   must equal the `Host` header
//! - Always evaluated against the original request path, before rewriting

use std::fmt;
use std::sync::Arc;

use crate::error::ConfigError;
use crate::http::request::RequestParts;
use crate::proxy::options::ForwardOptions;
use crate::routing::target::Target;

/// Custom router, called with the request and the per-request options.
pub type RouterFn = Arc<dyn Fn(&RequestParts, &ForwardOptions) -> Option<Target> + Send + Sync>;

/// One entry of a router table.
#[derive(Debug, Clone)]
pub struct RouteEntry {
    key: String,
    target: Target,
}

impl RouteEntry {
    pub fn new(key: impl Into<String>, target: Target) -> Self {
        Self {
            key: key.into(),
            target,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    fn matches(&self, req: &RequestParts) -> bool {
        let host = req.host_header().unwrap_or_default();
        if self.key.contains('/') {
            let host_and_path = format!("{}{}", host, req.original_path());
            host_and_path.contains(self.key.as_str())
        } else {
            host == self.key
        }
    }
}

#[derive(Clone)]
pub enum TargetRouter {
    Table(Vec<RouteEntry>),
    Function(RouterFn),
}

impl TargetRouter {
    /// Build a table router from `(key, target)` pairs, in iteration order.
    pub fn from_table<I, K, V>(table: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: AsRef<str>,
    {
        table
            .into_iter()
            .map(|(key, target)| {
                let key = key.into();
                if key.is_empty() {
                    return Err(ConfigError::invalid_router(key, "key must not be empty"));
                }
                let target = Target::parse(target.as_ref())
                    .map_err(|e| ConfigError::invalid_router(key.clone(), e.to_string()))?;
                Ok(RouteEntry::new(key, target))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(TargetRouter::Table)
    }

    pub fn function<F>(f: F) -> Self
    where
        F: Fn(&RequestParts, &ForwardOptions) -> Option<Target> + Send + Sync + 'static,
    {
        TargetRouter::Function(Arc::new(f))
    }

    /// Resolve a new target for this request, or `None` to keep the current one.
    pub fn resolve(&self, req: &RequestParts, options: &ForwardOptions) -> Option<Target> {
        match self {
            TargetRouter::Table(entries) => entries
                .iter()
                .find(|entry| entry.matches(req))
                .map(|entry| entry.target.clone()),
            TargetRouter::Function(f) => f(req, options),
        }
    }
}

impl fmt::Debug for TargetRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetRouter::Table(entries) => f.debug_tuple("Table").field(entries).finish(),
            TargetRouter::Function(_) => f.write_str("Function(<fn>)"),
        }
    }
}
