//! Proxy mount options.
//!
//! [`ProxyOptions`] is what callers configure. At construction the
//! dispatcher compiles it into a context filter, a rewriter, a router and a
//! [`ForwardOptions`] template. Each request gets its own copy of the
//! template; the template itself is never mutated.

use std::fmt;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{HeaderMap, Request};
use axum::response::Response;

use crate::error::TransportError;
use crate::http::request::RequestParts;
use crate::observability::LogLevel;
use crate::routing::{PathRewriteConfig, Target, TargetRouter};

/// Custom failure response, replacing the default one.
pub type ErrorHook =
    Arc<dyn Fn(&TransportError, &RequestParts, &ForwardOptions) -> Response + Send + Sync>;

/// Called with the outgoing upstream request just before it is sent.
pub type ProxyReqHook = Arc<dyn Fn(&mut Request<Body>, &ForwardOptions) + Send + Sync>;

/// User-facing configuration of one proxy mount.
#[derive(Clone)]
pub struct ProxyOptions {
    pub target: Option<Target>,
    /// Forward WebSocket upgrades.
    pub ws: bool,
    pub path_rewrite: Option<PathRewriteConfig>,
    pub router: Option<TargetRouter>,
    pub log_level: LogLevel,
    /// Set the `Host` header to the target authority.
    pub change_origin: bool,
    /// Add `x-forwarded-*` headers.
    pub xfwd: bool,
    /// Extra headers added to every upstream request.
    pub headers: HeaderMap,
    pub on_error: Option<ErrorHook>,
    pub on_proxy_req: Option<ProxyReqHook>,
    /// Name used in logs and metrics.
    pub name: String,
}

impl ProxyOptions {
    pub fn new(target: Target) -> Self {
        Self {
            target: Some(target),
            ..Self::default()
        }
    }

    pub fn ws(mut self, enabled: bool) -> Self {
        self.ws = enabled;
        self
    }

    pub fn path_rewrite(mut self, config: PathRewriteConfig) -> Self {
        self.path_rewrite = Some(config);
        self
    }

    pub fn router(mut self, router: TargetRouter) -> Self {
        self.router = Some(router);
        self
    }

    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    pub fn change_origin(mut self, enabled: bool) -> Self {
        self.change_origin = enabled;
        self
    }

    pub fn xfwd(mut self, enabled: bool) -> Self {
        self.xfwd = enabled;
        self
    }

    pub fn header(mut self, name: axum::http::HeaderName, value: axum::http::HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&TransportError, &RequestParts, &ForwardOptions) -> Response + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(f));
        self
    }

    pub fn on_proxy_req<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Request<Body>, &ForwardOptions) + Send + Sync + 'static,
    {
        self.on_proxy_req = Some(Arc::new(f));
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl Default for ProxyOptions {
    fn default() -> Self {
        Self {
            target: None,
            ws: false,
            path_rewrite: None,
            router: None,
            log_level: LogLevel::default(),
            change_origin: false,
            xfwd: false,
            headers: HeaderMap::new(),
            on_error: None,
            on_proxy_req: None,
            name: "proxy".to_string(),
        }
    }
}

impl fmt::Debug for ProxyOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyOptions")
            .field("name", &self.name)
            .field("target", &self.target)
            .field("ws", &self.ws)
            .field("path_rewrite", &self.path_rewrite)
            .field("router", &self.router)
            .field("log_level", &self.log_level)
            .field("change_origin", &self.change_origin)
            .field("xfwd", &self.xfwd)
            .finish_non_exhaustive()
    }
}

/// Options the transport engine sees for one request.
#[derive(Clone)]
pub struct ForwardOptions {
    pub target: Target,
    pub ws: bool,
    pub change_origin: bool,
    pub xfwd: bool,
    pub headers: Arc<HeaderMap>,
    pub on_proxy_req: Option<ProxyReqHook>,
}

impl ForwardOptions {
    pub fn new(target: Target) -> Self {
        Self {
            target,
            ws: false,
            change_origin: false,
            xfwd: false,
            headers: Arc::new(HeaderMap::new()),
            on_proxy_req: None,
        }
    }
}

impl fmt::Debug for ForwardOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForwardOptions")
            .field("target", &self.target)
            .field("ws", &self.ws)
            .field("change_origin", &self.change_origin)
            .field("xfwd", &self.xfwd)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}
