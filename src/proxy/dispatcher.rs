//! Per-request dispatch.
//!
//! # Responsibilities
//! - Decide whether a request belongs to this mount (context match)
//! - Derive the effective target (router) and path (rewriter)
//! - Hand the request to the transport engine
//! - Subscribe to the server's upgrade events once, when `ws` is enabled
//! - Route transport failures to the error reporter
//!
//! # Data Flow
//! ```text
//! request ──▶ context match ──no──▶ next handler
//!                  │yes
//!                  ▼
//!          per-request options (copy of template)
//!                  ▼
//!          router (original path) ──▶ rewriter ──▶ transport
//!                                                     │err
//!                                                     ▼
//!                                               error reporter
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::uri::PathAndQuery;
use axum::http::Uri;
use axum::middleware::Next;
use axum::response::Response;
use axum::Router;
use tracing::Level;
use url::Url;

use crate::error::{ConfigError, TransportError};
use crate::http::request::{is_upgrade_request, RequestParts};
use crate::observability::metrics::{self, Outcome};
use crate::observability::LogLevel;
use crate::proxy::options::{ErrorHook, ForwardOptions, ProxyOptions};
use crate::proxy::report::{default_error_response, report, ErrorRecord};
use crate::proxy::upgrade::{ServerRef, Subscription, UpgradeListener, UpgradeOutcome, UpgradeServer};
use crate::routing::{ContextFilter, PathRewriter, Target, TargetRouter};
use crate::transport::Transport;

/// One proxy mount: a compiled context, router, rewriter and options template.
pub struct Dispatcher {
    name: String,
    context: ContextFilter,
    rewriter: Option<PathRewriter>,
    router: Option<TargetRouter>,
    template: ForwardOptions,
    log_level: LogLevel,
    on_error: Option<ErrorHook>,
    transport: Arc<dyn Transport>,
    subscription: Subscription,
}

impl Dispatcher {
    /// Compile a mount. Fails before any request is served if the options
    /// are unusable.
    pub fn new(
        context: ContextFilter,
        options: ProxyOptions,
        transport: Arc<dyn Transport>,
    ) -> Result<Arc<Self>, ConfigError> {
        let target = options.target.ok_or(ConfigError::MissingTarget)?;
        let rewriter = PathRewriter::build(options.path_rewrite.as_ref(), options.log_level);

        let template = ForwardOptions {
            target,
            ws: options.ws,
            change_origin: options.change_origin,
            xfwd: options.xfwd,
            headers: Arc::new(options.headers),
            on_proxy_req: options.on_proxy_req,
        };

        if options.log_level.allows(Level::INFO) {
            tracing::info!(
                mount = %options.name,
                context = %context,
                target = %template.target,
                ws = template.ws,
                "Proxy created"
            );
        }

        Ok(Arc::new(Self {
            name: options.name,
            context,
            rewriter,
            router: options.router,
            template,
            log_level: options.log_level,
            on_error: options.on_error,
            transport,
            subscription: Subscription::new(),
        }))
    }

    /// Build a mount from `scheme://host[:port][/context]`.
    ///
    /// The origin becomes the target unless `options` already has one, the
    /// path becomes the context (`/` when absent), and `ws`/`wss` schemes
    /// turn on upgrade handling.
    pub fn from_shorthand(
        shorthand: &str,
        mut options: ProxyOptions,
        transport: Arc<dyn Transport>,
    ) -> Result<Arc<Self>, ConfigError> {
        let url = Url::parse(shorthand)
            .map_err(|e| ConfigError::invalid_context(shorthand, e.to_string()))?;
        let host = url
            .host_str()
            .ok_or_else(|| ConfigError::invalid_context(shorthand, "missing host"))?;

        let origin = match url.port() {
            Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
            None => format!("{}://{}", url.scheme(), host),
        };
        if options.target.is_none() {
            options.target = Some(Target::parse(&origin)?);
        }
        if matches!(url.scheme(), "ws" | "wss") {
            options.ws = true;
        }

        let context = match url.path() {
            "" => "/",
            path => path,
        };
        Self::new(ContextFilter::parse(context)?, options, transport)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn context(&self) -> &ContextFilter {
        &self.context
    }

    pub fn target(&self) -> &Target {
        &self.template.target
    }

    /// True once this mount's listener is attached to a server.
    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_subscribed()
    }

    /// Install this mount as a middleware on `router`.
    pub fn mount(self: &Arc<Self>, router: Router) -> Router {
        router.layer(axum::middleware::from_fn_with_state(
            self.clone(),
            proxy_middleware,
        ))
    }

    /// Handle one request. `next` runs only when the request is out of context.
    pub async fn dispatch<N, F>(self: &Arc<Self>, req: Request<Body>, next: N) -> Response
    where
        N: FnOnce(Request<Body>) -> F,
        F: Future<Output = Response>,
    {
        let parts = RequestParts::from_request(&req);
        if !self.context.matches(parts.original_path(), &parts) {
            metrics::record_outcome(&self.name, Outcome::Passed);
            return next(req).await;
        }

        let server = req.extensions().get::<ServerRef>().cloned();

        // An upgrade only reaches the middleware chain when no listener on the
        // server took it, i.e. this mount is not attached there yet.
        if self.template.ws && is_upgrade_request(req.headers()) {
            self.ensure_subscribed(server.as_ref());
            return self.clone().forward_upgrade(req, parts).await;
        }

        let start = Instant::now();
        let (req, options) = self.prepare(req, &parts);
        let forwarding = self.transport.forward(req, options.clone());

        if self.template.ws {
            self.ensure_subscribed(server.as_ref());
        }

        let response = match forwarding.await {
            Ok(response) => {
                metrics::record_outcome(&self.name, Outcome::Proxied);
                response
            }
            Err(err) => self.fail(&err, &parts, &options),
        };
        metrics::record_duration(&self.name, start);
        response
    }

    /// External upgrade entry point, for wiring upgrades into a server by hand.
    ///
    /// Once this mount has subscribed itself to a server, the server delivers
    /// upgrades directly and calls made here are declined.
    pub fn upgrade(self: &Arc<Self>, req: Request<Body>) -> UpgradeOutcome {
        if self.subscription.is_subscribed() {
            if self.log_level.allows(Level::WARN) {
                tracing::warn!(
                    mount = %self.name,
                    path = %req.uri(),
                    "External upgrade ignored: mount already receives upgrades from its server"
                );
            }
            return UpgradeOutcome::Declined(req);
        }
        self.handle_upgrade(req)
    }

    /// Attach this mount's upgrade listener to `server` unless already done.
    ///
    /// Returns true only for the call that performed the attachment.
    pub fn subscribe_upgrades(self: &Arc<Self>, server: &dyn UpgradeServer) -> bool {
        if !self.subscription.try_subscribe() {
            return false;
        }
        server.attach(self.clone());
        if self.log_level.allows(Level::DEBUG) {
            tracing::debug!(mount = %self.name, "Subscribed to server upgrade events");
        }
        true
    }

    fn ensure_subscribed(self: &Arc<Self>, server: Option<&ServerRef>) {
        match server {
            Some(server) => {
                self.subscribe_upgrades(server.0.as_ref());
            }
            None if !self.subscription.is_subscribed() && self.log_level.allows(Level::DEBUG) => {
                tracing::debug!(mount = %self.name, "No server handle on request, upgrades not subscribed");
            }
            None => {}
        }
    }

    fn handle_upgrade(self: &Arc<Self>, req: Request<Body>) -> UpgradeOutcome {
        let parts = RequestParts::from_request(&req);
        if !self.context.matches(parts.original_path(), &parts) {
            return UpgradeOutcome::Declined(req);
        }
        UpgradeOutcome::Accepted(Box::pin(self.clone().forward_upgrade(req, parts)))
    }

    async fn forward_upgrade(self: Arc<Self>, req: Request<Body>, parts: RequestParts) -> Response {
        let (req, options) = self.prepare(req, &parts);
        match self.transport.forward_upgrade(req, options.clone()).await {
            Ok(response) => {
                if self.log_level.allows(Level::INFO) {
                    tracing::info!(
                        mount = %self.name,
                        path = %parts.original_path(),
                        target = %options.target,
                        "Upgrading to WebSocket"
                    );
                }
                metrics::record_outcome(&self.name, Outcome::Upgraded);
                response
            }
            Err(err) => self.fail(&err, &parts, &options),
        }
    }

    /// Build the effective request and its per-request options.
    ///
    /// The router runs first and sees the original path; the rewriter runs
    /// second.
    fn prepare(&self, mut req: Request<Body>, parts: &RequestParts) -> (Request<Body>, ForwardOptions) {
        *req.uri_mut() = parts.original_uri.clone();
        let original_path = parts.original_path();
        let mut options = self.template.clone();

        if let Some(router) = &self.router {
            if let Some(target) = router.resolve(parts, &options) {
                if self.log_level.allows(Level::DEBUG) {
                    tracing::debug!(
                        mount = %self.name,
                        from = %options.target,
                        to = %target,
                        "Router new target"
                    );
                }
                options.target = target;
            }
        }

        if let Some(rewriter) = &self.rewriter {
            match rewriter.rewrite(original_path, parts) {
                Some(path) => match replace_path(req.uri(), &path) {
                    Some(uri) => *req.uri_mut() = uri,
                    None => {
                        if self.log_level.allows(Level::WARN) {
                            tracing::warn!(mount = %self.name, path = %path, "Rewritten path is not a valid uri, keeping original");
                        }
                    }
                },
                None => {
                    if self.log_level.allows(Level::INFO) {
                        tracing::info!(mount = %self.name, path = %original_path, "No rewritten path found");
                    }
                }
            }
        }

        if self.log_level.allows(Level::DEBUG) {
            let new_path = req
                .uri()
                .path_and_query()
                .map(|pq| pq.as_str())
                .unwrap_or("/");
            let marker = arrow(new_path != original_path, options.target != self.template.target);
            tracing::debug!(
                mount = %self.name,
                method = %parts.method,
                path = %original_path,
                arrow = marker,
                target = %options.target,
                "{} {} {} {}{}",
                parts.method,
                original_path,
                marker,
                options.target,
                new_path
            );
        }

        (req, options)
    }

    fn fail(&self, err: &TransportError, parts: &RequestParts, options: &ForwardOptions) -> Response {
        metrics::record_outcome(&self.name, Outcome::Failed);
        if self.log_level.allows(Level::ERROR) {
            report(err, parts, options);
        } else {
            // Quiet mounts still count their failures.
            metrics::record_error(&ErrorRecord::new(err, parts, &options.target).code);
        }
        match &self.on_error {
            Some(hook) => hook(err, parts, options),
            None => default_error_response(err, parts, options),
        }
    }
}

impl UpgradeListener for Dispatcher {
    fn on_upgrade(self: Arc<Self>, req: Request<Body>) -> UpgradeOutcome {
        self.handle_upgrade(req)
    }
}

/// Axum middleware entry point, see [`Dispatcher::mount`].
pub async fn proxy_middleware(
    State(dispatcher): State<Arc<Dispatcher>>,
    request: Request,
    next: Next,
) -> Response {
    dispatcher.dispatch(request, move |req| next.run(req)).await
}

/// Marker showing what changed: `->` nothing, `~>` path, `=>` target, `≈>` both.
pub fn arrow(path_changed: bool, target_changed: bool) -> &'static str {
    match (path_changed, target_changed) {
        (false, false) => "->",
        (true, false) => "~>",
        (false, true) => "=>",
        (true, true) => "≈>",
    }
}

fn replace_path(uri: &Uri, path: &str) -> Option<Uri> {
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    };
    let path_and_query: PathAndQuery = path.parse().ok()?;
    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(path_and_query);
    Uri::from_parts(parts).ok()
}
