//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router with one middleware layer per proxy mount
//! - Wire up middleware (tracing, request ID)
//! - Own the [`ServerHandle`] that upgrade listeners attach to
//! - Offer upgrade requests to attached listeners before the middleware chain
//! - Bind server to listener and shut down gracefully
//!
//! # Data Flow
//! ```text
//! request ─▶ request-id ─▶ trace ─▶ upgrade_events ─┬─ upgrade taken by a listener ─▶ 101
//!                                                    └─▶ mount 1 ─▶ mount 2 ─▶ … ─▶ 404 fallback
//! ```

use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, PoisonError, RwLock};

use axum::{
    body::Body,
    extract::{Request, State},
    http::{StatusCode, Uri},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    Router,
};
use tokio::net::TcpListener;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use uuid::Uuid;

use crate::config::ProxyConfig;
use crate::http::request::is_upgrade_request;
use crate::proxy::upgrade::{ServerRef, UpgradeListener, UpgradeOutcome, UpgradeServer};
use crate::proxy::Dispatcher;

struct Slot {
    listener: Arc<dyn UpgradeListener>,
    attached: bool,
}

/// Server object that upgrade listeners attach to.
///
/// Mount listeners have a reserved slot in declaration order, so the order in
/// which upgrades are offered does not depend on which mount attached first.
/// Listeners without a slot are offered upgrades after all mounts.
pub struct ServerHandle {
    id: Uuid,
    listeners: RwLock<Vec<Slot>>,
}

impl ServerHandle {
    pub fn new() -> Arc<Self> {
        Self::with_mounts(Vec::new())
    }

    /// Reserve one slot per mount, in the order the mounts were declared.
    pub fn with_mounts(mounts: Vec<Arc<dyn UpgradeListener>>) -> Arc<Self> {
        let slots = mounts
            .into_iter()
            .map(|listener| Slot {
                listener,
                attached: false,
            })
            .collect();
        Arc::new(Self {
            id: Uuid::new_v4(),
            listeners: RwLock::new(slots),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|slot| slot.attached)
            .count()
    }

    /// Offer an upgrade request to attached listeners in mount order.
    ///
    /// The first listener that accepts owns the request; `Declined` means
    /// nobody wanted it.
    pub fn emit_upgrade(&self, mut req: Request<Body>) -> UpgradeOutcome {
        let listeners: Vec<_> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|slot| slot.attached)
            .map(|slot| slot.listener.clone())
            .collect();

        for listener in listeners {
            match listener.on_upgrade(req) {
                UpgradeOutcome::Accepted(fut) => return UpgradeOutcome::Accepted(fut),
                UpgradeOutcome::Declined(returned) => req = returned,
            }
        }
        UpgradeOutcome::Declined(req)
    }
}

impl UpgradeServer for ServerHandle {
    fn attach(&self, listener: Arc<dyn UpgradeListener>) {
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        match listeners
            .iter_mut()
            .find(|slot| Arc::ptr_eq(&slot.listener, &listener))
        {
            Some(slot) => slot.attached = true,
            None => listeners.push(Slot {
                listener,
                attached: true,
            }),
        }
        let attached = listeners.iter().filter(|slot| slot.attached).count();
        tracing::debug!(server = %self.id, listeners = attached, "Upgrade listener attached");
    }
}

/// Outermost proxy middleware: tags requests with the server handle and
/// hands upgrades to attached listeners.
pub async fn upgrade_events(
    State(server): State<Arc<ServerHandle>>,
    mut request: Request,
    next: Next,
) -> Response {
    request.extensions_mut().insert(ServerRef(server.clone()));

    if is_upgrade_request(request.headers()) {
        match server.emit_upgrade(request) {
            UpgradeOutcome::Accepted(fut) => return fut.await,
            UpgradeOutcome::Declined(returned) => request = returned,
        }
    }
    next.run(request).await
}

/// HTTP server for the proxy.
pub struct HttpServer {
    router: Router,
    handle: Arc<ServerHandle>,
    config: ProxyConfig,
}

impl HttpServer {
    /// Create a new HTTP server. Mounts run in the given order.
    pub fn new(config: ProxyConfig, dispatchers: Vec<Arc<Dispatcher>>) -> Self {
        let handle = ServerHandle::with_mounts(
            dispatchers
                .iter()
                .map(|d| d.clone() as Arc<dyn UpgradeListener>)
                .collect(),
        );
        let router = Self::build_router(&handle, &dispatchers);
        Self {
            router,
            handle,
            config,
        }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(handle: &Arc<ServerHandle>, dispatchers: &[Arc<Dispatcher>]) -> Router {
        // Each layer wraps the previous ones, so the first mount goes on last.
        let router = dispatchers
            .iter()
            .rev()
            .fold(Router::new().fallback(not_found), |router, dispatcher| {
                dispatcher.mount(router)
            });

        router
            .layer(middleware::from_fn_with_state(handle.clone(), upgrade_events))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    pub fn handle(&self) -> Arc<ServerHandle> {
        self.handle.clone()
    }

    /// The assembled router, for embedding or in-process tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Run the server, accepting connections on the given listener until
    /// `shutdown` resolves.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            server = %self.handle.id(),
            mounts = self.config.mounts.len(),
            "HTTP server starting"
        );

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn not_found(uri: Uri) -> impl IntoResponse {
    (StatusCode::NOT_FOUND, format!("No proxy mount for {}", uri.path()))
}

/// Wait for shutdown signal (Ctrl+C).
pub async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown signal received"),
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C, shutting down");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    struct PathListener {
        path: &'static str,
        offers: AtomicUsize,
    }

    impl PathListener {
        fn new(path: &'static str) -> Arc<Self> {
            Arc::new(Self {
                path,
                offers: AtomicUsize::new(0),
            })
        }
    }

    impl UpgradeListener for PathListener {
        fn on_upgrade(self: Arc<Self>, req: Request<Body>) -> UpgradeOutcome {
            self.offers.fetch_add(1, Ordering::SeqCst);
            if req.uri().path() != self.path {
                return UpgradeOutcome::Declined(req);
            }
            UpgradeOutcome::Accepted(Box::pin(async {
                StatusCode::SWITCHING_PROTOCOLS.into_response()
            }))
        }
    }

    #[derive(Default)]
    struct CatchAll {
        offers: AtomicUsize,
    }

    impl UpgradeListener for CatchAll {
        fn on_upgrade(self: Arc<Self>, _req: Request<Body>) -> UpgradeOutcome {
            self.offers.fetch_add(1, Ordering::SeqCst);
            UpgradeOutcome::Accepted(Box::pin(async {
                StatusCode::SWITCHING_PROTOCOLS.into_response()
            }))
        }
    }

    fn upgrade_request(path: &str) -> Request<Body> {
        Request::builder()
            .uri(path)
            .header("Connection", "Upgrade")
            .header("Upgrade", "websocket")
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn test_emit_upgrade_in_attachment_order() {
        let handle = ServerHandle::new();
        let chat = PathListener::new("/chat");
        let feed = PathListener::new("/feed");
        handle.attach(chat.clone());
        handle.attach(feed.clone());
        assert_eq!(handle.listener_count(), 2);

        assert!(handle.emit_upgrade(upgrade_request("/chat")).is_accepted());
        assert_eq!(chat.offers.load(Ordering::SeqCst), 1);
        assert_eq!(feed.offers.load(Ordering::SeqCst), 0);

        assert!(handle.emit_upgrade(upgrade_request("/feed")).is_accepted());
        assert_eq!(chat.offers.load(Ordering::SeqCst), 2);
        assert_eq!(feed.offers.load(Ordering::SeqCst), 1);

        match handle.emit_upgrade(upgrade_request("/other")) {
            UpgradeOutcome::Declined(req) => assert_eq!(req.uri().path(), "/other"),
            UpgradeOutcome::Accepted(_) => panic!("nobody listens on /other"),
        }
    }

    #[test]
    fn test_mount_order_wins_over_attach_order() {
        let chat = PathListener::new("/chat");
        let catch_all = Arc::new(CatchAll::default());
        let handle = ServerHandle::with_mounts(vec![
            chat.clone() as Arc<dyn UpgradeListener>,
            catch_all.clone() as Arc<dyn UpgradeListener>,
        ]);
        assert_eq!(handle.listener_count(), 0);

        handle.attach(catch_all.clone());
        handle.attach(chat.clone());
        handle.attach(chat.clone());
        assert_eq!(handle.listener_count(), 2);

        assert!(handle.emit_upgrade(upgrade_request("/chat")).is_accepted());
        assert_eq!(chat.offers.load(Ordering::SeqCst), 1);
        assert_eq!(catch_all.offers.load(Ordering::SeqCst), 0);

        assert!(handle.emit_upgrade(upgrade_request("/other")).is_accepted());
        assert_eq!(catch_all.offers.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unattached_mount_is_skipped() {
        let chat = PathListener::new("/chat");
        let handle = ServerHandle::with_mounts(vec![chat.clone() as Arc<dyn UpgradeListener>]);

        assert!(!handle.emit_upgrade(upgrade_request("/chat")).is_accepted());
        assert_eq!(chat.offers.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fallback_without_mounts() {
        let server = HttpServer::new(ProxyConfig::default(), Vec::new());
        let response = server
            .router()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn test_upgrade_events_delivers_to_listener() {
        let server = HttpServer::new(ProxyConfig::default(), Vec::new());
        let chat = PathListener::new("/chat");
        server.handle().attach(chat.clone());

        let response = server.router().oneshot(upgrade_request("/chat")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SWITCHING_PROTOCOLS);

        let response = server.router().oneshot(upgrade_request("/other")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
