//! HTTP/1.1 transport engine.
//!
//! # Responsibilities
//! - Build the upstream request from the effective uri and [`ForwardOptions`]
//! - Forward plain requests through a pooled hyper client
//! - Forward upgrade handshakes and tunnel bytes after `101 Switching Protocols`
//! - Classify failures into [`TransportError`]
//!
//! # Data Flow
//! ```text
//! Request (effective path) ──▶ target.join ──▶ headers (hop-by-hop, origin, xfwd)
//!     ──▶ on_proxy_req hook ──▶ hyper client ──▶ Response
//!
//! upgrade:  client OnUpgrade ─┐
//!                             ├─▶ copy_bidirectional (spawned task)
//!           upstream 101   ───┘
//! ```
//!
//! # Design Decisions
//! - Plain `http`/`ws` upstreams only; TLS targets fail with `EPROTO`
//! - The request timeout covers connect plus response headers, not the body
//! - Tunnels run on their own task so the 101 can be returned immediately

use std::error::Error as StdError;
use std::net::SocketAddr;
use std::time::Duration;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::header::{self, HeaderName, HeaderValue};
use axum::http::{HeaderMap, Request, StatusCode, Version};
use axum::response::Response;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioIo};

use crate::config::schema::TimeoutConfig;
use crate::error::TransportError;
use crate::proxy::options::ForwardOptions;
use crate::transport::{Transport, TransportFuture};

/// Headers that describe a single connection and are never forwarded as-is.
const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");
const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");

/// Transport backed by the hyper-util legacy client.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client<HttpConnector, Body>,
    connect_timeout: Duration,
    request_timeout: Duration,
}

impl HttpTransport {
    pub fn new(connect_timeout: Duration, request_timeout: Duration) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(connect_timeout));
        connector.set_nodelay(true);

        let client = Client::builder(TokioExecutor::new()).build(connector);
        Self {
            client,
            connect_timeout,
            request_timeout,
        }
    }

    pub fn from_config(timeouts: &TimeoutConfig) -> Self {
        Self::new(
            Duration::from_secs(timeouts.connect_secs),
            Duration::from_secs(timeouts.request_secs),
        )
    }

    async fn send(&self, req: Request<Body>) -> Result<Response, TransportError> {
        let response = tokio::time::timeout(self.request_timeout, self.client.request(req))
            .await
            .map_err(|_| TransportError::Timeout(self.request_timeout))?
            .map_err(|e| self.classify(&e))?;

        let (parts, body) = response.into_parts();
        Ok(Response::from_parts(parts, Body::new(body)))
    }

    fn classify(&self, err: &(dyn StdError + 'static)) -> TransportError {
        match classify_error(err) {
            TransportError::Timeout(_) => TransportError::Timeout(self.connect_timeout),
            other => other,
        }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::from_config(&TimeoutConfig::default())
    }
}

impl Transport for HttpTransport {
    fn forward(&self, req: Request<Body>, options: ForwardOptions) -> TransportFuture {
        let transport = self.clone();
        Box::pin(async move {
            let upstream = build_upstream(req, &options, false)?;
            let mut response = transport.send(upstream).await?;
            strip_hop_by_hop(response.headers_mut());
            Ok(response)
        })
    }

    fn forward_upgrade(&self, mut req: Request<Body>, options: ForwardOptions) -> TransportFuture {
        let transport = self.clone();
        Box::pin(async move {
            let client_upgrade = hyper::upgrade::on(&mut req);
            let upstream = build_upstream(req, &options, true)?;
            let mut response = transport.send(upstream).await?;

            if response.status() != StatusCode::SWITCHING_PROTOCOLS {
                tracing::debug!(
                    target_url = %options.target,
                    status = %response.status(),
                    "Upstream declined upgrade"
                );
                strip_hop_by_hop(response.headers_mut());
                return Ok(response);
            }

            let upstream_upgrade = hyper::upgrade::on(&mut response);
            let target = options.target.to_string();
            tokio::spawn(async move {
                match tokio::try_join!(client_upgrade, upstream_upgrade) {
                    Ok((client, upstream)) => {
                        let mut client = TokioIo::new(client);
                        let mut upstream = TokioIo::new(upstream);
                        match tokio::io::copy_bidirectional(&mut client, &mut upstream).await {
                            Ok((sent, received)) => {
                                tracing::debug!(target_url = %target, sent, received, "Tunnel closed");
                            }
                            Err(e) => {
                                tracing::debug!(target_url = %target, error = %e, "Tunnel closed with error");
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!(target_url = %target, error = %e, "Upgrade handshake failed");
                    }
                }
            });

            let (parts, _) = response.into_parts();
            Ok(Response::from_parts(parts, Body::empty()))
        })
    }
}

/// Build the request sent upstream.
///
/// `req.uri()` is the effective path and query; the target supplies scheme
/// and authority.
pub fn build_upstream(
    req: Request<Body>,
    options: &ForwardOptions,
    upgrade: bool,
) -> Result<Request<Body>, TransportError> {
    match options.target.scheme() {
        "http" | "ws" => {}
        other => return Err(TransportError::UnsupportedScheme(other.to_string())),
    }

    let path_and_query = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let uri = options
        .target
        .join(path_and_query)
        .map_err(|e| TransportError::InvalidUri(e.to_string()))?;

    let (mut parts, body) = req.into_parts();
    let client_addr = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let original_host = parts.headers.get(header::HOST).cloned();
    let protocol = parts.headers.get(header::UPGRADE).cloned();

    strip_hop_by_hop(&mut parts.headers);
    if upgrade {
        parts.headers.insert(
            header::UPGRADE,
            protocol.unwrap_or(HeaderValue::from_static("websocket")),
        );
        parts
            .headers
            .insert(header::CONNECTION, HeaderValue::from_static("upgrade"));
    }

    if options.change_origin {
        let authority = options.target.authority();
        if let Ok(host) = HeaderValue::from_str(&authority) {
            parts.headers.insert(header::HOST, host);
        }
    }

    for (name, value) in options.headers.iter() {
        parts.headers.insert(name.clone(), value.clone());
    }

    if options.xfwd {
        if let Some(ip) = client_addr {
            append_forwarded_for(&mut parts.headers, &ip.to_string());
        }
        let proto = if upgrade { "ws" } else { "http" };
        parts
            .headers
            .entry(X_FORWARDED_PROTO)
            .or_insert(HeaderValue::from_static(proto));
        if let Some(host) = original_host {
            parts.headers.entry(X_FORWARDED_HOST).or_insert(host);
        }
    }

    parts.uri = uri;
    parts.version = Version::HTTP_11;
    let mut upstream = Request::from_parts(parts, body);

    if let Some(hook) = &options.on_proxy_req {
        hook(&mut upstream, options);
    }
    Ok(upstream)
}

fn append_forwarded_for(headers: &mut HeaderMap, ip: &str) {
    let value = match headers.get(&X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(existing) if !existing.is_empty() => format!("{}, {}", existing, ip),
        _ => ip.to_string(),
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(X_FORWARDED_FOR, value);
    }
}

/// Remove hop-by-hop headers, including any named by `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|token| HeaderName::from_bytes(token.trim().as_bytes()).ok())
        .collect();

    for name in listed.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
}

/// Walk the error chain looking for something classifiable.
pub fn classify_error(err: &(dyn StdError + 'static)) -> TransportError {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(e) = current {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            if !matches!(TransportError::from_io(io), TransportError::Upstream(_)) {
                return TransportError::from_io(io);
            }
        }
        if e.to_string().contains("dns error") {
            return TransportError::HostNotFound;
        }
        current = e.source();
    }
    TransportError::Upstream(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, SocketAddr};
    use std::sync::Arc;

    use crate::routing::Target;

    fn options(target: &str) -> ForwardOptions {
        ForwardOptions::new(Target::parse(target).unwrap())
    }

    fn inbound(uri: &str) -> Request<Body> {
        let mut req = Request::builder()
            .uri(uri)
            .header("Host", "proxy.local:3000")
            .header("Connection", "keep-alive, x-session")
            .header("x-session", "abc")
            .header("keep-alive", "timeout=5")
            .header("accept", "application/json")
            .body(Body::empty())
            .unwrap();
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from((Ipv4Addr::new(10, 0, 0, 7), 51000))));
        req
    }

    #[test]
    fn test_upstream_uri_and_headers() {
        let upstream = build_upstream(inbound("/users?page=2"), &options("http://localhost:9000"), false).unwrap();

        assert_eq!(upstream.uri().to_string(), "http://localhost:9000/users?page=2");
        assert_eq!(upstream.headers()["host"], "proxy.local:3000");
        assert_eq!(upstream.headers()["accept"], "application/json");
        assert!(upstream.headers().get("connection").is_none());
        assert!(upstream.headers().get("keep-alive").is_none());
        assert!(upstream.headers().get("x-session").is_none());
        assert!(upstream.headers().get("x-forwarded-for").is_none());
    }

    #[test]
    fn test_change_origin() {
        let mut opts = options("http://backend.internal:8080");
        opts.change_origin = true;
        let upstream = build_upstream(inbound("/"), &opts, false).unwrap();
        assert_eq!(upstream.headers()["host"], "backend.internal:8080");
    }

    #[test]
    fn test_xfwd_headers() {
        let mut opts = options("http://localhost:9000");
        opts.xfwd = true;
        let mut req = inbound("/");
        req.headers_mut()
            .insert("x-forwarded-for", HeaderValue::from_static("192.0.2.1"));

        let upstream = build_upstream(req, &opts, false).unwrap();
        assert_eq!(upstream.headers()["x-forwarded-for"], "192.0.2.1, 10.0.0.7");
        assert_eq!(upstream.headers()["x-forwarded-proto"], "http");
        assert_eq!(upstream.headers()["x-forwarded-host"], "proxy.local:3000");
    }

    #[test]
    fn test_extra_headers_and_hook() {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_static("secret"));
        let mut opts = options("http://localhost:9000");
        opts.headers = Arc::new(headers);
        opts.on_proxy_req = Some(Arc::new(|req: &mut Request<Body>, _opts: &ForwardOptions| {
            req.headers_mut()
                .insert("x-hooked", HeaderValue::from_static("1"));
        }));

        let upstream = build_upstream(inbound("/"), &opts, false).unwrap();
        assert_eq!(upstream.headers()["x-api-key"], "secret");
        assert_eq!(upstream.headers()["x-hooked"], "1");
    }

    #[test]
    fn test_upgrade_keeps_handshake_headers() {
        let mut req = inbound("/socket");
        req.headers_mut()
            .insert("upgrade", HeaderValue::from_static("websocket"));
        req.headers_mut()
            .insert("connection", HeaderValue::from_static("Upgrade"));

        let upstream = build_upstream(req, &options("ws://localhost:9000"), true).unwrap();
        assert_eq!(upstream.uri().to_string(), "http://localhost:9000/socket");
        assert_eq!(upstream.headers()["upgrade"], "websocket");
        assert_eq!(upstream.headers()["connection"], "upgrade");
    }

    #[test]
    fn test_tls_target_unsupported() {
        let err = build_upstream(inbound("/"), &options("https://secure.example.com"), false).unwrap_err();
        assert_eq!(err, TransportError::UnsupportedScheme("https".into()));
        assert_eq!(err.code(), Some("EPROTO"));
    }

    #[test]
    fn test_classify_io_chain() {
        #[derive(Debug)]
        struct Wrapper(std::io::Error);
        impl std::fmt::Display for Wrapper {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("client error (Connect)")
            }
        }
        impl StdError for Wrapper {
            fn source(&self) -> Option<&(dyn StdError + 'static)> {
                Some(&self.0)
            }
        }

        let err = Wrapper(std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"));
        assert_eq!(classify_error(&err), TransportError::ConnectionRefused);

        let err = std::io::Error::new(std::io::ErrorKind::Other, "dns error: no such host");
        assert_eq!(classify_error(&err), TransportError::HostNotFound);
    }

    #[tokio::test]
    async fn test_forward_to_closed_port() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = HttpTransport::new(Duration::from_secs(1), Duration::from_secs(2));
        let err = transport
            .forward(inbound("/"), options(&format!("http://{}", addr)))
            .await
            .unwrap_err();
        assert_eq!(err, TransportError::ConnectionRefused);
        assert_eq!(err.status(), StatusCode::GATEWAY_TIMEOUT);
    }
}
