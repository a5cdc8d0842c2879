//! Request descriptor.
//!
//! # Responsibilities
//! - Capture the routing-relevant view of a request (method, uri, headers)
//! - Recover the original uri when the host framework rewrote it (nesting)
//! - Provide the ordered hostname fallback shared by HTTP and upgrade flows
//!
//! # Design Decisions
//! - Built once per request, before any rewrite, and never mutated after
//! - Cheap enough to clone into hooks and log events

use axum::extract::OriginalUri;
use axum::http::{header, HeaderMap, Method, Request, Uri};

/// Effective view of an inbound request used by the dispatch pipeline.
#[derive(Debug, Clone)]
pub struct RequestParts {
    pub method: Method,
    /// Current uri as seen by this middleware.
    pub uri: Uri,
    /// Uri before any internal rewrite by the host framework.
    pub original_uri: Uri,
    pub headers: HeaderMap,
}

/// Accessors tried in order when looking for the request's hostname.
///
/// Plain requests carry the `Host` header; upgrade requests rebuilt by some
/// clients only carry the authority in the request target.
const HOSTNAME_SOURCES: [fn(&RequestParts) -> Option<&str>; 2] = [host_from_header, host_from_uri];

fn host_from_header(parts: &RequestParts) -> Option<&str> {
    parts.headers.get(header::HOST).and_then(|v| v.to_str().ok())
}

fn host_from_uri(parts: &RequestParts) -> Option<&str> {
    parts.original_uri.host().or_else(|| parts.uri.host())
}

impl RequestParts {
    pub fn from_request<B>(req: &Request<B>) -> Self {
        let original_uri = req
            .extensions()
            .get::<OriginalUri>()
            .map(|o| o.0.clone())
            .unwrap_or_else(|| req.uri().clone());

        Self {
            method: req.method().clone(),
            uri: req.uri().clone(),
            original_uri,
            headers: req.headers().clone(),
        }
    }

    /// Path used for context matching and routing: the original path and query.
    pub fn original_path(&self) -> &str {
        self.original_uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or_else(|| self.original_uri.path())
    }

    /// `Host` header value, if any.
    pub fn host_header(&self) -> Option<&str> {
        host_from_header(self)
    }

    /// Best-effort hostname, following [`HOSTNAME_SOURCES`].
    pub fn hostname(&self) -> Option<&str> {
        HOSTNAME_SOURCES.iter().find_map(|source| source(self))
    }
}

/// Strip query string and fragment from a request path.
pub fn path_only(path: &str) -> &str {
    let end = path.find(['?', '#']).unwrap_or(path.len());
    &path[..end]
}

/// Returns true if the headers describe an HTTP/1.1 upgrade handshake.
pub fn is_upgrade_request(headers: &HeaderMap) -> bool {
    let connection_upgrade = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"));

    connection_upgrade && headers.contains_key(header::UPGRADE)
}
