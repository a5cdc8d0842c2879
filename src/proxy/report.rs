//! Transport error reporting.
//!
//! Terminal sink on the failure path: one structured `error` event per
//! failed forward, plus the default failure response.

use axum::response::{IntoResponse, Response};

use crate::error::TransportError;
use crate::http::request::RequestParts;
use crate::observability::metrics;
use crate::proxy::options::ForwardOptions;
use crate::routing::Target;

pub const ERROR_REFERENCE: &str = "https://nodejs.org/api/errors.html#errors_common_system_errors";

/// Fields of one error record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    pub path: String,
    pub hostname: String,
    pub target: String,
    pub code: String,
    pub reference: &'static str,
}

impl ErrorRecord {
    pub fn new(err: &TransportError, req: &RequestParts, target: &Target) -> Self {
        Self {
            path: req.original_path().to_string(),
            hostname: req.hostname().unwrap_or("unknown").to_string(),
            target: target_host(target),
            code: err.code().map(str::to_string).unwrap_or_else(|| err.to_string()),
            reference: ERROR_REFERENCE,
        }
    }
}

/// Host of the target when it has one, the raw target otherwise.
fn target_host(target: &Target) -> String {
    let authority = target.authority();
    if authority.is_empty() {
        target.to_string()
    } else {
        authority
    }
}

/// Log a transport failure. Never fails.
pub fn report(err: &TransportError, req: &RequestParts, options: &ForwardOptions) -> ErrorRecord {
    let record = ErrorRecord::new(err, req, &options.target);
    tracing::error!(
        path = %record.path,
        hostname = %record.hostname,
        target = %record.target,
        code = %record.code,
        reference = record.reference,
        "Error occurred while trying to proxy request"
    );
    metrics::record_error(&record.code);
    record
}

/// Default failure response: status from the error, body naming the target.
pub fn default_error_response(err: &TransportError, req: &RequestParts, options: &ForwardOptions) -> Response {
    let body = format!(
        "Error occurred while trying to proxy to: {}{}",
        req.hostname().unwrap_or_else(|| options.target.url().host_str().unwrap_or_default()),
        req.original_path()
    );
    (err.status(), body).into_response()
}
