//! Error types.
//!
//! Two families:
//! - [`ConfigError`]: raised while building a dispatch pipeline or loading
//!   the configuration file. Always fatal, always before the first request.
//! - [`TransportError`]: raised by the transport engine for a single request.
//!   Never propagated out of the middleware; reported and turned into a
//!   response instead.

use std::time::Duration;

use axum::http::StatusCode;
use thiserror::Error;

/// Error raised while compiling a dispatch pipeline or loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("configuration validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),

    #[error("invalid context `{context}`: {reason}")]
    InvalidContext { context: String, reason: String },

    #[error("missing target option")]
    MissingTarget,

    #[error("invalid target `{target}`: {reason}")]
    InvalidTarget { target: String, reason: String },

    #[error("invalid path rewrite rule `{key}`: {reason}")]
    InvalidRewrite { key: String, reason: String },

    #[error("invalid router entry `{key}`: {reason}")]
    InvalidRouter { key: String, reason: String },
}

impl ConfigError {
    pub fn invalid_context(context: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidContext {
            context: context.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_target(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidTarget {
            target: target.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_rewrite(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRewrite {
            key: key.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_router(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRouter {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// A single semantic problem found in a configuration file.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{scope}: {message}")]
pub struct ValidationError {
    /// Where the problem is (`listener`, `mounts[api]`, ...).
    pub scope: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(scope: impl Into<String>, message: impl ToString) -> Self {
        Self {
            scope: scope.into(),
            message: message.to_string(),
        }
    }
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Error raised by the transport engine while forwarding one request.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("connection refused")]
    ConnectionRefused,

    #[error("connection reset")]
    ConnectionReset,

    #[error("upstream host not found")]
    HostNotFound,

    #[error("upstream timed out after {0:?}")]
    Timeout(Duration),

    #[error("unsupported target scheme `{0}`")]
    UnsupportedScheme(String),

    #[error("invalid upstream uri: {0}")]
    InvalidUri(String),

    #[error("{0}")]
    Upstream(String),
}

impl TransportError {
    /// Stable, system-style error code, when one applies.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            TransportError::ConnectionRefused => Some("ECONNREFUSED"),
            TransportError::ConnectionReset => Some("ECONNRESET"),
            TransportError::HostNotFound => Some("ENOTFOUND"),
            TransportError::Timeout(_) => Some("ETIMEDOUT"),
            TransportError::UnsupportedScheme(_) => Some("EPROTO"),
            TransportError::InvalidUri(_) | TransportError::Upstream(_) => None,
        }
    }

    /// Status code of the default failure response.
    pub fn status(&self) -> StatusCode {
        match self {
            TransportError::ConnectionRefused
            | TransportError::ConnectionReset
            | TransportError::HostNotFound
            | TransportError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Classify an I/O error found while talking to the upstream.
    pub fn from_io(err: &std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::ConnectionRefused => TransportError::ConnectionRefused,
            ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted | ErrorKind::BrokenPipe => {
                TransportError::ConnectionReset
            }
            ErrorKind::TimedOut => TransportError::Timeout(Duration::ZERO),
            _ => TransportError::Upstream(err.to_string()),
        }
    }
}
