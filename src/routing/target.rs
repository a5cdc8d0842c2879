//! Upstream target addresses.

use std::fmt;
use std::str::FromStr;

use axum::http::Uri;
use url::Url;

use crate::error::ConfigError;

const SCHEMES: [&str; 4] = ["http", "https", "ws", "wss"];

/// An absolute upstream base address, e.g. `http://localhost:9000/base`.
///
/// Never empty: "no change" is expressed as `Option<Target>::None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    url: Url,
}

impl Target {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ConfigError::MissingTarget);
        }

        let url = Url::parse(raw).map_err(|e| ConfigError::invalid_target(raw, e.to_string()))?;

        if !SCHEMES.contains(&url.scheme()) {
            return Err(ConfigError::invalid_target(
                raw,
                format!("unsupported scheme `{}`", url.scheme()),
            ));
        }
        if url.host_str().is_none() {
            return Err(ConfigError::invalid_target(raw, "missing host"));
        }

        Ok(Self { url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn scheme(&self) -> &str {
        self.url.scheme()
    }

    /// `host[:port]`, with the port only when it is explicit.
    pub fn authority(&self) -> String {
        let host = self.url.host_str().unwrap_or_default();
        match self.url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        }
    }

    /// Join the target's base path with a request path and query.
    ///
    /// `http://up/base` + `/users?id=1` → `http://up/base/users?id=1`.
    /// WebSocket schemes are mapped to their HTTP equivalents.
    pub fn join(&self, path_and_query: &str) -> Result<Uri, axum::http::Error> {
        let scheme = match self.url.scheme() {
            "ws" => "http",
            "wss" => "https",
            other => other,
        };
        let base = self.url.path().trim_end_matches('/');
        let suffix = if path_and_query.starts_with('/') || path_and_query.is_empty() {
            path_and_query.to_string()
        } else {
            format!("/{}", path_and_query)
        };
        let mut path = format!("{}{}", base, suffix);
        if path.is_empty() {
            path.push('/');
        }

        Uri::builder()
            .scheme(scheme)
            .authority(self.authority())
            .path_and_query(path)
            .build()
    }
}

impl FromStr for Target {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Target::parse(s)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Url always renders a root path as "/"; drop it so targets print as configured.
        let rendered = self.url.as_str();
        if self.url.path() == "/" && self.url.query().is_none() {
            write!(f, "{}", rendered.trim_end_matches('/'))
        } else {
            write!(f, "{}", rendered)
        }
    }
}
