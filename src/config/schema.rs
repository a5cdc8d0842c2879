//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;

use axum::http::{HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ValidationError};
use crate::observability::{LogFormat, LogLevel};
use crate::proxy::options::ProxyOptions;
use crate::routing::{ContextFilter, PathRewriteConfig, Target, TargetRouter};

/// Root configuration for the proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration.
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Proxy mounts, installed in declaration order.
    pub mounts: Vec<MountConfig>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Timeout configuration for upstream calls.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Time allowed until upstream response headers arrive, in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Process-wide log level.
    pub log_level: LogLevel,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable the Prometheus endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Context as written in the config: one pattern or a list.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ContextConfig {
    One(String),
    Many(Vec<String>),
}

impl Default for ContextConfig {
    fn default() -> Self {
        ContextConfig::One("/".to_string())
    }
}

/// One proxy mount.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MountConfig {
    /// Mount identifier for logging/metrics.
    pub name: String,

    /// Which requests this mount handles.
    pub context: ContextConfig,

    /// Upstream base url.
    pub target: Option<String>,

    /// Forward WebSocket upgrades.
    pub ws: bool,

    /// Rewrite the `Host` header to the target.
    pub change_origin: bool,

    /// Add `x-forwarded-*` headers.
    pub xfwd: bool,

    /// Verbosity of this mount's own events.
    pub log_level: LogLevel,

    /// Extra upstream headers.
    pub headers: BTreeMap<String, String>,

    /// Regex key to replacement, applied in declaration order.
    pub path_rewrite: toml::Table,

    /// Host or host+path key to target url, checked in declaration order.
    pub router: toml::Table,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            name: "proxy".to_string(),
            context: ContextConfig::default(),
            target: None,
            ws: false,
            change_origin: false,
            xfwd: false,
            log_level: LogLevel::default(),
            headers: BTreeMap::new(),
            path_rewrite: toml::Table::new(),
            router: toml::Table::new(),
        }
    }
}

impl MountConfig {
    /// Compile this mount into a context filter and dispatcher options.
    pub fn compile(&self) -> Result<(ContextFilter, ProxyOptions), ConfigError> {
        let context = match &self.context {
            ContextConfig::One(context) => ContextFilter::parse(context)?,
            ContextConfig::Many(contexts) => ContextFilter::parse_list(contexts)?,
        };

        let target = Target::parse(self.target.as_deref().unwrap_or_default())?;
        let mut options = ProxyOptions::new(target)
            .name(self.name.clone())
            .ws(self.ws)
            .change_origin(self.change_origin)
            .xfwd(self.xfwd)
            .log_level(self.log_level);

        if !self.path_rewrite.is_empty() {
            let table = string_entries(&self.path_rewrite, |key, reason| {
                ConfigError::invalid_rewrite(key, reason)
            })?;
            options = options.path_rewrite(PathRewriteConfig::from_table(table)?);
        }

        if !self.router.is_empty() {
            let table = string_entries(&self.router, |key, reason| {
                ConfigError::invalid_router(key, reason)
            })?;
            options = options.router(TargetRouter::from_table(table)?);
        }

        for (name, value) in &self.headers {
            let scope = format!("mounts[{}].headers", self.name);
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ConfigError::Validation(vec![ValidationError::new(scope.clone(), e)]))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|e| ConfigError::Validation(vec![ValidationError::new(scope, e)]))?;
            options = options.header(header_name, header_value);
        }

        Ok((context, options))
    }
}

/// Table entries whose values must all be strings, in declaration order.
fn string_entries<'a>(
    table: &'a toml::Table,
    invalid: fn(String, &'static str) -> ConfigError,
) -> Result<Vec<(&'a str, &'a str)>, ConfigError> {
    table
        .iter()
        .map(|(key, value)| match value.as_str() {
            Some(s) => Ok((key.as_str(), s)),
            None => Err(invalid(key.clone(), "value must be a string")),
        })
        .collect()
}
