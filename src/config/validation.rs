//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses and value ranges (timeouts > 0)
//! - Compile every mount once so bad contexts, targets, rewrite and router
//!   tables are caught before serving
//! - Detect duplicate mount names
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use crate::config::schema::ProxyConfig;
use crate::error::{ConfigError, ValidationError};

/// Check a parsed configuration, collecting every problem found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener",
            format!("invalid bind address `{}`", config.listener.bind_address),
        ));
    }

    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::new("timeouts", "connect_secs must be greater than 0"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts", "request_secs must be greater than 0"));
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::new(
            "observability",
            format!("invalid metrics address `{}`", config.observability.metrics_address),
        ));
    }

    let mut names = HashSet::new();
    for (index, mount) in config.mounts.iter().enumerate() {
        let scope = if mount.name.is_empty() {
            format!("mounts[{}]", index)
        } else {
            format!("mounts[{}]", mount.name)
        };

        if mount.name.is_empty() {
            errors.push(ValidationError::new(scope.clone(), "name must not be empty"));
        } else if !names.insert(mount.name.as_str()) {
            errors.push(ValidationError::new(scope.clone(), "duplicate mount name"));
        }

        match mount.compile() {
            Ok(_) => {}
            Err(ConfigError::Validation(nested)) => errors.extend(nested),
            Err(e) => errors.push(ValidationError::new(scope, e)),
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::MountConfig;

    fn mount(name: &str, target: &str) -> MountConfig {
        MountConfig {
            name: name.to_string(),
            target: Some(target.to_string()),
            ..MountConfig::default()
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&ProxyConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = ProxyConfig::default();
        config.listener.bind_address = "not-an-address".to_string();
        config.timeouts.request_secs = 0;
        config.mounts = vec![
            mount("api", "http://localhost:9000"),
            mount("api", "http://localhost:9001"),
            MountConfig {
                name: "orphan".to_string(),
                ..MountConfig::default()
            },
        ];

        let errors = validate_config(&config).unwrap_err();
        let scopes: Vec<_> = errors.iter().map(|e| e.scope.as_str()).collect();
        assert_eq!(scopes, vec!["listener", "timeouts", "mounts[api]", "mounts[orphan]"]);
        assert!(errors[3].message.contains("missing target"));
    }

    #[test]
    fn test_invalid_target_reported() {
        let mut config = ProxyConfig::default();
        config.mounts = vec![mount("api", "ftp://localhost")];
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].scope, "mounts[api]");
    }

    #[test]
    fn test_bad_header_reported_under_headers_scope() {
        let mut api = mount("api", "http://localhost:9000");
        api.headers.insert("bad header".to_string(), "x".to_string());
        let config = ProxyConfig {
            mounts: vec![api],
            ..ProxyConfig::default()
        };
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].scope, "mounts[api].headers");
    }
}
