//! Path rewriting.
//!
//! # Responsibilities
//! - Compile a rewrite configuration into a [`PathRewriter`]
//! - Apply the first matching rule, once, to a request path
//!
//! # Design Decisions
//! - Rules keep their declaration order; the first match wins
//! - An empty rule table produces no rewriter at all
//! - "No rule matched" is `None`, never the unchanged path

use std::fmt;
use std::sync::Arc;

use regex::Regex;
use tracing::Level;

use crate::error::ConfigError;
use crate::http::request::RequestParts;
use crate::observability::LogLevel;

/// Custom rewrite function, called with `(path, request)`.
pub type RewriteFn = Arc<dyn Fn(&str, &RequestParts) -> Option<String> + Send + Sync>;

/// How a rule recognizes the part of the path it replaces.
#[derive(Debug, Clone)]
pub enum RewriteKey {
    /// Plain substring, replaced once.
    Literal(String),
    /// Regular expression; the first match is replaced and `$n` captures expand.
    Pattern(Regex),
}

#[derive(Debug, Clone)]
pub struct RewriteRule {
    key: RewriteKey,
    replacement: String,
}

impl RewriteRule {
    pub fn literal(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            key: RewriteKey::Literal(from.into()),
            replacement: to.into(),
        }
    }

    pub fn pattern(from: &str, to: impl Into<String>) -> Result<Self, ConfigError> {
        let re = Regex::new(from).map_err(|e| ConfigError::invalid_rewrite(from, e.to_string()))?;
        Ok(Self {
            key: RewriteKey::Pattern(re),
            replacement: to.into(),
        })
    }

    pub fn key(&self) -> &RewriteKey {
        &self.key
    }

    pub fn replacement(&self) -> &str {
        &self.replacement
    }

    fn apply(&self, path: &str) -> Option<String> {
        match &self.key {
            RewriteKey::Literal(from) if path.contains(from.as_str()) => {
                Some(path.replacen(from.as_str(), &self.replacement, 1))
            }
            RewriteKey::Pattern(re) if re.is_match(path) => {
                Some(re.replacen(path, 1, self.replacement.as_str()).into_owned())
            }
            _ => None,
        }
    }
}

impl fmt::Display for RewriteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RewriteKey::Literal(s) => write!(f, "{}", s),
            RewriteKey::Pattern(re) => write!(f, "{}", re.as_str()),
        }
    }
}

/// Rewrite configuration as supplied by the user.
#[derive(Clone)]
pub enum PathRewriteConfig {
    Rules(Vec<RewriteRule>),
    Function(RewriteFn),
}

impl PathRewriteConfig {
    /// Build a rule table whose keys are regular expressions, in iteration order.
    pub fn from_table<I, K, V>(table: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        table
            .into_iter()
            .map(|(k, v)| RewriteRule::pattern(k.as_ref(), v))
            .collect::<Result<Vec<_>, _>>()
            .map(PathRewriteConfig::Rules)
    }

    pub fn function<F>(f: F) -> Self
    where
        F: Fn(&str, &RequestParts) -> Option<String> + Send + Sync + 'static,
    {
        PathRewriteConfig::Function(Arc::new(f))
    }
}

impl fmt::Debug for PathRewriteConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathRewriteConfig::Rules(rules) => f.debug_tuple("Rules").field(rules).finish(),
            PathRewriteConfig::Function(_) => f.write_str("Function(<fn>)"),
        }
    }
}

/// Compiled rewriter.
#[derive(Clone)]
pub enum PathRewriter {
    Rules(Arc<[RewriteRule]>),
    Function(RewriteFn),
}

impl PathRewriter {
    /// Compile a rewrite configuration.
    ///
    /// Returns `None` when there is nothing to do (no config, or an empty
    /// rule table), so callers can skip the rewrite step entirely. Each rule
    /// is logged at info level when `log_level` allows it.
    pub fn build(config: Option<&PathRewriteConfig>, log_level: LogLevel) -> Option<Self> {
        match config? {
            PathRewriteConfig::Rules(rules) if rules.is_empty() => None,
            PathRewriteConfig::Rules(rules) => {
                if log_level.allows(Level::INFO) {
                    for rule in rules {
                        tracing::info!(
                            from = %rule.key,
                            to = %rule.replacement,
                            "rewrite rule created"
                        );
                    }
                }
                Some(PathRewriter::Rules(rules.clone().into()))
            }
            PathRewriteConfig::Function(f) => Some(PathRewriter::Function(f.clone())),
        }
    }

    /// Rewrite a path, or `None` when no rule applies.
    pub fn rewrite(&self, path: &str, req: &RequestParts) -> Option<String> {
        match self {
            PathRewriter::Rules(rules) => rules.iter().find_map(|rule| rule.apply(path)),
            PathRewriter::Function(f) => f(path, req),
        }
    }
}

impl fmt::Debug for PathRewriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathRewriter::Rules(rules) => f.debug_tuple("Rules").field(&rules.len()).finish(),
            PathRewriter::Function(_) => f.write_str("Function(<fn>)"),
        }
    }
}
