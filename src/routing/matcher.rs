//! Context matching logic.
//!
//! # Responsibilities
//! - Decide whether a request is in scope for a proxy mount
//! - Compile user-supplied contexts (prefixes, globs, regex) once
//!
//! # Design Decisions
//! - Literal contexts are path prefixes (case-sensitive, query ignored)
//! - Glob contexts: `*` stays inside a segment, `**` crosses segments,
//!   a leading `!` excludes
//! - Mixing literal and glob entries in one list is rejected at build time
//! - Matching itself never fails

use std::fmt;
use std::sync::Arc;

use glob::{MatchOptions, Pattern};
use regex::Regex;

use crate::error::ConfigError;
use crate::http::request::{path_only, RequestParts};

/// Custom context predicate, called with `(path, request)`.
pub type ContextPredicate = Arc<dyn Fn(&str, &RequestParts) -> bool + Send + Sync>;

const GLOB_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Compiled request scope of a proxy mount.
#[derive(Clone)]
pub enum ContextFilter {
    /// Path starts with the prefix.
    Prefix(String),
    /// Path starts with any of the prefixes.
    Prefixes(Vec<String>),
    /// Path matches the glob set.
    Patterns(GlobSet),
    /// Whole path matches the expression.
    Regex(Regex),
    Predicate(ContextPredicate),
}

impl ContextFilter {
    /// Compile a single context string.
    pub fn parse(context: &str) -> Result<Self, ConfigError> {
        if context.is_empty() {
            return Err(ConfigError::invalid_context(context, "context must not be empty"));
        }
        if is_glob(context) {
            Ok(ContextFilter::Patterns(GlobSet::new([context])?))
        } else {
            Ok(ContextFilter::Prefix(context.to_string()))
        }
    }

    /// Compile a list of contexts. All entries must be of the same kind.
    pub fn parse_list<S: AsRef<str>>(contexts: &[S]) -> Result<Self, ConfigError> {
        match contexts {
            [] => Err(ConfigError::invalid_context("[]", "context list must not be empty")),
            [single] => Self::parse(single.as_ref()),
            many => {
                let entries: Vec<&str> = many.iter().map(AsRef::as_ref).collect();
                if let Some(empty) = entries.iter().find(|e| e.is_empty()) {
                    return Err(ConfigError::invalid_context(*empty, "context must not be empty"));
                }

                let globs = entries.iter().filter(|e| is_glob(e)).count();
                if globs == 0 {
                    Ok(ContextFilter::Prefixes(
                        entries.iter().map(|e| e.to_string()).collect(),
                    ))
                } else if globs == entries.len() {
                    Ok(ContextFilter::Patterns(GlobSet::new(entries)?))
                } else {
                    Err(ConfigError::invalid_context(
                        entries.join(", "),
                        "cannot mix path prefixes and glob patterns",
                    ))
                }
            }
        }
    }

    /// Compile a regular expression that must match the whole path.
    pub fn regex(pattern: &str) -> Result<Self, ConfigError> {
        Regex::new(&format!("^(?:{})$", pattern))
            .map(ContextFilter::Regex)
            .map_err(|e| ConfigError::invalid_context(pattern, e.to_string()))
    }

    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&str, &RequestParts) -> bool + Send + Sync + 'static,
    {
        ContextFilter::Predicate(Arc::new(f))
    }

    /// Returns true if the request is in scope.
    pub fn matches(&self, path: &str, req: &RequestParts) -> bool {
        match self {
            ContextFilter::Prefix(prefix) => path_only(path).starts_with(prefix.as_str()),
            ContextFilter::Prefixes(prefixes) => {
                let path = path_only(path);
                prefixes.iter().any(|p| path.starts_with(p.as_str()))
            }
            ContextFilter::Patterns(set) => set.matches(path_only(path)),
            ContextFilter::Regex(re) => re.is_match(path_only(path)),
            ContextFilter::Predicate(f) => f(path_only(path), req),
        }
    }
}

impl fmt::Debug for ContextFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextFilter::Prefix(p) => f.debug_tuple("Prefix").field(p).finish(),
            ContextFilter::Prefixes(p) => f.debug_tuple("Prefixes").field(p).finish(),
            ContextFilter::Patterns(set) => f.debug_tuple("Patterns").field(set).finish(),
            ContextFilter::Regex(re) => f.debug_tuple("Regex").field(&re.as_str()).finish(),
            ContextFilter::Predicate(_) => f.write_str("Predicate(<fn>)"),
        }
    }
}

impl fmt::Display for ContextFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextFilter::Prefix(p) => write!(f, "{}", p),
            ContextFilter::Prefixes(p) => write!(f, "[{}]", p.join(", ")),
            ContextFilter::Patterns(set) => write!(f, "[{}]", set.sources.join(", ")),
            ContextFilter::Regex(re) => write!(f, "{}", re.as_str()),
            ContextFilter::Predicate(_) => f.write_str("<predicate>"),
        }
    }
}

/// Glob patterns with optional `!` exclusions.
#[derive(Debug, Clone)]
pub struct GlobSet {
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
    sources: Vec<String>,
}

impl GlobSet {
    pub fn new<'a>(patterns: impl IntoIterator<Item = &'a str>) -> Result<Self, ConfigError> {
        let mut set = GlobSet {
            include: Vec::new(),
            exclude: Vec::new(),
            sources: Vec::new(),
        };

        for raw in patterns {
            let (negated, body) = match raw.strip_prefix('!') {
                Some(rest) => (true, rest),
                None => (false, raw),
            };
            let pattern =
                Pattern::new(body).map_err(|e| ConfigError::invalid_context(raw, e.msg))?;
            if negated {
                set.exclude.push(pattern);
            } else {
                set.include.push(pattern);
            }
            set.sources.push(raw.to_string());
        }

        Ok(set)
    }

    /// At least one positive pattern matches (or there are none) and no
    /// exclusion matches.
    pub fn matches(&self, path: &str) -> bool {
        let included = self.include.is_empty()
            || self
                .include
                .iter()
                .any(|p| p.matches_with(path, GLOB_OPTIONS));

        included
            && !self
                .exclude
                .iter()
                .any(|p| p.matches_with(path, GLOB_OPTIONS))
    }
}

/// Returns true if the context string uses glob syntax.
pub fn is_glob(context: &str) -> bool {
    context.starts_with('!') || context.contains(['*', '?', '['])
}
