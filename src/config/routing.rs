//! Route table: upstream selection by requested model name.
//!
//! A route binds a request-facing model name to an upstream provider. Routes
//! are immutable once loaded; the table is consulted on every inbound
//! request and never mutated.

use anyhow::{bail, Context, Result};
use serde::Deserialize;

// ─────────────────────────────────────────────────────────────────────────────
// Upstream protocol
// ─────────────────────────────────────────────────────────────────────────────

/// Wire protocol spoken by an upstream provider.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UpstreamProtocol {
    #[default]
    Anthropic,
    Openai,
}

impl UpstreamProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::Openai => "openai",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// File-level (deserialized) shapes
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamFile {
    #[serde(default)]
    pub provider: UpstreamProtocol,
    pub base_url: String,
    /// Model name to send upstream. Falls back to the route's request model.
    pub model: Option<String>,
    /// Direct API key value (discouraged; prefer `api_key_ref`).
    pub api_key: Option<String>,
    /// `ENV:NAME` reference, resolved against the process environment at load time.
    pub api_key_ref: Option<String>,
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RouteFile {
    pub name: String,
    /// Alternative lookup key. Defaults to `name` when absent.
    pub request_model: Option<String>,
    pub upstream: UpstreamFile,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct DefaultsFile {
    pub timeout_seconds: Option<u64>,
}

/// Resolve an `api_key` / `api_key_ref` pair into a concrete secret.
///
/// `api_key_ref` of the form `ENV:NAME` takes precedence over `api_key` and is
/// looked up in the process environment; a plain `api_key` is used otherwise.
fn resolve_api_key(api_key: &Option<String>, api_key_ref: &Option<String>) -> Result<String> {
    if let Some(reference) = api_key_ref {
        let Some(env_name) = reference.strip_prefix("ENV:") else {
            bail!("api_key_ref {reference:?} must be of the form ENV:NAME");
        };
        return std::env::var(env_name)
            .with_context(|| format!("environment variable {env_name} is not set"));
    }
    if let Some(key) = api_key {
        return Ok(key.clone());
    }
    bail!("route upstream has neither api_key nor api_key_ref set");
}

// ─────────────────────────────────────────────────────────────────────────────
// Route (resolved, immutable)
// ─────────────────────────────────────────────────────────────────────────────

/// A single immutable upstream binding.
#[derive(Debug, Clone)]
pub struct Route {
    pub name: String,
    pub request_model: String,
    pub upstream_protocol: UpstreamProtocol,
    pub upstream_base_url: String,
    pub upstream_model: String,
    pub upstream_api_key: String,
    pub timeout_seconds: u64,
}

impl Route {
    fn from_file(file: RouteFile, default_timeout: u64) -> Result<Self> {
        let request_model = file.request_model.unwrap_or_else(|| file.name.clone());
        let upstream_model = file
            .upstream
            .model
            .clone()
            .unwrap_or_else(|| request_model.clone());
        let upstream_api_key = resolve_api_key(&file.upstream.api_key, &file.upstream.api_key_ref)
            .with_context(|| format!("resolving api key for route {:?}", file.name))?;
        Ok(Route {
            name: file.name,
            request_model,
            upstream_protocol: file.upstream.provider,
            upstream_base_url: file.upstream.base_url,
            upstream_model,
            upstream_api_key,
            timeout_seconds: file.upstream.timeout_seconds.unwrap_or(default_timeout),
        })
    }

    fn is_wildcard(&self) -> bool {
        self.name == "*" || self.request_model == "*"
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Route table
// ─────────────────────────────────────────────────────────────────────────────

/// Ordered, duplicate-free collection of routes.
///
/// Lookup is deterministic: exact `name`, then exact `request_model`, then a
/// single permitted wildcard entry, else a miss.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn from_files(files: Vec<RouteFile>, default_timeout: u64) -> Result<Self> {
        let mut routes = Vec::with_capacity(files.len());
        for file in files {
            routes.push(Route::from_file(file, default_timeout)?);
        }
        Self::new(routes)
    }

    pub fn new(routes: Vec<Route>) -> Result<Self> {
        let mut seen_names = std::collections::HashSet::new();
        let mut wildcard_seen = false;
        for route in &routes {
            if !seen_names.insert(route.name.clone()) {
                bail!("duplicate route name {:?}", route.name);
            }
            if route.is_wildcard() {
                if wildcard_seen {
                    bail!("at most one wildcard route is permitted");
                }
                wildcard_seen = true;
            }
        }
        Ok(Self { routes })
    }

    /// Deterministic route lookup per the §3 matching rule.
    pub fn match_model(&self, requested: &str) -> Option<&Route> {
        self.routes
            .iter()
            .find(|r| r.name == requested)
            .or_else(|| self.routes.iter().find(|r| r.request_model == requested))
            .or_else(|| self.routes.iter().find(|r| r.is_wildcard()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(name: &str, request_model: &str, wildcard: bool) -> Route {
        Route {
            name: if wildcard { "*".into() } else { name.into() },
            request_model: request_model.into(),
            upstream_protocol: UpstreamProtocol::Openai,
            upstream_base_url: "http://up".into(),
            upstream_model: "m".into(),
            upstream_api_key: "k".into(),
            timeout_seconds: 30,
        }
    }

    #[test]
    fn matches_exact_name_first() {
        let table = RouteTable::new(vec![route("a", "x", false), route("b", "a", false)]).unwrap();
        assert_eq!(table.match_model("a").unwrap().name, "a");
    }

    #[test]
    fn falls_back_to_request_model() {
        let table = RouteTable::new(vec![route("b", "modelname", false)]).unwrap();
        assert_eq!(table.match_model("modelname").unwrap().name, "b");
    }

    #[test]
    fn falls_back_to_wildcard() {
        let table = RouteTable::new(vec![route("*", "*", true)]).unwrap();
        assert!(table.match_model("whatever").is_some());
    }

    #[test]
    fn miss_returns_none() {
        let table = RouteTable::new(vec![route("a", "x", false)]).unwrap();
        assert!(table.match_model("y").is_none());
    }

    #[test]
    fn rejects_duplicate_names() {
        let err = RouteTable::new(vec![route("a", "x", false), route("a", "y", false)]);
        assert!(err.is_err());
    }

    #[test]
    fn rejects_second_wildcard() {
        let err = RouteTable::new(vec![route("*", "*", true), route("*", "*", true)]);
        assert!(err.is_err());
    }

    #[test]
    fn resolves_env_api_key_ref() {
        std::env::set_var("LLM_RELAY_TEST_KEY", "secret123");
        let resolved = resolve_api_key(&None, &Some("ENV:LLM_RELAY_TEST_KEY".to_string())).unwrap();
        assert_eq!(resolved, "secret123");
    }
}
