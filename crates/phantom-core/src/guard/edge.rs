//! ============================================================================
//! Edge Guard - Coarse credential check before a protected path is served
//! ============================================================================
//! Only knows whether a session credential is attached. Tier and permission
//! checks are deferred to the view guard; a missing credential on a
//! protected path always redirects.
//! ============================================================================

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::EnforcementPoint;

/// Protected-path rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "match", content = "path", rename_all = "snake_case")]
pub enum PathRule {
    /// Path starts with the given prefix
    Prefix(String),
    /// Path equals the given string
    Exact(String),
}

impl PathRule {
    /// Case-sensitive, no wildcards
    pub fn matches(&self, path: &str) -> bool {
        match self {
            PathRule::Prefix(prefix) => path.starts_with(prefix.as_str()),
            PathRule::Exact(exact) => path == exact.as_str(),
        }
    }
}

/// What the edge sees of an incoming request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeRequest {
    pub path: String,
    pub credential_present: bool,
}

impl EdgeRequest {
    pub fn new(path: impl Into<String>, credential_present: bool) -> Self {
        Self {
            path: path.into(),
            credential_present,
        }
    }

    /// Build from a raw `Cookie` header. Only presence of a non-empty value
    /// for `cookie_name` matters; the value itself is never inspected.
    pub fn from_cookie_header(
        path: impl Into<String>,
        cookie_header: Option<&str>,
        cookie_name: &str,
    ) -> Self {
        let credential_present = cookie_header
            .map(|header| {
                header.split(';').any(|pair| {
                    pair.trim()
                        .split_once('=')
                        .map(|(name, value)| name == cookie_name && !value.is_empty())
                        .unwrap_or(false)
                })
            })
            .unwrap_or(false);
        Self::new(path, credential_present)
    }
}

/// Edge verdict
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "location", rename_all = "snake_case")]
pub enum EdgeDecision {
    /// No protected rule matched
    Unguarded,
    /// Protected and a credential is present; fine-grained checks happen downstream
    Proceed,
    /// Protected and no credential
    Redirect(String),
}

/// Network-edge enforcement point
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeGuard {
    rules: Vec<PathRule>,
    fallback: String,
}

impl Default for EdgeGuard {
    fn default() -> Self {
        Self::new(
            vec![
                PathRule::Prefix("/dashboard/tools".to_string()),
                PathRule::Exact("/dashboard/upgrade".to_string()),
            ],
            "/dashboard",
        )
    }
}

impl EdgeGuard {
    pub fn new(rules: Vec<PathRule>, fallback: impl Into<String>) -> Self {
        Self {
            rules,
            fallback: fallback.into(),
        }
    }

    pub fn rules(&self) -> &[PathRule] {
        &self.rules
    }

    pub fn fallback(&self) -> &str {
        &self.fallback
    }

    /// First matching rule, in declaration order
    pub fn matching_rule(&self, path: &str) -> Option<&PathRule> {
        self.rules.iter().find(|rule| rule.matches(path))
    }
}

impl EnforcementPoint for EdgeGuard {
    type Input<'a> = &'a EdgeRequest;
    type Verdict = EdgeDecision;

    fn enforce<'a>(&self, request: &'a EdgeRequest) -> EdgeDecision {
        let Some(rule) = self.matching_rule(&request.path) else {
            return EdgeDecision::Unguarded;
        };

        if request.credential_present {
            debug!("Edge: {} matched {:?}, credential present", request.path, rule);
            EdgeDecision::Proceed
        } else {
            warn!(
                "Edge: {} matched {:?} without credential, redirecting to {}",
                request.path, rule, self.fallback
            );
            EdgeDecision::Redirect(self.fallback.clone())
        }
    }
}
