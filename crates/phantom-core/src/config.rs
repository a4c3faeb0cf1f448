//! ============================================================================
//! Gate Configuration - Environment-driven settings
//! ============================================================================
//! Every field has a documented default; `from_env` overrides from
//! PHANTOM_* variables (load `.env` with dotenvy before calling).
//! ============================================================================

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::access::{DefaultPolicy, Requirement, ResourceRegistry, Tier};
use crate::error::ConfigError;
use crate::guard::{DenialMode, EdgeGuard, PathRule, ViewGuard};

/// Gate configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateConfig {
    /// Cookie whose presence the edge guard checks
    pub session_cookie: String,
    /// Where identity-less visitors are sent
    pub entry_path: String,
    /// Where identities that fail a requirement are sent
    pub fallback_path: String,
    /// Protected paths, first match wins
    pub protected: Vec<PathRule>,
    pub default_policy: DefaultPolicy,
    /// Extra tier-gated resources, layered over the built-in table
    pub tier_overrides: BTreeMap<String, Tier>,
    pub denial_mode: DenialMode,
    pub db_path: Option<String>,
    /// Identity seeded with the council-admin role on first run
    pub bootstrap_admin: Option<String>,
}

impl Default for GateConfig {
    fn default() -> Self {
        let edge = EdgeGuard::default();
        Self {
            session_cookie: "phantom_session".to_string(),
            entry_path: "/".to_string(),
            fallback_path: edge.fallback().to_string(),
            protected: edge.rules().to_vec(),
            default_policy: DefaultPolicy::EntryLevel,
            tier_overrides: BTreeMap::new(),
            denial_mode: DenialMode::ShowReason,
            db_path: None,
            bootstrap_admin: None,
        }
    }
}

impl GateConfig {
    /// Defaults overridden by PHANTOM_* environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env` with an injectable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = lookup("PHANTOM_SESSION_COOKIE") {
            if v.is_empty() || v.contains(|c: char| c == '=' || c == ';' || c.is_whitespace()) {
                return Err(ConfigError::Invalid {
                    key: "PHANTOM_SESSION_COOKIE",
                    reason: format!("'{}' is not a valid cookie name", v),
                });
            }
            config.session_cookie = v;
        }
        if let Some(v) = lookup("PHANTOM_ENTRY_PATH") {
            config.entry_path = require_path("PHANTOM_ENTRY_PATH", v)?;
        }
        if let Some(v) = lookup("PHANTOM_FALLBACK_PATH") {
            config.fallback_path = require_path("PHANTOM_FALLBACK_PATH", v)?;
        }

        let prefixes = lookup("PHANTOM_PROTECTED_PREFIXES");
        let exact = lookup("PHANTOM_PROTECTED_EXACT");
        if prefixes.is_some() || exact.is_some() {
            let mut rules = Vec::new();
            for p in split_list(prefixes.as_deref()) {
                rules.push(PathRule::Prefix(require_path("PHANTOM_PROTECTED_PREFIXES", p)?));
            }
            for p in split_list(exact.as_deref()) {
                rules.push(PathRule::Exact(require_path("PHANTOM_PROTECTED_EXACT", p)?));
            }
            config.protected = rules;
        }

        if let Some(v) = lookup("PHANTOM_DEFAULT_POLICY") {
            config.default_policy = match v.as_str() {
                "entry-level" => DefaultPolicy::EntryLevel,
                "deny" => DefaultPolicy::Deny,
                _ => {
                    return Err(ConfigError::Invalid {
                        key: "PHANTOM_DEFAULT_POLICY",
                        reason: format!("'{}' (expected entry-level or deny)", v),
                    })
                }
            };
        }
        // resource=TIER pairs; an unknown tier requires the highest one
        for pair in split_list(lookup("PHANTOM_RESOURCE_TIERS").as_deref()) {
            let (resource, tier) = pair.split_once('=').ok_or_else(|| ConfigError::Invalid {
                key: "PHANTOM_RESOURCE_TIERS",
                reason: format!("'{}' (expected resource=TIER)", pair),
            })?;
            config
                .tier_overrides
                .insert(resource.trim().to_string(), Tier::fail_closed_required(tier.trim()));
        }

        if let Some(v) = lookup("PHANTOM_DENIAL_MODE") {
            config.denial_mode = match v.as_str() {
                "show-reason" => DenialMode::ShowReason,
                "conceal" => DenialMode::Conceal,
                _ => {
                    return Err(ConfigError::Invalid {
                        key: "PHANTOM_DENIAL_MODE",
                        reason: format!("'{}' (expected show-reason or conceal)", v),
                    })
                }
            };
        }

        config.db_path = lookup("PHANTOM_DB_PATH").filter(|v| !v.is_empty());
        config.bootstrap_admin = lookup("PHANTOM_BOOTSTRAP_ADMIN").filter(|v| !v.trim().is_empty());

        Ok(config)
    }

    pub fn resource_registry(&self) -> ResourceRegistry {
        self.tier_overrides.iter().fold(
            ResourceRegistry::builtin(self.default_policy),
            |registry, (resource, tier)| registry.with(resource.as_str(), Requirement::tier(*tier)),
        )
    }

    pub fn edge_guard(&self) -> EdgeGuard {
        EdgeGuard::new(self.protected.clone(), self.fallback_path.clone())
    }

    pub fn view_guard(&self, resources: Arc<ResourceRegistry>) -> ViewGuard {
        ViewGuard::new(resources, self.entry_path.clone(), self.fallback_path.clone())
            .with_mode(self.denial_mode)
    }
}

fn require_path(key: &'static str, value: String) -> Result<String, ConfigError> {
    if value.starts_with('/') {
        Ok(value)
    } else {
        Err(ConfigError::Invalid {
            key,
            reason: format!("'{}' must start with '/'", value),
        })
    }
}

fn split_list(raw: Option<&str>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(String::from)
            .collect()
    })
    .unwrap_or_default()
}
