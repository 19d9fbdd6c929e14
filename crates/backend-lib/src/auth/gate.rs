// ============================
// crates/backend-lib/src/auth/gate.rs
// ============================
//! Route access rules and the per-request authorization decision.

use super::token::{SessionClaims, SessionCodec};
use crate::config::ConfigError;
use crate::error::TokenError;
use crate::metrics::GATE_DECISION;
use crate::validation::validate_route_pattern;
use dashkit_common::{Role, Timestamp};
use metrics::counter;
use serde::Deserialize;
use std::collections::BTreeSet;
use tracing::debug;

/// Non-empty set of roles allowed through a restricted route
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleSet(BTreeSet<Role>);

impl RoleSet {
    /// `None` when `roles` is empty: a restriction nobody can satisfy is a config bug.
    pub fn new(roles: impl IntoIterator<Item = Role>) -> Option<Self> {
        let set: BTreeSet<Role> = roles.into_iter().collect();
        if set.is_empty() {
            None
        } else {
            Some(Self(set))
        }
    }

    pub fn contains(&self, role: Role) -> bool {
        self.0.contains(&role)
    }

    pub fn iter(&self) -> impl Iterator<Item = Role> + '_ {
        self.0.iter().copied()
    }
}

/// Access requirement of a route
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteAccess {
    Public,
    Authenticated,
    Restricted(RoleSet),
}

impl RouteAccess {
    /// Convenience for a single-role restriction
    pub fn only(role: Role) -> Self {
        RouteAccess::Restricted(RoleSet(BTreeSet::from([role])))
    }
}

/// Result of checking a request against a route's requirement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationDecision {
    /// Carries the claims when a valid session was presented
    Allow(Option<SessionClaims>),
    DenyUnauthenticated,
    DenyInsufficientRole,
}

impl AuthorizationDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthorizationDecision::Allow(_) => "allow",
            AuthorizationDecision::DenyUnauthenticated => "deny_unauthenticated",
            AuthorizationDecision::DenyInsufficientRole => "deny_insufficient_role",
        }
    }
}

/// Wire form of an access kind in the route config
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessKind {
    Public,
    Authenticated,
    Restricted,
}

/// One `[[routes]]` entry from the config file
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RouteRule {
    pub pattern: String,
    pub access: AccessKind,
    #[serde(default)]
    pub roles: Vec<Role>,
}

impl RouteRule {
    fn to_access(&self) -> Result<RouteAccess, ConfigError> {
        match self.access {
            AccessKind::Public => Ok(RouteAccess::Public),
            AccessKind::Authenticated => Ok(RouteAccess::Authenticated),
            AccessKind::Restricted => RoleSet::new(self.roles.iter().copied())
                .map(RouteAccess::Restricted)
                .ok_or_else(|| ConfigError::InvalidRoute {
                    pattern: self.pattern.clone(),
                    reason: "restricted routes need at least one role".to_string(),
                }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Pattern {
    Exact(String),
    /// `/admin/*` is stored as `/admin`; matches `/admin` and anything below it
    Prefix(String),
}

impl Pattern {
    fn parse(pattern: &str) -> Result<Self, ConfigError> {
        validate_route_pattern(pattern).map_err(|e| ConfigError::InvalidRoute {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;

        match pattern.strip_suffix('*') {
            Some(base) => {
                let base = base.trim_end_matches('/');
                Ok(Pattern::Prefix(base.to_string()))
            },
            None => Ok(Pattern::Exact(trim_trailing_slash(pattern).to_string())),
        }
    }

    /// Specificity of a match against `path`, if any. Exact beats any prefix.
    fn score(&self, path: &str) -> Option<usize> {
        match self {
            Pattern::Exact(p) => (p == path).then_some(usize::MAX),
            Pattern::Prefix(base) => {
                let hit = base.is_empty()
                    || path == base
                    || path
                        .strip_prefix(base.as_str())
                        .is_some_and(|rest| rest.starts_with('/'));
                hit.then_some(base.len())
            },
        }
    }
}

fn trim_trailing_slash(path: &str) -> &str {
    if path.len() > 1 {
        path.trim_end_matches('/')
    } else {
        path
    }
}

/// Ordered set of route rules with a fallback requirement
#[derive(Debug, Clone)]
pub struct RouteTable {
    rules: Vec<(Pattern, RouteAccess)>,
    default_access: RouteAccess,
}

impl Default for RouteTable {
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            default_access: RouteAccess::Authenticated,
        }
    }
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requirement for paths no rule matches
    pub fn with_default(mut self, access: RouteAccess) -> Self {
        self.default_access = access;
        self
    }

    pub fn route(mut self, pattern: &str, access: RouteAccess) -> Result<Self, ConfigError> {
        self.rules.push((Pattern::parse(pattern)?, access));
        Ok(self)
    }

    pub fn from_rules(rules: &[RouteRule], default_access: RouteAccess) -> Result<Self, ConfigError> {
        rules
            .iter()
            .try_fold(Self::new().with_default(default_access), |table, rule| {
                let access = rule.to_access()?;
                table.route(&rule.pattern, access)
            })
    }

    /// Requirement for `path`: the most specific matching rule, ties going to
    /// the rule declared first.
    pub fn resolve(&self, path: &str) -> &RouteAccess {
        let path = trim_trailing_slash(path);
        let mut best: Option<(usize, &RouteAccess)> = None;
        for (pattern, access) in &self.rules {
            if let Some(score) = pattern.score(path) {
                if best.is_none_or(|(top, _)| score > top) {
                    best = Some((score, access));
                }
            }
        }
        best.map(|(_, access)| access).unwrap_or(&self.default_access)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Decides whether a request may reach a route
#[derive(Debug, Clone)]
pub struct Gate {
    codec: SessionCodec,
    routes: RouteTable,
}

impl Gate {
    pub fn new(codec: SessionCodec, routes: RouteTable) -> Self {
        Self { codec, routes }
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Check an optional raw token against a route requirement
    pub fn authorize(&self, access: &RouteAccess, token: Option<&str>) -> AuthorizationDecision {
        let session = token.map(|t| self.codec.decode(t));
        let decision = decide(access, session);
        counter!(GATE_DECISION, "decision" => decision.as_str()).increment(1);
        decision
    }

    /// Same as [`Self::authorize`] at an explicit instant
    pub fn authorize_at(
        &self,
        access: &RouteAccess,
        token: Option<&str>,
        now: Timestamp,
    ) -> AuthorizationDecision {
        decide(access, token.map(|t| self.codec.decode_at(t, now)))
    }

    /// Resolve `path` in the route table, then authorize
    pub fn authorize_path(&self, path: &str, token: Option<&str>) -> AuthorizationDecision {
        self.authorize(self.routes.resolve(path), token)
    }
}

fn decide(
    access: &RouteAccess,
    session: Option<Result<SessionClaims, TokenError>>,
) -> AuthorizationDecision {
    let claims = match session {
        Some(Ok(claims)) => Some(claims),
        Some(Err(e)) => {
            debug!(reason = %e, "presented session rejected");
            None
        },
        None => None,
    };

    match (access, claims) {
        (RouteAccess::Public, claims) => AuthorizationDecision::Allow(claims),
        (_, None) => AuthorizationDecision::DenyUnauthenticated,
        (RouteAccess::Authenticated, Some(claims)) => AuthorizationDecision::Allow(Some(claims)),
        (RouteAccess::Restricted(roles), Some(claims)) => {
            if roles.contains(claims.role) {
                AuthorizationDecision::Allow(Some(claims))
            } else {
                debug!(user_id = %claims.subject_id, role = %claims.role, "role not permitted");
                AuthorizationDecision::DenyInsufficientRole
            }
        },
    }
}
