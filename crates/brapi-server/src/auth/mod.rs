//! Caller identity and call access
//!
//! The server never stores sessions. A [`CredentialService`] turns the bearer
//! token of a request into a [`Caller`] (a sorted role set) and an
//! [`AccessPolicy`] decides whether that caller may use a call with a given
//! method.

pub mod credentials;
pub mod policy;

use axum::http::{header, HeaderMap};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub use credentials::{CredentialService, FailedAttemptThrottle, StaticTokenCredentials};
pub use policy::{AccessPolicy, RoleAccessPolicy};

/// Role of callers without a token
pub const ANONYMOUS_ROLE: &str = "anonymous";

/// Role allowed to write and to administer the search cache
pub const ADMINISTRATOR_ROLE: &str = "administrator";

/// Authenticated caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    roles: BTreeSet<String>,
}

impl Caller {
    pub fn anonymous() -> Self {
        Self::with_roles([ANONYMOUS_ROLE])
    }

    pub fn with_roles<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    pub fn roles(&self) -> &BTreeSet<String> {
        &self.roles
    }

    /// Roles in sorted order, as used for search job identity
    pub fn sorted_roles(&self) -> Vec<String> {
        self.roles.iter().cloned().collect()
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    pub fn is_administrator(&self) -> bool {
        self.has_role(ADMINISTRATOR_ROLE)
    }

    pub fn has_any_role(&self, roles: &BTreeSet<String>) -> bool {
        !self.roles.is_disjoint(roles)
    }
}

/// Token of an `Authorization: Bearer <token>` header
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Client key for failed-attempt throttling
pub fn client_key(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .or_else(|| headers.get("x-real-ip"))
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| "local".to_string())
}
