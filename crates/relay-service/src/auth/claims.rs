//! Credential claims.
//!
//! [`CredentialPayload`] is the wire shape signed by the issuer; every field is
//! optional so that a missing claim surfaces as `MalformedPayload` rather than
//! a decode failure. [`CredentialClaims`] is the validated, strongly-typed form
//! the rest of the relay works with.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Participant role. Determines routing directions and presence behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    /// Wire representation (`"user"` / `"admin"`).
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }

    /// Parse a wire role. Matching is exact; anything else is `None`.
    #[must_use]
    pub fn from_claim(value: &str) -> Option<Self> {
        match value {
            "user" => Some(Role::User),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Claims as carried in the signed credential.
///
/// `company_id` is the tenant claim used by earlier issuers. Issuers may send
/// both during a changeover; `tenant_id` takes precedence.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct CredentialPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
}

impl fmt::Debug for CredentialPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialPayload")
            .field("tenant_id", &self.tenant_id)
            .field("company_id", &self.company_id)
            .field("user_id", &self.user_id.as_ref().map(|_| "[REDACTED]"))
            .field("role", &self.role)
            .field("exp", &self.exp)
            .finish()
    }
}

impl CredentialPayload {
    /// Tenant claim, preferring `tenant_id` over `company_id`.
    #[must_use]
    pub fn take_tenant(&mut self) -> Option<String> {
        self.tenant_id.take().or_else(|| self.company_id.take())
    }
}

/// Validated credential: tenant, identity, role and expiry.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialClaims {
    pub tenant_id: String,
    pub identity: String,
    pub role: Role,
    pub expires_at: i64,
}

/// Identity is redacted; tenant and role are safe to log.
impl fmt::Debug for CredentialClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialClaims")
            .field("tenant_id", &self.tenant_id)
            .field("identity", &"[REDACTED]")
            .field("role", &self.role)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
