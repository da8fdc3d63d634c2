//! Builder patterns for test credentials
//!
//! Signs credentials the way the offline issuer does: HS256 over
//! `{tenant_id, user_id, role, exp}`.

use chrono::{Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::json;

/// Shared secret used by every test relay and every test credential.
pub const TEST_SECRET: &str = "relay-test-secret-0123456789abcdefghij";

/// Builder for creating signed test credentials
///
/// # Example
/// ```rust,ignore
/// let token = TestCredentialBuilder::new()
///     .admin("CompanyA", "admin1")
///     .expires_in(3600)
///     .sign();
/// ```
pub struct TestCredentialBuilder {
    tenant_id: Option<String>,
    user_id: Option<String>,
    role: Option<String>,
    exp: Option<i64>,
    tenant_claim: &'static str,
    secret: String,
    algorithm: Algorithm,
}

impl TestCredentialBuilder {
    /// Create a new builder: a user in `test-tenant`, valid for one hour
    pub fn new() -> Self {
        Self {
            tenant_id: Some("test-tenant".to_string()),
            user_id: Some("test-user".to_string()),
            role: Some("user".to_string()),
            exp: Some((Utc::now() + Duration::seconds(3600)).timestamp()),
            tenant_claim: "tenant_id",
            secret: TEST_SECRET.to_string(),
            algorithm: Algorithm::HS256,
        }
    }

    /// A user of `tenant_id`
    pub fn user(self, tenant_id: &str, user_id: &str) -> Self {
        self.tenant(tenant_id).identity(user_id).role("user")
    }

    /// An admin of `tenant_id`
    pub fn admin(self, tenant_id: &str, user_id: &str) -> Self {
        self.tenant(tenant_id).identity(user_id).role("admin")
    }

    pub fn tenant(mut self, tenant_id: &str) -> Self {
        self.tenant_id = Some(tenant_id.to_string());
        self
    }

    pub fn identity(mut self, user_id: &str) -> Self {
        self.user_id = Some(user_id.to_string());
        self
    }

    /// Set the raw role claim (not validated here)
    pub fn role(mut self, role: &str) -> Self {
        self.role = Some(role.to_string());
        self
    }

    /// Set expiration in seconds from now (negative for an expired credential)
    pub fn expires_in(mut self, seconds: i64) -> Self {
        self.exp = Some((Utc::now() + Duration::seconds(seconds)).timestamp());
        self
    }

    /// Set an absolute expiration timestamp
    pub fn expires_at(mut self, timestamp: i64) -> Self {
        self.exp = Some(timestamp);
        self
    }

    /// Emit the tenant as `company_id`, as older issuers do
    pub fn with_company_id_claim(mut self) -> Self {
        self.tenant_claim = "company_id";
        self
    }

    pub fn without_tenant(mut self) -> Self {
        self.tenant_id = None;
        self
    }

    pub fn without_role(mut self) -> Self {
        self.role = None;
        self
    }

    pub fn without_exp(mut self) -> Self {
        self.exp = None;
        self
    }

    /// Sign with a different secret (for invalid-signature cases)
    pub fn signed_with(mut self, secret: &str) -> Self {
        self.secret = secret.to_string();
        self
    }

    /// Sign with a different HMAC algorithm
    pub fn algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Build the claims as a JSON value
    pub fn claims(&self) -> serde_json::Value {
        let mut claims = serde_json::Map::new();
        if let Some(tenant_id) = &self.tenant_id {
            claims.insert(self.tenant_claim.to_string(), json!(tenant_id));
        }
        if let Some(user_id) = &self.user_id {
            claims.insert("user_id".to_string(), json!(user_id));
        }
        if let Some(role) = &self.role {
            claims.insert("role".to_string(), json!(role));
        }
        if let Some(exp) = self.exp {
            claims.insert("exp".to_string(), json!(exp));
        }
        serde_json::Value::Object(claims)
    }

    /// Sign the credential
    pub fn sign(self) -> String {
        encode(
            &Header::new(self.algorithm),
            &self.claims(),
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .expect("HMAC signing should not fail")
    }
}

impl Default for TestCredentialBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Issue a credential valid for one hour, signed with [`TEST_SECRET`].
///
/// `role` is `"user"` or `"admin"`.
pub fn issue_credential(tenant_id: &str, user_id: &str, role: &str) -> String {
    TestCredentialBuilder::new()
        .tenant(tenant_id)
        .identity(user_id)
        .role(role)
        .sign()
}
