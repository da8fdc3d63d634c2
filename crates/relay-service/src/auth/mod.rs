//! Credential handling: claims types and the HS256 validator.

pub mod claims;
pub mod credential;

pub use claims::{CredentialClaims, CredentialPayload, Role};
pub use credential::CredentialValidator;

/// Token signing for unit tests inside this crate.
///
/// Integration tests use `relay-test-utils` instead; depending on it from unit
/// tests would link a second copy of this crate.
#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
pub(crate) mod test_support {
    use super::CredentialValidator;
    use common::secret::SecretString;
    use jsonwebtoken::{encode, EncodingKey, Header};

    pub const TEST_SECRET: &str = "unit-test-hs256-secret-0123456789abcdef";

    pub fn test_validator() -> CredentialValidator {
        CredentialValidator::new(&SecretString::from(TEST_SECRET))
    }

    pub fn sign_claims_json(claims: &serde_json::Value) -> String {
        encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
        )
        .expect("HS256 signing should not fail")
    }

    pub fn sign(tenant_id: &str, user_id: &str, role: &str, exp: i64) -> String {
        sign_claims_json(&serde_json::json!({
            "tenant_id": tenant_id,
            "user_id": user_id,
            "role": role,
            "exp": exp,
        }))
    }

    /// A credential valid for the next hour.
    pub fn fresh(tenant_id: &str, user_id: &str, role: &str) -> String {
        sign(
            tenant_id,
            user_id,
            role,
            chrono::Utc::now().timestamp() + 3600,
        )
    }
}
