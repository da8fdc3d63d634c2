//! Credential validation.
//!
//! Verifies the HS256 credential presented on connect and on every inbound
//! message, and turns it into [`CredentialClaims`].
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - Only HS256 is accepted; any other `alg` header fails as `InvalidSignature`
//! - Expiry has zero leeway: `exp <= now` is expired
//! - Failures are reported as a closed [`AuthError`] set; details go to debug logs only

use crate::auth::claims::{CredentialClaims, CredentialPayload, Role};
use crate::errors::AuthError;
use common::jwt::{extract_alg, validate_exp_at};
use common::secret::{ExposeSecret, SecretString};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use std::fmt;

/// The only algorithm identifier the relay accepts.
const EXPECTED_ALG: &str = "HS256";

/// Validates credentials against the shared HS256 secret.
#[derive(Clone)]
pub struct CredentialValidator {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl fmt::Debug for CredentialValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialValidator")
            .field("algorithm", &EXPECTED_ALG)
            .field("decoding_key", &"[REDACTED]")
            .finish()
    }
}

impl CredentialValidator {
    /// Create a validator for credentials signed with `secret`.
    #[must_use]
    pub fn new(secret: &SecretString) -> Self {
        let decoding_key = DecodingKey::from_secret(secret.expose_secret().as_bytes());

        // Expiry is checked against an explicit clock below, and every claim is
        // optional at decode time so missing ones map to MalformedPayload.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        Self {
            decoding_key,
            validation,
        }
    }

    /// Validate a credential against the wall clock.
    ///
    /// # Errors
    ///
    /// See [`CredentialValidator::validate_at`].
    pub fn validate(&self, raw: &str) -> Result<CredentialClaims, AuthError> {
        self.validate_at(raw, chrono::Utc::now().timestamp())
    }

    /// Validate a credential against an explicit `now` (Unix seconds).
    ///
    /// # Errors
    ///
    /// - `InvalidSignature` - oversized, not a JWT, wrong algorithm, or bad signature
    /// - `Expired` - `exp <= now`
    /// - `MalformedPayload` - missing `exp`, or missing/empty tenant, identity or
    ///   role, or a role other than `"user"`/`"admin"`
    pub fn validate_at(&self, raw: &str, now: i64) -> Result<CredentialClaims, AuthError> {
        // 1. Size and header structure, before any signature work
        let alg = extract_alg(raw).map_err(|e| {
            tracing::debug!(target: "relay.auth", error = %e, "Credential pre-check failed");
            AuthError::InvalidSignature
        })?;
        if alg != EXPECTED_ALG {
            tracing::debug!(
                target: "relay.auth",
                alg = %alg,
                "Credential uses unexpected algorithm"
            );
            return Err(AuthError::InvalidSignature);
        }

        // 2. Verify signature and decode claims
        let mut payload = decode::<CredentialPayload>(raw, &self.decoding_key, &self.validation)
            .map_err(|e| {
                tracing::debug!(target: "relay.auth", error = %e, "Credential verification failed");
                match e.kind() {
                    ErrorKind::Json(_) | ErrorKind::Utf8(_) => AuthError::MalformedPayload,
                    _ => AuthError::InvalidSignature,
                }
            })?
            .claims;

        // 3. Expiry
        let expires_at = payload.exp.ok_or(AuthError::MalformedPayload)?;
        validate_exp_at(expires_at, now).map_err(|_| AuthError::Expired)?;

        // 4. Identity fields
        let tenant_id = non_empty(payload.take_tenant())?;
        let identity = non_empty(payload.user_id)?;
        let role = payload
            .role
            .as_deref()
            .and_then(Role::from_claim)
            .ok_or(AuthError::MalformedPayload)?;

        Ok(CredentialClaims {
            tenant_id,
            identity,
            role,
            expires_at,
        })
    }
}

fn non_empty(value: Option<String>) -> Result<String, AuthError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or(AuthError::MalformedPayload)
}
