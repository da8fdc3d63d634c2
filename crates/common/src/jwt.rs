//! JWT pre-checks shared by the relay's credential validation.
//!
//! This module holds the checks that run around signature verification:
//! - Size limit, enforced before any parsing
//! - Header inspection (`alg`) without verifying the signature
//! - Expiry comparison against an explicit clock
//!
//! Signature verification itself lives with the caller, which owns the key.
//!
//! # Usage
//!
//! ```rust,ignore
//! use common::jwt::{extract_alg, validate_exp};
//!
//! let alg = extract_alg(token)?; // size + structure check
//! // ... verify signature, decode claims ...
//! validate_exp(claims.exp)?;
//! ```

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum accepted JWT size in bytes (8KB).
///
/// Credentials carry four short claims and are a few hundred bytes long.
/// Anything above this limit is rejected before base64 decoding or HMAC work.
pub const MAX_JWT_SIZE_BYTES: usize = 8192;

// =============================================================================
// Error Types
// =============================================================================

/// Errors produced by the JWT pre-checks.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtValidationError {
    /// Token size exceeds maximum allowed.
    #[error("Token exceeds maximum size")]
    TokenTooLarge,

    /// Token is not a three-segment JWT with a decodable JSON header.
    #[error("Token is malformed")]
    MalformedToken,

    /// Token `exp` is not strictly in the future.
    #[error("Token has expired")]
    Expired,
}

// =============================================================================
// Functions
// =============================================================================

/// Reject tokens larger than [`MAX_JWT_SIZE_BYTES`].
///
/// # Errors
///
/// Returns `JwtValidationError::TokenTooLarge` when the limit is exceeded.
pub fn check_token_size(token: &str) -> Result<(), JwtValidationError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtValidationError::TokenTooLarge);
    }
    Ok(())
}

/// Extract the `alg` header value from a JWT without verifying the signature.
///
/// The size limit is checked first. The returned value is only useful for
/// logging and early rejection; the token must still be verified.
///
/// # Errors
///
/// - `TokenTooLarge` - token exceeds `MAX_JWT_SIZE_BYTES`
/// - `MalformedToken` - wrong segment count, bad base64, non-JSON header,
///   or a missing/non-string `alg`
pub fn extract_alg(token: &str) -> Result<String, JwtValidationError> {
    check_token_size(token)?;

    let mut segments = token.split('.');
    let header_part = segments.next().ok_or(JwtValidationError::MalformedToken)?;
    if segments.count() != 2 {
        tracing::debug!(target: "common.jwt", "Token rejected: invalid JWT format");
        return Err(JwtValidationError::MalformedToken);
    }

    let header_bytes = URL_SAFE_NO_PAD.decode(header_part).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to decode JWT header base64");
        JwtValidationError::MalformedToken
    })?;

    let header: serde_json::Value = serde_json::from_slice(&header_bytes).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to parse JWT header JSON");
        JwtValidationError::MalformedToken
    })?;

    header
        .get("alg")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .ok_or(JwtValidationError::MalformedToken)
}

/// Validate the `exp` claim against the wall clock.
///
/// # Errors
///
/// Returns `JwtValidationError::Expired` if `exp` is not strictly in the future.
pub fn validate_exp(exp: i64) -> Result<(), JwtValidationError> {
    validate_exp_at(exp, chrono::Utc::now().timestamp())
}

/// Deterministic `exp` validation against an explicit `now` (Unix seconds).
///
/// There is no leeway: a token whose `exp` equals `now` is already expired.
///
/// # Errors
///
/// Returns `JwtValidationError::Expired` if `exp <= now`.
pub fn validate_exp_at(exp: i64, now: i64) -> Result<(), JwtValidationError> {
    if exp <= now {
        tracing::debug!(
            target: "common.jwt",
            exp = exp,
            now = now,
            "Token rejected: expired"
        );
        return Err(JwtValidationError::Expired);
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
