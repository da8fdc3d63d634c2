//! Relay error types.
//!
//! Two closed taxonomies drive connection handling:
//! - [`AuthError`] always closes the offending connection.
//! - [`RouteError`] is logged and dropped; the connection stays open.
//!
//! [`RelayError`] wraps both for the actor handle API and adds the failures
//! of the actor plumbing itself. Internal details are logged server-side and
//! never returned to clients.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Credential validation failures.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    /// Signature did not verify, or the token could not be parsed as a JWT.
    #[error("Credential signature is invalid")]
    InvalidSignature,

    /// `exp` is not strictly in the future.
    #[error("Credential has expired")]
    Expired,

    /// Tenant, identity or role missing, empty, or of the wrong shape.
    #[error("Credential payload is malformed")]
    MalformedPayload,
}

impl AuthError {
    /// Bounded label for metrics and structured logs.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            AuthError::InvalidSignature => "invalid_signature",
            AuthError::Expired => "expired",
            AuthError::MalformedPayload => "malformed_payload",
        }
    }
}

/// Message routing failures. None of these close the connection.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RouteError {
    /// The message body was empty.
    #[error("Message content is empty")]
    EmptyContent,

    /// The sender's role may not message the requested role.
    #[error("Message direction is not permitted")]
    Unauthorized,

    /// A user messaged the admins of a tenant that has none connected.
    #[error("No admins connected to receive the message")]
    NoRecipients,

    /// An admin messaged a user that is not connected in the tenant.
    #[error("Recipient not found")]
    RecipientNotFound,
}

impl RouteError {
    /// Bounded label for metrics and structured logs.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            RouteError::EmptyContent => "empty_content",
            RouteError::Unauthorized => "unauthorized",
            RouteError::NoRecipients => "no_recipients",
            RouteError::RecipientNotFound => "recipient_not_found",
        }
    }
}

/// Relay service error type returned by the actor handle.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Credential rejected; the connection has been closed.
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// Message not routed; the connection stays open.
    #[error("Routing failed: {0}")]
    Route(#[from] RouteError),

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The relay actor has stopped accepting work.
    #[error("Relay is shutting down")]
    ShuttingDown,

    /// Actor mailbox or reply channel failure.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RelayError {
    /// Whether this error terminates the connection it occurred on.
    #[must_use]
    pub fn closes_connection(&self) -> bool {
        !matches!(self, RelayError::Route(_))
    }

    /// Returns a bounded label string for the error variant.
    #[must_use]
    pub fn error_type_label(&self) -> &'static str {
        match self {
            RelayError::Auth(e) => e.label(),
            RelayError::Route(e) => e.label(),
            RelayError::Config(_) => "config",
            RelayError::ShuttingDown => "shutting_down",
            RelayError::Internal(_) => "internal",
        }
    }

    /// Returns a client-safe error message (no internal details).
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            RelayError::Auth(_) => "Invalid or expired token".to_string(),
            RelayError::Route(e) => e.to_string(),
            RelayError::ShuttingDown => "Server is shutting down".to_string(),
            RelayError::Config(_) | RelayError::Internal(_) => {
                "An internal error occurred".to_string()
            }
        }
    }
}

/// Error response body for HTTP requests the relay refuses.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            RelayError::Auth(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            RelayError::Route(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            RelayError::ShuttingDown => (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE"),
            RelayError::Config(detail) | RelayError::Internal(detail) => {
                // Log actual error server-side, return generic message to client
                tracing::error!(target: "relay.ws", error = %detail, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        };

        let body = ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message: self.client_message(),
            },
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http_body_util::BodyExt;

    async fn read_body_json(body: Body) -> serde_json::Value {
        let bytes = body.collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_shutting_down_response() {
        let response = RelayError::ShuttingDown.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let body = read_body_json(response.into_body()).await;
        assert_eq!(body["error"]["code"], "SERVICE_UNAVAILABLE");
        assert_eq!(body["error"]["message"], "Server is shutting down");
    }

    #[tokio::test]
    async fn test_internal_response_hides_detail() {
        let response = RelayError::Internal("channel send failed: 10.0.0.4".to_string())
            .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = read_body_json(response.into_body()).await;
        assert_eq!(body["error"]["code"], "INTERNAL_ERROR");
        assert_eq!(body["error"]["message"], "An internal error occurred");
    }

    #[tokio::test]
    async fn test_auth_response_is_unauthorized() {
        let response = RelayError::from(AuthError::Expired).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body = read_body_json(response.into_body()).await;
        assert_eq!(body["error"]["message"], "Invalid or expired token");
    }

    #[test]
    fn test_only_route_errors_keep_connection_open() {
        assert!(RelayError::Auth(AuthError::Expired).closes_connection());
        assert!(RelayError::Internal("mailbox closed".to_string()).closes_connection());
        assert!(RelayError::ShuttingDown.closes_connection());
        assert!(!RelayError::Route(RouteError::NoRecipients).closes_connection());
        assert!(!RelayError::Route(RouteError::Unauthorized).closes_connection());
    }

    #[test]
    fn test_error_type_labels() {
        assert_eq!(
            RelayError::from(AuthError::InvalidSignature).error_type_label(),
            "invalid_signature"
        );
        assert_eq!(
            RelayError::from(AuthError::MalformedPayload).error_type_label(),
            "malformed_payload"
        );
        assert_eq!(
            RelayError::from(RouteError::RecipientNotFound).error_type_label(),
            "recipient_not_found"
        );
        assert_eq!(
            RelayError::from(RouteError::EmptyContent).error_type_label(),
            "empty_content"
        );
        assert_eq!(
            RelayError::Internal("x".to_string()).error_type_label(),
            "internal"
        );
    }

    #[test]
    fn test_client_messages_hide_internal_details() {
        let err = RelayError::Internal("channel send failed: 10.0.0.4".to_string());
        assert_eq!(err.client_message(), "An internal error occurred");
        let err = RelayError::Config("RELAY_JWT_SECRET missing".to_string());
        assert_eq!(err.client_message(), "An internal error occurred");

        // Auth failures do not reveal which check failed
        assert_eq!(
            RelayError::from(AuthError::InvalidSignature).client_message(),
            RelayError::from(AuthError::Expired).client_message()
        );
    }

    #[test]
    fn test_display_formatting() {
        assert_eq!(
            format!("{}", RelayError::from(AuthError::Expired)),
            "Authentication failed: Credential has expired"
        );
        assert_eq!(
            format!("{}", RelayError::from(RouteError::NoRecipients)),
            "Routing failed: No admins connected to receive the message"
        );
    }
}
