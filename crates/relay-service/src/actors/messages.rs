//! Message types for actor communication.
//!
//! Requests to the relay actor travel over `tokio::sync::mpsc`; replies come
//! back on a `tokio::sync::oneshot`. Outbound traffic to a client connection is
//! a [`ConnectionMessage`] carrying either a [`ServerEvent`] or a close.

use crate::actors::connection::ConnectionHandle;
use crate::auth::CredentialClaims;
use crate::errors::{AuthError, RelayError};
use crate::registry::RemovedSession;
use crate::router::MessageIntent;
use common::secret::SecretString;
use common::types::ConnectionId;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

/// Messages sent to the `RelayActor`.
#[derive(Debug)]
pub enum RelayMessage {
    /// A transport connection opened and presented a credential.
    Connect {
        credential: SecretString,
        handle: ConnectionHandle,
        /// Validated claims, or the reason the connection was closed.
        respond_to: oneshot::Sender<Result<CredentialClaims, AuthError>>,
    },

    /// A transport connection ended.
    Disconnect {
        connection_id: ConnectionId,
        /// The registry entry that was removed, if any.
        respond_to: oneshot::Sender<Option<RemovedSession>>,
    },

    /// An inbound message event. The credential is validated again.
    Message {
        credential: SecretString,
        handle: ConnectionHandle,
        intent: MessageIntent,
        /// Number of deliveries issued.
        respond_to: oneshot::Sender<Result<usize, RelayError>>,
    },

    /// Registry occupancy (for health checks and tests).
    GetStatus {
        respond_to: oneshot::Sender<RelayStatus>,
    },
}

impl RelayMessage {
    /// Bounded label for metrics.
    #[must_use]
    pub const fn message_type(&self) -> &'static str {
        match self {
            RelayMessage::Connect { .. } => "connect",
            RelayMessage::Disconnect { .. } => "disconnect",
            RelayMessage::Message { .. } => "message",
            RelayMessage::GetStatus { .. } => "get_status",
        }
    }
}

/// Snapshot of the relay actor's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RelayStatus {
    /// Connected users across all tenants.
    pub users: usize,
    /// Connected admins across all tenants.
    pub admins: usize,
    /// Requests waiting in the actor's mailbox.
    pub mailbox_depth: usize,
    /// Highest mailbox depth seen since the actor started.
    pub peak_mailbox_depth: usize,
}

/// Why the relay closed a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Credential rejected on connect or on a message event.
    AuthFailed,
    /// A newer connection registered the same identity.
    Superseded,
    /// The relay is stopping.
    ShuttingDown,
}

impl CloseReason {
    /// WebSocket close code sent to the client.
    #[must_use]
    pub const fn code(&self) -> u16 {
        match self {
            CloseReason::AuthFailed => 4001,
            CloseReason::Superseded => 4002,
            CloseReason::ShuttingDown => 1001,
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            CloseReason::AuthFailed => "auth_failed",
            CloseReason::Superseded => "superseded",
            CloseReason::ShuttingDown => "shutting_down",
        }
    }
}

/// A routed message as delivered to its recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub from: String,
    pub content: String,
    /// Seconds since the Unix epoch, stamped by the relay.
    pub timestamp: i64,
}

/// Events pushed to clients.
///
/// Serialized as `{"event": "<name>", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    UserConnected { user_id: String },
    UserDisconnected { user_id: String },
    UserList { users: Vec<String> },
    Message(ChatMessage),
}

impl ServerEvent {
    /// Wire event name.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            ServerEvent::UserConnected { .. } => "user_connected",
            ServerEvent::UserDisconnected { .. } => "user_disconnected",
            ServerEvent::UserList { .. } => "user_list",
            ServerEvent::Message(_) => "message",
        }
    }
}

/// Items delivered to a connection's outbound mailbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionMessage {
    Event(ServerEvent),
    Close { reason: CloseReason },
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_server_event_wire_shape() {
        let event = ServerEvent::UserConnected {
            user_id: "user1".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"event": "user_connected", "data": {"user_id": "user1"}})
        );

        let event = ServerEvent::UserList {
            users: vec!["user1".to_string(), "user2".to_string()],
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"event": "user_list", "data": {"users": ["user1", "user2"]}})
        );

        let event = ServerEvent::Message(ChatMessage {
            from: "user1".to_string(),
            content: "hi".to_string(),
            timestamp: 1_700_000_000,
        });
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({
                "event": "message",
                "data": {"from": "user1", "content": "hi", "timestamp": 1_700_000_000}
            })
        );
    }

    #[test]
    fn test_event_name_matches_serde_tag() {
        let events = [
            ServerEvent::UserConnected {
                user_id: "u".to_string(),
            },
            ServerEvent::UserDisconnected {
                user_id: "u".to_string(),
            },
            ServerEvent::UserList { users: vec![] },
            ServerEvent::Message(ChatMessage {
                from: "u".to_string(),
                content: "c".to_string(),
                timestamp: 0,
            }),
        ];
        for event in events {
            let value = serde_json::to_value(&event).unwrap();
            assert_eq!(value["event"], event.event_name());
        }
    }

    #[test]
    fn test_close_reason_codes() {
        assert_eq!(CloseReason::AuthFailed.code(), 4001);
        assert_eq!(CloseReason::Superseded.code(), 4002);
        assert_eq!(CloseReason::ShuttingDown.code(), 1001);
        assert_eq!(CloseReason::Superseded.as_str(), "superseded");
    }
}
