//! WebSocket wire format.
//!
//! Every frame is a JSON text frame `{"event": "<name>", "data": {...}}`.
//! Clients send `message` events; the relay sends [`ServerEvent`]s.

use crate::actors::messages::ServerEvent;
use crate::auth::Role;
use crate::router::MessageIntent;
use serde::Deserialize;

/// Events a client may send.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    Message(InboundMessage),
}

/// Payload of an inbound `message` event.
///
/// Fields are optional on the wire; the router decides what a missing one means.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct InboundMessage {
    /// `"admin"` or `"user"`.
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    /// Target identity when `to` is `"user"`.
    #[serde(default)]
    pub user_id: Option<String>,
}

impl From<InboundMessage> for MessageIntent {
    fn from(msg: InboundMessage) -> Self {
        MessageIntent {
            // Unknown roles stay `None` and are refused by the router
            to_role: msg.to.as_deref().and_then(Role::from_claim),
            content: msg.content.unwrap_or_default(),
            target_identity: msg.user_id,
        }
    }
}

/// Parse a client text frame.
///
/// # Errors
///
/// Returns the JSON error for frames that are not a known client event.
pub fn parse_client_event(text: &str) -> Result<ClientEvent, serde_json::Error> {
    serde_json::from_str(text)
}

/// Encode a server event as a text frame body.
///
/// # Errors
///
/// Returns the JSON error if serialization fails.
pub fn encode_server_event(event: &ServerEvent) -> Result<String, serde_json::Error> {
    serde_json::to_string(event)
}
