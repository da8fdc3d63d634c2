//! WebSocket transport adapter.
//!
//! `GET /socket?token=<jwt>` upgrades to a WebSocket. Each socket runs in its
//! own task:
//!
//! 1. Missing token: close with 4001, nothing registered
//! 2. `connect` through the relay actor (a rejected credential queues a close)
//! 3. Forward the connection mailbox to the socket and inbound `message`
//!    frames to the relay actor, until either side ends
//! 4. `disconnect` exactly once
//!
//! A fault on one socket ends only that socket's task.

use crate::actors::connection::{ConnectionHandle, ConnectionMailbox};
use crate::actors::messages::{CloseReason, ConnectionMessage};
use crate::errors::RelayError;
use crate::observability::metrics;
use crate::routes::AppState;
use crate::ws::protocol::{encode_server_event, parse_client_event, ClientEvent};
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use common::secret::SecretString;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Query parameters of the upgrade request.
#[derive(Deserialize)]
pub struct SocketParams {
    #[serde(default)]
    token: Option<String>,
}

/// Upgrade handler for `/socket`.
///
/// Once the relay has stopped, upgrades are refused with 503.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<SocketParams>,
    State(state): State<Arc<AppState>>,
) -> Response {
    if state.relay.is_cancelled() {
        debug!(target: "relay.ws", "Refusing upgrade: relay is shutting down");
        return RelayError::ShuttingDown.into_response();
    }

    let token = params.token.filter(|t| !t.is_empty()).map(SecretString::from);
    ws.on_upgrade(move |socket| handle_socket(socket, token, state))
}

fn close_frame(reason: CloseReason) -> Message {
    Message::Close(Some(CloseFrame {
        code: reason.code(),
        reason: reason.as_str().into(),
    }))
}

async fn handle_socket(socket: WebSocket, token: Option<SecretString>, state: Arc<AppState>) {
    let (mut sink, stream) = socket.split();

    let Some(credential) = token else {
        debug!(target: "relay.ws", "Socket opened without a token");
        metrics::record_auth_failure("missing_token");
        let _ = sink.send(close_frame(CloseReason::AuthFailed)).await;
        return;
    };

    let (handle, mailbox) = ConnectionHandle::new(state.config.connection_buffer);
    let connection_id = handle.id();

    match state.relay.connect(credential.clone(), handle.clone()).await {
        Ok(claims) => {
            debug!(
                target: "relay.ws",
                connection_id = %connection_id,
                role = %claims.role,
                "Socket authenticated"
            );
        }
        // The handle is already closed; the loop below delivers the close frame
        Err(RelayError::Auth(_)) => {}
        Err(e) => {
            warn!(
                target: "relay.ws",
                connection_id = %connection_id,
                error = %e,
                "Connect failed"
            );
            handle.close(CloseReason::ShuttingDown);
        }
    }

    let session = SocketSession {
        state: Arc::clone(&state),
        credential,
        handle,
    };
    session.pump(sink, stream, mailbox).await;
    let dropped_events = session.handle.dropped_events();

    if let Err(e) = state.relay.disconnect(connection_id).await {
        debug!(
            target: "relay.ws",
            connection_id = %connection_id,
            error = %e,
            "Disconnect not processed"
        );
    }
    info!(
        target: "relay.ws",
        connection_id = %connection_id,
        dropped_events,
        "Socket closed"
    );
}

/// Per-socket state for the forwarding loop.
struct SocketSession {
    state: Arc<AppState>,
    credential: SecretString,
    handle: ConnectionHandle,
}

impl SocketSession {
    async fn pump(
        &self,
        mut sink: SplitSink<WebSocket, Message>,
        mut stream: SplitStream<WebSocket>,
        mut mailbox: ConnectionMailbox,
    ) {
        let connection_id = self.handle.id();

        loop {
            tokio::select! {
                outbound = mailbox.recv() => match outbound {
                    Some(ConnectionMessage::Event(event)) => {
                        let text = match encode_server_event(&event) {
                            Ok(text) => text,
                            Err(e) => {
                                warn!(target: "relay.ws", error = %e, "Failed to encode event");
                                continue;
                            }
                        };
                        if let Err(e) = sink.send(Message::Text(text)).await {
                            debug!(
                                target: "relay.ws",
                                connection_id = %connection_id,
                                error = %e,
                                "Socket write failed"
                            );
                            break;
                        }
                    }
                    Some(ConnectionMessage::Close { reason }) => {
                        debug!(
                            target: "relay.ws",
                            connection_id = %connection_id,
                            reason = reason.as_str(),
                            "Closing socket"
                        );
                        let _ = sink.send(close_frame(reason)).await;
                        break;
                    }
                    None => break,
                },

                inbound = stream.next() => match inbound {
                    Some(Ok(Message::Text(text))) => self.on_text(&text).await,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(
                            target: "relay.ws",
                            connection_id = %connection_id,
                            error = %e,
                            "Socket read failed"
                        );
                        break;
                    }
                },
            }
        }
    }

    async fn on_text(&self, text: &str) {
        let ClientEvent::Message(inbound) = match parse_client_event(text) {
            Ok(event) => event,
            Err(e) => {
                debug!(
                    target: "relay.ws",
                    connection_id = %self.handle.id(),
                    error = %e,
                    "Ignoring unparseable frame"
                );
                return;
            }
        };

        let result = self
            .state
            .relay
            .message(self.credential.clone(), self.handle.clone(), inbound.into())
            .await;

        // Route errors stay silent to the sender; auth errors already queued a close
        if let Err(e) = result {
            debug!(
                target: "relay.ws",
                connection_id = %self.handle.id(),
                error_type = e.error_type_label(),
                "Message event failed"
            );
            if e.closes_connection() && !matches!(e, RelayError::Auth(_)) {
                self.handle.close(CloseReason::ShuttingDown);
            }
        }
    }
}
