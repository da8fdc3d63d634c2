//! `RelayActor` - singleton owner of the connection registry.
//!
//! Every connect, disconnect and inbound message is a request on this actor's
//! mailbox and is processed to completion before the next one. That makes each
//! registry mutation, and the notifications it triggers, atomic with respect to
//! every other connection.
//!
//! # Lifecycle
//!
//! 1. Spawned once at startup with the root cancellation token
//! 2. Runs until the token is cancelled or every handle is dropped
//! 3. On cancellation, empties the registry and closes every registered connection

use super::connection::ConnectionHandle;
use super::messages::{CloseReason, RelayMessage, RelayStatus};
use super::metrics::{ActorType, MailboxMonitor};
use crate::auth::{CredentialClaims, Role};
use crate::errors::{AuthError, RelayError};
use crate::observability::metrics;
use crate::registry::{ConnectionRegistry, RemovedSession};
use crate::router::{self, MessageIntent};
use crate::session::SessionLifecycle;
use common::secret::{ExposeSecret, SecretString};
use common::types::ConnectionId;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Relay actor mailbox size.
const RELAY_CHANNEL_BUFFER: usize = 1000;

/// Cloneable handle to the `RelayActor`.
#[derive(Clone, Debug)]
pub struct RelayActorHandle {
    sender: mpsc::Sender<RelayMessage>,
    cancel_token: CancellationToken,
    mailbox: Arc<MailboxMonitor>,
}

impl RelayActorHandle {
    /// Authenticate and register a connection.
    ///
    /// On `RelayError::Auth` the handle has already been closed.
    ///
    /// # Errors
    ///
    /// `Auth` for a rejected credential, `ShuttingDown`/`Internal` if the
    /// actor is unavailable.
    pub async fn connect(
        &self,
        credential: SecretString,
        handle: ConnectionHandle,
    ) -> Result<CredentialClaims, RelayError> {
        self.request(|respond_to| RelayMessage::Connect {
            credential,
            handle,
            respond_to,
        })
        .await?
        .map_err(RelayError::from)
    }

    /// Deregister a connection. Returns the removed entry, if there was one.
    ///
    /// # Errors
    ///
    /// `ShuttingDown`/`Internal` if the actor is unavailable.
    pub async fn disconnect(
        &self,
        connection_id: ConnectionId,
    ) -> Result<Option<RemovedSession>, RelayError> {
        self.request(|respond_to| RelayMessage::Disconnect {
            connection_id,
            respond_to,
        })
        .await
    }

    /// Validate the credential again and route one message.
    ///
    /// Returns the number of deliveries issued.
    ///
    /// # Errors
    ///
    /// `Auth` closes the sending connection; `Route` leaves it open.
    pub async fn message(
        &self,
        credential: SecretString,
        handle: ConnectionHandle,
        intent: MessageIntent,
    ) -> Result<usize, RelayError> {
        self.request(|respond_to| RelayMessage::Message {
            credential,
            handle,
            intent,
            respond_to,
        })
        .await?
    }

    /// Registry occupancy and mailbox depth.
    ///
    /// # Errors
    ///
    /// `ShuttingDown`/`Internal` if the actor is unavailable.
    pub async fn get_status(&self) -> Result<RelayStatus, RelayError> {
        self.request(|respond_to| RelayMessage::GetStatus { respond_to })
            .await
    }

    /// Stop the actor. Registered connections are closed.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Token cancelled together with the actor.
    #[must_use]
    pub fn child_token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> RelayMessage,
    ) -> Result<T, RelayError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|e| self.unavailable(format!("channel send failed: {e}")))?;
        self.mailbox.record_enqueue();

        rx.await
            .map_err(|e| self.unavailable(format!("response receive failed: {e}")))
    }

    fn unavailable(&self, detail: String) -> RelayError {
        if self.cancel_token.is_cancelled() {
            RelayError::ShuttingDown
        } else {
            RelayError::Internal(detail)
        }
    }
}

/// The `RelayActor` implementation.
pub struct RelayActor {
    receiver: mpsc::Receiver<RelayMessage>,
    cancel_token: CancellationToken,
    registry: ConnectionRegistry,
    lifecycle: SessionLifecycle,
    mailbox: Arc<MailboxMonitor>,
}

impl RelayActor {
    /// Spawn the relay actor.
    ///
    /// Returns a handle and the task join handle.
    pub fn spawn(
        lifecycle: SessionLifecycle,
        cancel_token: CancellationToken,
    ) -> (RelayActorHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(RELAY_CHANNEL_BUFFER);
        let mailbox = Arc::new(MailboxMonitor::new(ActorType::Relay, "relay"));

        let actor = Self {
            receiver,
            cancel_token: cancel_token.clone(),
            registry: ConnectionRegistry::new(),
            lifecycle,
            mailbox: Arc::clone(&mailbox),
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = RelayActorHandle {
            sender,
            cancel_token,
            mailbox,
        };

        (handle, task_handle)
    }

    #[instrument(skip_all, name = "relay.actor")]
    async fn run(mut self) {
        info!(target: "relay.actor", "RelayActor started");

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(target: "relay.actor", "RelayActor received cancellation signal");
                    self.graceful_shutdown();
                    break;
                }

                msg = self.receiver.recv() => {
                    if let Some(message) = msg {
                        self.mailbox.record_dequeue();
                        self.handle_message(message);
                        metrics::set_actor_mailbox_depth(
                            ActorType::Relay.as_str(),
                            self.mailbox.current_depth(),
                        );
                    } else {
                        info!(target: "relay.actor", "RelayActor channel closed, exiting");
                        self.graceful_shutdown();
                        break;
                    }
                }
            }
        }

        info!(
            target: "relay.actor",
            messages_processed = self.mailbox.messages_processed(),
            peak_mailbox_depth = self.mailbox.peak_depth(),
            "RelayActor stopped"
        );
    }

    fn handle_message(&mut self, message: RelayMessage) {
        let message_type = message.message_type();
        let start = Instant::now();

        match message {
            RelayMessage::Connect {
                credential,
                handle,
                respond_to,
            } => {
                let result =
                    self.lifecycle
                        .on_connect(&mut self.registry, credential.expose_secret(), handle);
                let _ = respond_to.send(result);
            }

            RelayMessage::Disconnect {
                connection_id,
                respond_to,
            } => {
                let removed = self
                    .lifecycle
                    .on_disconnect(&mut self.registry, connection_id);
                let _ = respond_to.send(removed);
            }

            RelayMessage::Message {
                credential,
                handle,
                intent,
                respond_to,
            } => {
                let result = self.handle_inbound(&credential, &handle, &intent);
                let _ = respond_to.send(result);
            }

            RelayMessage::GetStatus { respond_to } => {
                let (users, admins) = self.registry.counts();
                let _ = respond_to.send(RelayStatus {
                    users,
                    admins,
                    mailbox_depth: self.mailbox.current_depth(),
                    peak_mailbox_depth: self.mailbox.peak_depth(),
                });
            }
        }

        metrics::record_actor_message(message_type, start.elapsed());
    }

    fn handle_inbound(
        &self,
        credential: &SecretString,
        handle: &ConnectionHandle,
        intent: &MessageIntent,
    ) -> Result<usize, RelayError> {
        let claims = self
            .lifecycle
            .validator()
            .validate(credential.expose_secret())
            .map_err(|e: AuthError| {
                warn!(
                    target: "relay.actor",
                    connection_id = %handle.id(),
                    reason = e.label(),
                    "Message credential rejected, closing connection"
                );
                metrics::record_auth_failure(e.label());
                handle.close(CloseReason::AuthFailed);
                e
            })?;

        let timestamp = chrono::Utc::now().timestamp();
        router::route(&self.registry, &claims, intent, timestamp).map_err(|e| {
            warn!(
                target: "relay.router",
                connection_id = %handle.id(),
                tenant_id = %claims.tenant_id,
                role = %claims.role,
                reason = e.label(),
                "Message not routed"
            );
            metrics::record_route_error(e.label());
            RelayError::from(e)
        })
    }

    fn graceful_shutdown(&mut self) {
        let handles = self.registry.drain();
        debug!(
            target: "relay.actor",
            connections = handles.len(),
            "Closing registered connections"
        );
        for handle in &handles {
            handle.close(CloseReason::ShuttingDown);
        }
        metrics::set_connections_active(Role::User.as_str(), 0);
        metrics::set_connections_active(Role::Admin.as_str(), 0);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::actors::connection::ConnectionMailbox;
    use crate::actors::messages::{ChatMessage, ConnectionMessage, ServerEvent};
    use crate::auth::test_support::{fresh, sign, test_validator};
    use crate::errors::RouteError;
    use std::time::Duration;

    fn spawn_relay() -> (RelayActorHandle, JoinHandle<()>) {
        RelayActor::spawn(
            SessionLifecycle::new(test_validator(), false),
            CancellationToken::new(),
        )
    }

    async fn connect(
        relay: &RelayActorHandle,
        tenant_id: &str,
        identity: &str,
        role: &str,
    ) -> (ConnectionHandle, ConnectionMailbox, SecretString) {
        let (handle, mailbox) = ConnectionHandle::new(16);
        let credential = fresh(tenant_id, identity, role);
        relay
            .connect(SecretString::from(credential.clone()), handle.clone())
            .await
            .expect("connect should succeed");
        (handle, mailbox, SecretString::from(credential))
    }

    async fn next(mailbox: &mut ConnectionMailbox) -> ConnectionMessage {
        tokio::time::timeout(Duration::from_secs(1), mailbox.recv())
            .await
            .expect("timed out waiting for event")
            .expect("mailbox closed")
    }

    #[tokio::test]
    async fn test_connect_and_status() {
        let (relay, _task) = spawn_relay();
        let _user = connect(&relay, "CompanyA", "user1", "user").await;
        let _admin = connect(&relay, "CompanyA", "admin1", "admin").await;

        let status = relay.get_status().await.unwrap();
        assert_eq!(status.users, 1);
        assert_eq!(status.admins, 1);
        // Every request passes through the mailbox
        assert!(status.peak_mailbox_depth >= 1);
        assert!(status.peak_mailbox_depth >= status.mailbox_depth);
    }

    #[tokio::test]
    async fn test_connect_with_bad_credential_closes() {
        let (relay, _task) = spawn_relay();
        let (handle, mut mailbox) = ConnectionHandle::new(4);

        let result = relay.connect(SecretString::from("garbage"), handle).await;

        assert!(matches!(
            result,
            Err(RelayError::Auth(AuthError::InvalidSignature))
        ));
        assert_eq!(
            next(&mut mailbox).await,
            ConnectionMessage::Close {
                reason: CloseReason::AuthFailed
            }
        );
        let status = relay.get_status().await.unwrap();
        assert_eq!((status.users, status.admins), (0, 0));
    }

    #[tokio::test]
    async fn test_message_round_trip() {
        let (relay, _task) = spawn_relay();
        let (user, mut user_mailbox, user_credential) =
            connect(&relay, "CompanyA", "user1", "user").await;
        let (admin, mut admin_mailbox, admin_credential) =
            connect(&relay, "CompanyA", "admin1", "admin").await;
        assert!(matches!(
            next(&mut admin_mailbox).await,
            ConnectionMessage::Event(ServerEvent::UserList { .. })
        ));

        let delivered = relay
            .message(user_credential, user.clone(), MessageIntent::to_admins("hi"))
            .await
            .unwrap();
        assert_eq!(delivered, 1);
        let received = next(&mut admin_mailbox).await;
        assert!(
            matches!(
                &received,
                ConnectionMessage::Event(ServerEvent::Message(ChatMessage { from, content, .. }))
                    if from == "user1" && content == "hi"
            ),
            "unexpected: {received:?}"
        );

        relay
            .message(admin_credential, admin, MessageIntent::to_user("user1", "hello"))
            .await
            .unwrap();
        assert!(matches!(
            next(&mut user_mailbox).await,
            ConnectionMessage::Event(ServerEvent::Message(_))
        ));
    }

    #[tokio::test]
    async fn test_route_error_keeps_connection_open() {
        let (relay, _task) = spawn_relay();
        let (user, mailbox, credential) = connect(&relay, "CompanyA", "user1", "user").await;

        let result = relay
            .message(credential, user.clone(), MessageIntent::to_admins("anyone?"))
            .await;

        assert!(matches!(
            result,
            Err(RelayError::Route(RouteError::NoRecipients))
        ));
        assert!(!mailbox.is_close_requested());
        assert_eq!(relay.get_status().await.unwrap().users, 1);
    }

    #[tokio::test]
    async fn test_expired_message_credential_closes_connection() {
        let (relay, _task) = spawn_relay();
        let (user, mut mailbox, _credential) = connect(&relay, "CompanyA", "user1", "user").await;
        let expired = SecretString::from(sign("CompanyA", "user1", "user", 1));

        let result = relay
            .message(expired, user.clone(), MessageIntent::to_admins("hi"))
            .await;

        assert!(matches!(result, Err(RelayError::Auth(AuthError::Expired))));
        assert_eq!(
            next(&mut mailbox).await,
            ConnectionMessage::Close {
                reason: CloseReason::AuthFailed
            }
        );

        // The transport's disconnect then removes the entry
        let removed = relay.disconnect(user.id()).await.unwrap();
        assert!(removed.is_some());
        assert_eq!(relay.get_status().await.unwrap().users, 0);
    }

    #[tokio::test]
    async fn test_disconnect_unknown_is_noop() {
        let (relay, _task) = spawn_relay();
        let _user = connect(&relay, "CompanyA", "user1", "user").await;

        let removed = relay.disconnect(ConnectionId::new()).await.unwrap();
        assert!(removed.is_none());
        assert_eq!(relay.get_status().await.unwrap().users, 1);
    }

    #[tokio::test]
    async fn test_cancel_closes_registered_connections() {
        let (relay, task) = spawn_relay();
        let (_user, mut user_mailbox, _c1) = connect(&relay, "CompanyA", "user1", "user").await;
        let (_admin, mut admin_mailbox, _c2) = connect(&relay, "CompanyA", "admin1", "admin").await;

        relay.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("actor should stop")
            .unwrap();

        assert_eq!(
            next(&mut user_mailbox).await,
            ConnectionMessage::Close {
                reason: CloseReason::ShuttingDown
            }
        );
        // Snapshot first, then the close
        assert!(matches!(
            next(&mut admin_mailbox).await,
            ConnectionMessage::Event(ServerEvent::UserList { .. })
        ));
        assert_eq!(
            next(&mut admin_mailbox).await,
            ConnectionMessage::Close {
                reason: CloseReason::ShuttingDown
            }
        );

        assert!(relay.is_cancelled());
        assert!(matches!(
            relay.get_status().await,
            Err(RelayError::ShuttingDown)
        ));
    }

    #[tokio::test]
    async fn test_child_token_follows_actor() {
        let (relay, _task) = spawn_relay();
        let child = relay.child_token();
        assert!(!child.is_cancelled());
        relay.cancel();
        assert!(child.is_cancelled());
    }
}
