//! Transport handle for one client connection.
//!
//! A [`ConnectionHandle`] is what the registry stores and what the session
//! manager and router deliver to. It is cheap to clone and never blocks:
//! `send` and `close` are fire-and-forget. The transport owns the matching
//! [`ConnectionMailbox`] and forwards what it yields to the socket.
//!
//! # Close delivery
//!
//! `close` does not go through the bounded queue. It records the reason and
//! cancels the handle's token, so a close reaches the transport even when the
//! queue is full. Events already queued are drained first, then the mailbox
//! yields exactly one [`ConnectionMessage::Close`].

use super::messages::{CloseReason, ConnectionMessage, ServerEvent};
use super::metrics::{ActorType, MailboxMonitor};
use crate::observability::metrics;
use common::types::ConnectionId;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Default outbound mailbox size per connection.
pub const DEFAULT_CONNECTION_BUFFER: usize = 200;

/// Opaque, cloneable reference to a live connection.
///
/// Equality and hashing use the connection ID only.
#[derive(Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    sender: mpsc::Sender<ConnectionMessage>,
    cancel_token: CancellationToken,
    close_reason: Arc<OnceLock<CloseReason>>,
    mailbox: Arc<MailboxMonitor>,
}

impl ConnectionHandle {
    /// Create a handle and the mailbox the transport reads from.
    #[must_use]
    pub fn new(buffer: usize) -> (Self, ConnectionMailbox) {
        let id = ConnectionId::new();
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        let cancel_token = CancellationToken::new();
        let close_reason = Arc::new(OnceLock::new());
        let mailbox = Arc::new(MailboxMonitor::new(ActorType::Connection, id.to_string()));

        let handle = Self {
            id,
            sender,
            cancel_token: cancel_token.clone(),
            close_reason: Arc::clone(&close_reason),
            mailbox: Arc::clone(&mailbox),
        };
        let receiver = ConnectionMailbox {
            id,
            receiver,
            cancel_token,
            close_reason,
            mailbox,
            close_delivered: false,
        };
        (handle, receiver)
    }

    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queue an event for the client. Returns whether it was queued.
    ///
    /// Events are dropped (and counted) when the connection is closing, the
    /// transport has gone away, or the mailbox is full.
    pub fn send(&self, event: ServerEvent) -> bool {
        if self.cancel_token.is_cancelled() {
            debug!(
                target: "relay.ws",
                connection_id = %self.id,
                event = event.event_name(),
                "Event not sent: connection is closing"
            );
            metrics::record_event_dropped("closing");
            return false;
        }

        let event_name = event.event_name();
        match self.sender.try_send(ConnectionMessage::Event(event)) {
            Ok(()) => {
                self.mailbox.record_enqueue();
                true
            }
            Err(TrySendError::Full(_)) => {
                self.mailbox.record_drop();
                metrics::record_event_dropped("mailbox_full");
                false
            }
            Err(TrySendError::Closed(_)) => {
                warn!(
                    target: "relay.ws",
                    connection_id = %self.id,
                    event = event_name,
                    "Event dropped: transport gone"
                );
                metrics::record_event_dropped("transport_gone");
                false
            }
        }
    }

    /// Ask the transport to close the connection. The first reason wins.
    pub fn close(&self, reason: CloseReason) {
        if self.close_reason.set(reason).is_ok() {
            debug!(
                target: "relay.ws",
                connection_id = %self.id,
                reason = reason.as_str(),
                "Close requested"
            );
        }
        self.cancel_token.cancel();
    }

    /// Events dropped because the mailbox was full.
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.mailbox.messages_dropped()
    }

    /// Whether `close` has been called.
    #[must_use]
    pub fn is_closing(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

impl PartialEq for ConnectionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ConnectionHandle {}

impl Hash for ConnectionHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("closing", &self.is_closing())
            .finish_non_exhaustive()
    }
}

/// Receiving side of a connection, owned by the transport.
pub struct ConnectionMailbox {
    id: ConnectionId,
    receiver: mpsc::Receiver<ConnectionMessage>,
    cancel_token: CancellationToken,
    close_reason: Arc<OnceLock<CloseReason>>,
    mailbox: Arc<MailboxMonitor>,
    close_delivered: bool,
}

impl ConnectionMailbox {
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Next outbound item.
    ///
    /// After a close request, queued events are yielded first, then one
    /// `Close`, then `None`. Also returns `None` once every handle is dropped.
    pub async fn recv(&mut self) -> Option<ConnectionMessage> {
        if self.close_delivered {
            return None;
        }

        tokio::select! {
            biased;

            msg = self.receiver.recv() => match msg {
                Some(msg) => {
                    self.mailbox.record_dequeue();
                    Some(msg)
                }
                None => self.pending_close(),
            },
            () = self.cancel_token.cancelled() => self.try_recv(),
        }
    }

    /// Non-blocking variant of [`ConnectionMailbox::recv`].
    pub fn try_recv(&mut self) -> Option<ConnectionMessage> {
        if self.close_delivered {
            return None;
        }

        match self.receiver.try_recv() {
            Ok(msg) => {
                self.mailbox.record_dequeue();
                Some(msg)
            }
            Err(_) => self.pending_close(),
        }
    }

    /// Whether the relay has asked for this connection to be closed.
    #[must_use]
    pub fn is_close_requested(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    fn pending_close(&mut self) -> Option<ConnectionMessage> {
        if !self.cancel_token.is_cancelled() {
            return None;
        }
        self.close_delivered = true;
        let reason = self
            .close_reason
            .get()
            .copied()
            .unwrap_or(CloseReason::ShuttingDown);
        Some(ConnectionMessage::Close { reason })
    }
}

impl fmt::Debug for ConnectionMailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionMailbox")
            .field("id", &self.id)
            .field("depth", &self.mailbox.current_depth())
            .finish_non_exhaustive()
    }
}
