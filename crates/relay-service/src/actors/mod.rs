//! Actor model for the relay.
//!
//! # Actors and handles
//!
//! ```text
//! RelayActor (singleton, owns ConnectionRegistry)
//!    ^  RelayMessage (mpsc) + oneshot replies
//!    |
//! RelayActorHandle  <-- one clone per WebSocket task
//!
//! ConnectionHandle ---- ConnectionMessage (mpsc) ---> ConnectionMailbox
//!  (stored in registry)                              (owned by WebSocket task)
//! ```
//!
//! Cancellation flows from the root token held by `main` into the relay actor.
//! Registered connections are closed when the actor stops.

pub mod connection;
pub mod messages;
pub mod metrics;
pub mod relay;

pub use connection::{ConnectionHandle, ConnectionMailbox, DEFAULT_CONNECTION_BUFFER};
pub use messages::{
    ChatMessage, CloseReason, ConnectionMessage, RelayMessage, RelayStatus, ServerEvent,
};
pub use metrics::{ActorType, MailboxMonitor};
pub use relay::{RelayActor, RelayActorHandle};
