//! Presence Relay Service Library
//!
//! A tenant-scoped presence and message-routing relay. Clients connect over
//! WebSocket with a signed, time-limited credential and are bound to their
//! tenant ("company") as either a user or an admin:
//!
//! - Users may message every admin of their tenant
//! - Admins may message one named user of their tenant
//! - Admins see users arrive (`user_connected`) and leave (`user_disconnected`),
//!   and get a `user_list` snapshot when they connect
//!
//! # Architecture
//!
//! ```text
//! WebSocket task (one per socket)
//!   └── RelayActorHandle ──> RelayActor (singleton)
//!                              ├── SessionLifecycle ── CredentialValidator
//!                              ├── router::route
//!                              └── ConnectionRegistry (users, admins)
//! ```
//!
//! The registry is owned by the relay actor, so every mutation and the
//! notifications it triggers are serialized.
//!
//! # Modules
//!
//! - [`auth`] - credential claims and HS256 validation
//! - [`registry`] - live connections per role and tenant
//! - [`session`] - connect/disconnect handling and presence events
//! - [`router`] - permitted message directions and delivery
//! - [`actors`] - relay actor and per-connection transport handles
//! - [`ws`] - WebSocket adapter and wire format
//! - [`routes`] - HTTP surface
//! - [`config`] - configuration from environment
//! - [`errors`] - error taxonomy
//! - [`observability`] - health probes and metrics

pub mod actors;
pub mod auth;
pub mod config;
pub mod errors;
pub mod observability;
pub mod registry;
pub mod router;
pub mod routes;
pub mod session;
pub mod ws;
