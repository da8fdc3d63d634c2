//! # Relay Test Utilities
//!
//! Shared test utilities for the presence relay.
//!
//! This crate provides:
//! - Credential builder and issuer (`TestCredentialBuilder`, `issue_credential`)
//! - In-process fixtures (`spawn_test_relay`, `TestConnection`)
//! - Server harness (`TestRelayServer`, `TestSocket` for WebSocket E2E tests)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use relay_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> anyhow::Result<()> {
//!     let server = TestRelayServer::spawn().await?;
//!     let token = TestCredentialBuilder::new().user("CompanyA", "user1").sign();
//!     let mut socket = server.connect(&token).await?;
//!     socket.send_to_admins("hi").await?;
//!     Ok(())
//! }
//! ```

pub mod fixtures;
pub mod server_harness;
pub mod token_builders;

// Re-export commonly used items
pub use fixtures::*;
pub use server_harness::*;
pub use token_builders::*;
