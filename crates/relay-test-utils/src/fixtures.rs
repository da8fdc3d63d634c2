//! In-process fixtures: a relay actor without a network listener and
//! connection handles that record what the relay sends them.

use crate::token_builders::TEST_SECRET;
use common::secret::SecretString;
use relay_service::actors::{
    ConnectionHandle, ConnectionMailbox, ConnectionMessage, RelayActor, RelayActorHandle,
    ServerEvent, DEFAULT_CONNECTION_BUFFER,
};
use relay_service::auth::CredentialValidator;
use relay_service::config::Config;
use relay_service::session::SessionLifecycle;
use std::collections::HashMap;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// How long helpers wait for an event before giving up.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(2);

/// Config with [`TEST_SECRET`], an ephemeral port and defaults elsewhere.
pub fn test_config() -> Config {
    test_config_with(&[])
}

/// Config with [`TEST_SECRET`] plus extra `RELAY_*` overrides.
pub fn test_config_with(overrides: &[(&str, &str)]) -> Config {
    let mut vars = HashMap::from([
        ("RELAY_JWT_SECRET".to_string(), TEST_SECRET.to_string()),
        ("RELAY_BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
    ]);
    for (key, value) in overrides {
        vars.insert((*key).to_string(), (*value).to_string());
    }
    Config::from_vars(&vars).expect("test config should be valid")
}

/// Validator for [`TEST_SECRET`].
pub fn test_validator() -> CredentialValidator {
    CredentialValidator::new(&SecretString::from(TEST_SECRET))
}

/// Spawn a relay actor verifying credentials with [`TEST_SECRET`].
pub fn spawn_test_relay(close_superseded: bool) -> (RelayActorHandle, JoinHandle<()>) {
    RelayActor::spawn(
        SessionLifecycle::new(test_validator(), close_superseded),
        CancellationToken::new(),
    )
}

/// A connection handle together with the receiving side of its mailbox.
pub struct TestConnection {
    pub handle: ConnectionHandle,
    pub mailbox: ConnectionMailbox,
}

impl TestConnection {
    pub fn new() -> Self {
        Self::with_buffer(DEFAULT_CONNECTION_BUFFER)
    }

    pub fn with_buffer(buffer: usize) -> Self {
        let (handle, mailbox) = ConnectionHandle::new(buffer);
        Self { handle, mailbox }
    }

    /// Clone of the handle, for passing to the relay.
    pub fn handle(&self) -> ConnectionHandle {
        self.handle.clone()
    }

    /// Next mailbox item, or `None` on timeout or a finished mailbox.
    pub async fn next(&mut self) -> Option<ConnectionMessage> {
        tokio::time::timeout(EVENT_TIMEOUT, self.mailbox.recv())
            .await
            .ok()
            .flatten()
    }

    /// Next item, which must be an event.
    pub async fn next_event(&mut self) -> ServerEvent {
        match self.next().await {
            Some(ConnectionMessage::Event(event)) => event,
            other => panic!("expected an event, got {other:?}"),
        }
    }

    /// Drain everything already queued without waiting.
    pub fn drain(&mut self) -> Vec<ConnectionMessage> {
        let mut drained = Vec::new();
        while let Some(message) = self.mailbox.try_recv() {
            drained.push(message);
        }
        drained
    }

    /// Assert nothing is queued right now.
    pub fn assert_idle(&mut self) {
        let pending = self.drain();
        assert!(pending.is_empty(), "unexpected mailbox items: {pending:?}");
    }
}

impl Default for TestConnection {
    fn default() -> Self {
        Self::new()
    }
}
