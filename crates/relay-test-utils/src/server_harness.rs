//! Test server harness for end-to-end WebSocket tests.
//!
//! Provides `TestRelayServer` for spawning a real relay instance on an
//! ephemeral port, and `TestSocket`, a WebSocket client speaking the relay's
//! JSON event format.

use crate::fixtures::{test_config, EVENT_TIMEOUT};
use futures::{SinkExt, StreamExt};
use relay_service::actors::{RelayActor, RelayActorHandle, ServerEvent};
use relay_service::auth::CredentialValidator;
use relay_service::config::Config;
use relay_service::observability::HealthState;
use relay_service::routes::{build_routes, AppState};
use relay_service::session::SessionLifecycle;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

/// Test server for end-to-end testing.
///
/// # Example
///
/// ```rust,ignore
/// use relay_test_utils::*;
///
/// #[tokio::test]
/// async fn test_banner() -> Result<(), anyhow::Error> {
///     let server = TestRelayServer::spawn().await?;
///     let body = reqwest::get(server.url()).await?.text().await?;
///     assert_eq!(body, "Relay server is running.");
///     Ok(())
/// }
/// ```
pub struct TestRelayServer {
    addr: SocketAddr,
    relay: RelayActorHandle,
    config: Config,
    server_handle: JoinHandle<()>,
}

impl TestRelayServer {
    /// Spawn a new test server with the default test configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the listener cannot be bound.
    pub async fn spawn() -> Result<Self, anyhow::Error> {
        Self::spawn_with_config(test_config()).await
    }

    /// Spawn a new test server with a custom configuration.
    ///
    /// The bind address is always overridden to `127.0.0.1:0`.
    ///
    /// # Errors
    ///
    /// Returns error if the listener cannot be bound or routes fail to build.
    pub async fn spawn_with_config(mut config: Config) -> Result<Self, anyhow::Error> {
        config.bind_address = "127.0.0.1:0".to_string();

        let lifecycle = SessionLifecycle::new(
            CredentialValidator::new(&config.jwt_secret),
            config.close_superseded,
        );
        let (relay, _relay_task) = RelayActor::spawn(lifecycle, CancellationToken::new());

        let state = Arc::new(AppState {
            relay: relay.clone(),
            config: config.clone(),
        });
        let health = Arc::new(HealthState::new());
        health.set_ready();
        let app = build_routes(state, health)?;

        let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
        let addr = listener.local_addr()?;

        let server_handle = tokio::spawn(async move {
            // The listener outlives the relay so tests can observe post-shutdown behavior
            if let Err(e) = axum::serve(listener, app).await {
                eprintln!("Test server error: {e}");
            }
        });

        Ok(Self {
            addr,
            relay,
            config,
            server_handle,
        })
    }

    /// HTTP base URL, e.g. `http://127.0.0.1:12345`.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// WebSocket URL for `token`, or without a token at all.
    pub fn ws_url(&self, token: Option<&str>) -> String {
        match token {
            Some(token) => format!("ws://{}/socket?token={token}", self.addr),
            None => format!("ws://{}/socket", self.addr),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Handle to the server's relay actor (status queries, shutdown).
    pub fn relay(&self) -> &RelayActorHandle {
        &self.relay
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Open a socket authenticated with `token`.
    ///
    /// # Errors
    ///
    /// Returns error if the WebSocket handshake fails.
    pub async fn connect(&self, token: &str) -> Result<TestSocket, anyhow::Error> {
        TestSocket::connect(&self.ws_url(Some(token))).await
    }

    /// Open a socket with no token at all.
    ///
    /// # Errors
    ///
    /// Returns error if the WebSocket handshake fails.
    pub async fn connect_without_token(&self) -> Result<TestSocket, anyhow::Error> {
        TestSocket::connect(&self.ws_url(None)).await
    }

    /// HTTP status of a WebSocket handshake with `token` (101 on success).
    ///
    /// # Errors
    ///
    /// Returns error if the request fails below the HTTP layer.
    pub async fn handshake_status(&self, token: &str) -> Result<u16, anyhow::Error> {
        match connect_async(self.ws_url(Some(token))).await {
            Ok((_stream, response)) => Ok(response.status().as_u16()),
            Err(WsError::Http(response)) => Ok(response.status().as_u16()),
            Err(e) => Err(e.into()),
        }
    }

    /// Poll the relay until it reports `users` users and `admins` admins.
    ///
    /// Socket registration runs after the handshake completes, so tests wait
    /// on this before relying on presence.
    ///
    /// # Errors
    ///
    /// Returns error if the counts are not reached within the event timeout.
    pub async fn wait_for_counts(&self, users: usize, admins: usize) -> Result<(), anyhow::Error> {
        let deadline = tokio::time::Instant::now() + EVENT_TIMEOUT;
        loop {
            let status = self.relay.get_status().await?;
            if status.users == users && status.admins == admins {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                anyhow::bail!(
                    "expected {users} users and {admins} admins, got {} and {}",
                    status.users,
                    status.admins
                );
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    }
}

impl Drop for TestRelayServer {
    fn drop(&mut self) {
        // Closes registered sockets, then stop the listener
        self.relay.cancel();
        self.server_handle.abort();
    }
}

/// What a test socket observed next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketFrame {
    Event(ServerEvent),
    Closed { code: Option<u16>, reason: String },
}

/// WebSocket client for the relay's JSON event protocol.
pub struct TestSocket {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl TestSocket {
    /// Connect to `url`.
    ///
    /// # Errors
    ///
    /// Returns error if the WebSocket handshake fails.
    pub async fn connect(url: &str) -> Result<Self, anyhow::Error> {
        let (stream, _response) = connect_async(url).await?;
        Ok(Self { stream })
    }

    /// Send a raw text frame.
    ///
    /// # Errors
    ///
    /// Returns error if the socket write fails.
    pub async fn send_text(&mut self, text: &str) -> Result<(), anyhow::Error> {
        self.stream.send(Message::text(text)).await?;
        Ok(())
    }

    /// Send a `message` event with the given `data` object.
    ///
    /// # Errors
    ///
    /// Returns error if the socket write fails.
    pub async fn send_message(&mut self, data: serde_json::Value) -> Result<(), anyhow::Error> {
        let frame = json!({"event": "message", "data": data});
        self.send_text(&frame.to_string()).await
    }

    /// User to admins.
    ///
    /// # Errors
    ///
    /// Returns error if the socket write fails.
    pub async fn send_to_admins(&mut self, content: &str) -> Result<(), anyhow::Error> {
        self.send_message(json!({"to": "admin", "content": content}))
            .await
    }

    /// Admin to one user.
    ///
    /// # Errors
    ///
    /// Returns error if the socket write fails.
    pub async fn send_to_user(
        &mut self,
        user_id: &str,
        content: &str,
    ) -> Result<(), anyhow::Error> {
        self.send_message(json!({"to": "user", "user_id": user_id, "content": content}))
            .await
    }

    /// Next event or close, skipping control frames.
    ///
    /// # Errors
    ///
    /// Returns error on timeout, a read failure, or an unparseable frame.
    pub async fn next_frame(&mut self) -> Result<SocketFrame, anyhow::Error> {
        loop {
            let next = tokio::time::timeout(EVENT_TIMEOUT, self.stream.next())
                .await
                .map_err(|_| anyhow::anyhow!("timed out waiting for a frame"))?;

            match next {
                Some(Ok(Message::Text(text))) => {
                    let event: ServerEvent = serde_json::from_str(text.as_str())?;
                    return Ok(SocketFrame::Event(event));
                }
                Some(Ok(Message::Close(frame))) => {
                    return Ok(match frame {
                        Some(frame) => SocketFrame::Closed {
                            code: Some(u16::from(frame.code)),
                            reason: frame.reason.to_string(),
                        },
                        None => SocketFrame::Closed {
                            code: None,
                            reason: String::new(),
                        },
                    });
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
                None => {
                    return Ok(SocketFrame::Closed {
                        code: None,
                        reason: String::new(),
                    })
                }
            }
        }
    }

    /// Next frame, which must be an event.
    ///
    /// # Errors
    ///
    /// Returns error if the next frame is a close or cannot be read.
    pub async fn next_event(&mut self) -> Result<ServerEvent, anyhow::Error> {
        match self.next_frame().await? {
            SocketFrame::Event(event) => Ok(event),
            closed => anyhow::bail!("expected an event, got {closed:?}"),
        }
    }

    /// Wait for the close frame, skipping any events still in flight.
    /// Returns the close code.
    ///
    /// # Errors
    ///
    /// Returns error on timeout or a read failure.
    pub async fn expect_close(&mut self) -> Result<Option<u16>, anyhow::Error> {
        loop {
            if let SocketFrame::Closed { code, .. } = self.next_frame().await? {
                return Ok(code);
            }
        }
    }

    /// Assert nothing arrives within `wait`.
    ///
    /// # Errors
    ///
    /// Returns error if a frame arrives.
    pub async fn expect_silence(&mut self, wait: std::time::Duration) -> Result<(), anyhow::Error> {
        match tokio::time::timeout(wait, self.stream.next()).await {
            Err(_) => Ok(()),
            Ok(frame) => anyhow::bail!("expected silence, got {frame:?}"),
        }
    }

    /// Close from the client side.
    ///
    /// # Errors
    ///
    /// Returns error if the close handshake cannot be written.
    pub async fn close(mut self) -> Result<(), anyhow::Error> {
        self.stream.close(None).await?;
        Ok(())
    }
}
