//! Presence Relay
//!
//! WebSocket relay for tenant-scoped presence and user/admin messaging.
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment
//! 2. Initialize tracing
//! 3. Initialize Prometheus metrics recorder
//! 4. Spawn the relay actor
//! 5. Bind the listener (fail fast on bind errors)
//! 6. Serve HTTP, WebSocket, health and metrics routes
//! 7. Wait for shutdown signal, then cancel the relay actor

#![warn(clippy::pedantic)]

use std::sync::Arc;

use axum::Router;
use relay_service::actors::RelayActor;
use relay_service::auth::CredentialValidator;
use relay_service::config::{Config, RECOMMENDED_SECRET_BYTES};
use relay_service::observability::{init_metrics_recorder, HealthState};
use relay_service::routes::{build_routes, AppState};
use relay_service::session::SessionLifecycle;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env().map_err(|e| format!("Failed to load configuration: {e}"))?;

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "relay_service=info,tower_http=info".into());
    tracing_subscriber::registry()
        .with(filter)
        .with(config.json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!config.json_logs).then(|| tracing_subscriber::fmt::layer()))
        .init();

    info!("Starting Presence Relay");
    info!(
        bind_address = %config.bind_address,
        cors_allowed_origin = %config.cors_allowed_origin,
        close_superseded = config.close_superseded,
        connection_buffer = config.connection_buffer,
        "Configuration loaded successfully"
    );
    if config.secret_is_weak() {
        warn!(
            min_bytes = RECOMMENDED_SECRET_BYTES,
            "RELAY_JWT_SECRET is shorter than recommended for HS256"
        );
    }

    // Must happen before any metrics are recorded
    let prometheus_handle = init_metrics_recorder().map_err(|e| {
        error!(error = %e, "Failed to install Prometheus metrics recorder");
        e
    })?;

    let health_state = Arc::new(HealthState::new());

    let lifecycle = SessionLifecycle::new(
        CredentialValidator::new(&config.jwt_secret),
        config.close_superseded,
    );
    let (relay, relay_task) = RelayActor::spawn(lifecycle, CancellationToken::new());
    let server_token = relay.child_token();

    let state = Arc::new(AppState {
        relay: relay.clone(),
        config: config.clone(),
    });

    let metrics_router = Router::new().route(
        "/metrics",
        axum::routing::get(move || {
            let handle = prometheus_handle.clone();
            async move { handle.render() }
        }),
    );
    let app = build_routes(state, Arc::clone(&health_state))?.merge(metrics_router);

    // Bind listener BEFORE spawning to fail fast on bind errors
    let listener = tokio::net::TcpListener::bind(&config.bind_address)
        .await
        .map_err(|e| {
            error!(error = %e, addr = %config.bind_address, "Failed to bind listener");
            format!("Failed to bind {}: {e}", config.bind_address)
        })?;
    info!(addr = %config.bind_address, "Listener bound successfully");

    let server_task = tokio::spawn(async move {
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            server_token.cancelled().await;
            info!("HTTP server shutting down");
        });
        if let Err(e) = server.await {
            error!(error = %e, "HTTP server failed");
        }
    });

    health_state.set_ready();
    info!("Presence Relay running - press Ctrl+C to shutdown");
    shutdown_signal().await;

    info!("Shutdown signal received, initiating graceful shutdown...");

    // Mark as not ready immediately so load balancers stop sending traffic
    health_state.set_not_ready();

    // Closes every registered socket and stops the HTTP server
    relay.cancel();

    if let Err(e) = relay_task.await {
        warn!(error = %e, "Relay actor task ended abnormally");
    }
    if let Err(e) = server_task.await {
        warn!(error = %e, "HTTP server task ended abnormally");
    }

    info!("Presence Relay shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
