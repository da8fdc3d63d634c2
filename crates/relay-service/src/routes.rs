//! HTTP routes for the relay.
//!
//! Defines the Axum router and application state.

use crate::actors::RelayActorHandle;
use crate::config::Config;
use crate::errors::RelayError;
use crate::observability::{health_router, HealthState};
use crate::ws::ws_handler;
use axum::http::{HeaderValue, Method};
use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Banner served on `/`.
pub const BANNER: &str = "Relay server is running.";

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Handle to the actor owning the connection registry.
    pub relay: RelayActorHandle,

    /// Service configuration.
    pub config: Config,
}

/// Build the application routes.
///
/// - `/` - liveness banner
/// - `/socket` - WebSocket upgrade (`?token=<jwt>`)
/// - `/health`, `/ready` - probes
/// - CORS for the configured origin, `TraceLayer` for request logging
///
/// # Errors
///
/// Returns `RelayError::Config` if the configured CORS origin is not a valid
/// header value.
pub fn build_routes(state: Arc<AppState>, health: Arc<HealthState>) -> Result<Router, RelayError> {
    let origin = HeaderValue::from_str(&state.config.cors_allowed_origin).map_err(|e| {
        RelayError::Config(format!("invalid CORS origin: {e}"))
    })?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET]);

    let relay_routes = Router::new()
        .route("/", get(banner))
        .route("/socket", get(ws_handler))
        .with_state(state);

    Ok(relay_routes
        .merge(health_router(health))
        .layer(cors)
        .layer(TraceLayer::new_for_http()))
}

async fn banner() -> &'static str {
    BANNER
}
