//! Metric recording helpers.
//!
//! All metrics use the `relay_` prefix, `_total` for counters and `_seconds`
//! for duration histograms. Recording is a no-op until a recorder is installed.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Install the Prometheus recorder and return the handle used to render `/metrics`.
///
/// # Errors
///
/// Returns error if a recorder is already installed.
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        // Actor requests are in-memory map operations
        .set_buckets_for_metric(
            Matcher::Prefix("relay_actor".to_string()),
            &[
                0.000_05, 0.000_1, 0.000_5, 0.001, 0.005, 0.010, 0.050, 0.100,
            ],
        )
        .map_err(|e| format!("Failed to set actor latency buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus metrics recorder: {e}"))
}

/// Set the number of registered connections for a role.
///
/// Metric: `relay_connections_active`
/// Labels: `role` (user, admin)
pub fn set_connections_active(role: &'static str, count: usize) {
    // usize to f64 conversion is safe for realistic connection counts (< 2^53)
    #[allow(clippy::cast_precision_loss)]
    gauge!("relay_connections_active", "role" => role).set(count as f64);
}

/// Metric: `relay_auth_failures_total`
/// Labels: `reason` (`AuthError::label`)
pub fn record_auth_failure(reason: &'static str) {
    counter!("relay_auth_failures_total", "reason" => reason).increment(1);
}

/// Record deliveries issued by the router.
///
/// Metric: `relay_messages_routed_total`
/// Labels: `direction` (`user_to_admin`, `admin_to_user`)
pub fn record_messages_routed(direction: &'static str, deliveries: usize) {
    counter!("relay_messages_routed_total", "direction" => direction)
        .increment(u64::try_from(deliveries).unwrap_or(u64::MAX));
}

/// Metric: `relay_route_errors_total`
/// Labels: `reason` (`RouteError::label`)
pub fn record_route_error(reason: &'static str) {
    counter!("relay_route_errors_total", "reason" => reason).increment(1);
}

/// Record an outbound event that never reached a connection mailbox.
///
/// Metric: `relay_events_dropped_total`
/// Labels: `reason` (`mailbox_full`, `transport_gone`, `closing`)
pub fn record_event_dropped(reason: &'static str) {
    counter!("relay_events_dropped_total", "reason" => reason).increment(1);
}

/// Metric: `relay_actor_message_seconds`
/// Labels: `message_type` (connect, disconnect, message, `get_status`)
pub fn record_actor_message(message_type: &'static str, duration: Duration) {
    histogram!("relay_actor_message_seconds", "message_type" => message_type)
        .record(duration.as_secs_f64());
}

/// Metric: `relay_actor_mailbox_depth`
/// Labels: `actor_type` (relay)
pub fn set_actor_mailbox_depth(actor_type: &'static str, depth: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("relay_actor_mailbox_depth", "actor_type" => actor_type).set(depth as f64);
}
