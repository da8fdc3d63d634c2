//! Observability for the relay: health probes and Prometheus metrics.
//!
//! # Privacy
//!
//! Identities and message contents never appear in metric labels. Labels are
//! bounded enums:
//! - `role`: user, admin
//! - `reason`: `AuthError` / `RouteError` labels, or drop causes
//! - `direction`: `user_to_admin`, `admin_to_user`
//! - `message_type`: relay actor request kinds
//!
//! # Metrics
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `relay_connections_active` | Gauge | `role` |
//! | `relay_auth_failures_total` | Counter | `reason` |
//! | `relay_messages_routed_total` | Counter | `direction` |
//! | `relay_route_errors_total` | Counter | `reason` |
//! | `relay_events_dropped_total` | Counter | `reason` |
//! | `relay_actor_message_seconds` | Histogram | `message_type` |
//! | `relay_actor_mailbox_depth` | Gauge | `actor_type` |

pub mod health;
pub mod metrics;

pub use health::{health_router, HealthState};
pub use metrics::init_metrics_recorder;
