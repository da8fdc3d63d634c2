//! Session lifecycle: connect and disconnect handling.
//!
//! Per connection: `UNAUTHENTICATED -> REGISTERED -> CLOSED`, or straight to
//! `CLOSED` when the credential is rejected.
//!
//! Presence rules:
//! - A user connecting is announced to the tenant's admins (`user_connected`).
//! - An admin connecting receives a `user_list` snapshot of the tenant's users.
//! - A user disconnecting is announced to the tenant's admins (`user_disconnected`).
//! - Admin arrivals and departures are not announced.
//!
//! Every notification is issued after the registry mutation it reflects.

use crate::actors::connection::ConnectionHandle;
use crate::actors::messages::{CloseReason, ServerEvent};
use crate::auth::{CredentialClaims, CredentialValidator, Role};
use crate::errors::AuthError;
use crate::observability::metrics;
use crate::registry::{ConnectionRegistry, RemovedSession};
use common::types::ConnectionId;
use tracing::{debug, info, warn};

/// Connect/disconnect orchestration over a registry the caller owns.
#[derive(Debug, Clone)]
pub struct SessionLifecycle {
    validator: CredentialValidator,
    close_superseded: bool,
}

impl SessionLifecycle {
    /// `close_superseded` controls whether a handle displaced by a newer
    /// connection of the same identity is sent an explicit close.
    #[must_use]
    pub fn new(validator: CredentialValidator, close_superseded: bool) -> Self {
        Self {
            validator,
            close_superseded,
        }
    }

    #[must_use]
    pub fn validator(&self) -> &CredentialValidator {
        &self.validator
    }

    /// Authenticate and register a new connection.
    ///
    /// # Errors
    ///
    /// Returns the `AuthError` when the credential is rejected. The handle has
    /// then been closed and the registry is untouched.
    pub fn on_connect(
        &self,
        registry: &mut ConnectionRegistry,
        raw_credential: &str,
        handle: ConnectionHandle,
    ) -> Result<CredentialClaims, AuthError> {
        self.on_connect_at(
            registry,
            raw_credential,
            handle,
            chrono::Utc::now().timestamp(),
        )
    }

    /// [`SessionLifecycle::on_connect`] against an explicit clock.
    ///
    /// # Errors
    ///
    /// See [`SessionLifecycle::on_connect`].
    pub fn on_connect_at(
        &self,
        registry: &mut ConnectionRegistry,
        raw_credential: &str,
        handle: ConnectionHandle,
        now: i64,
    ) -> Result<CredentialClaims, AuthError> {
        let claims = match self.validator.validate_at(raw_credential, now) {
            Ok(claims) => claims,
            Err(e) => {
                warn!(
                    target: "relay.session",
                    connection_id = %handle.id(),
                    reason = e.label(),
                    "Connection rejected"
                );
                metrics::record_auth_failure(e.label());
                handle.close(CloseReason::AuthFailed);
                return Err(e);
            }
        };

        let connection_id = handle.id();
        let previous = registry.put(
            claims.role,
            &claims.identity,
            &claims.tenant_id,
            handle.clone(),
        );

        if let Some(previous) = previous.filter(|p| p.handle != handle) {
            debug!(
                target: "relay.session",
                connection_id = %connection_id,
                superseded = %previous.handle.id(),
                "Connection superseded an earlier one"
            );
            if self.close_superseded {
                previous.handle.close(CloseReason::Superseded);
            }
        }

        match claims.role {
            Role::User => {
                for admin in registry.find_admins(&claims.tenant_id) {
                    admin.send(ServerEvent::UserConnected {
                        user_id: claims.identity.clone(),
                    });
                }
            }
            Role::Admin => {
                handle.send(ServerEvent::UserList {
                    users: registry.list_users(&claims.tenant_id),
                });
            }
        }

        info!(
            target: "relay.session",
            connection_id = %connection_id,
            tenant_id = %claims.tenant_id,
            role = %claims.role,
            "Connection registered"
        );
        metrics::set_connections_active(claims.role.as_str(), registry.count(claims.role));

        Ok(claims)
    }

    /// Deregister a connection. Unknown connections are a no-op.
    pub fn on_disconnect(
        &self,
        registry: &mut ConnectionRegistry,
        connection_id: ConnectionId,
    ) -> Option<RemovedSession> {
        let Some(removed) = registry.remove_by_handle(connection_id) else {
            debug!(
                target: "relay.session",
                connection_id = %connection_id,
                "Disconnect for unregistered connection"
            );
            return None;
        };

        if removed.role == Role::User {
            for admin in registry.find_admins(&removed.tenant_id) {
                admin.send(ServerEvent::UserDisconnected {
                    user_id: removed.identity.clone(),
                });
            }
        }

        info!(
            target: "relay.session",
            connection_id = %connection_id,
            tenant_id = %removed.tenant_id,
            role = %removed.role,
            "Connection deregistered"
        );
        metrics::set_connections_active(removed.role.as_str(), registry.count(removed.role));

        Some(removed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::actors::connection::ConnectionMailbox;
    use crate::actors::messages::ConnectionMessage;
    use crate::auth::test_support::{fresh, sign, test_validator};

    fn lifecycle() -> SessionLifecycle {
        SessionLifecycle::new(test_validator(), false)
    }

    fn connect(
        lifecycle: &SessionLifecycle,
        registry: &mut ConnectionRegistry,
        tenant_id: &str,
        identity: &str,
        role: &str,
    ) -> (ConnectionHandle, ConnectionMailbox) {
        let (handle, mailbox) = ConnectionHandle::new(8);
        lifecycle
            .on_connect(registry, &fresh(tenant_id, identity, role), handle.clone())
            .expect("connect should succeed");
        (handle, mailbox)
    }

    fn event(mailbox: &mut ConnectionMailbox) -> Option<ServerEvent> {
        match mailbox.try_recv() {
            Some(ConnectionMessage::Event(event)) => Some(event),
            other => {
                assert!(other.is_none(), "unexpected close: {other:?}");
                None
            }
        }
    }

    #[test]
    fn test_user_connect_registers_and_notifies_admins() {
        let lifecycle = lifecycle();
        let mut registry = ConnectionRegistry::new();
        let (_a, mut admin) = connect(&lifecycle, &mut registry, "CompanyA", "admin1", "admin");
        let (_b, mut other_admin) =
            connect(&lifecycle, &mut registry, "CompanyB", "admin1", "admin");
        // Drain the admins' own snapshots
        event(&mut admin);
        event(&mut other_admin);

        let (user, _m) = connect(&lifecycle, &mut registry, "CompanyA", "user1", "user");

        assert_eq!(registry.find_user("CompanyA", "user1"), Some(&user));
        assert_eq!(
            event(&mut admin),
            Some(ServerEvent::UserConnected {
                user_id: "user1".to_string()
            })
        );
        assert_eq!(event(&mut other_admin), None);
    }

    #[test]
    fn test_admin_connect_receives_snapshot() {
        let lifecycle = lifecycle();
        let mut registry = ConnectionRegistry::new();
        let _u1 = connect(&lifecycle, &mut registry, "CompanyA", "user1", "user");
        let _u2 = connect(&lifecycle, &mut registry, "CompanyA", "user2", "user");
        let _u3 = connect(&lifecycle, &mut registry, "CompanyB", "user3", "user");

        let (_h, mut admin) = connect(&lifecycle, &mut registry, "CompanyA", "admin1", "admin");

        assert_eq!(
            event(&mut admin),
            Some(ServerEvent::UserList {
                users: vec!["user1".to_string(), "user2".to_string()]
            })
        );
        assert_eq!(event(&mut admin), None);
    }

    #[test]
    fn test_admin_connect_is_not_announced() {
        let lifecycle = lifecycle();
        let mut registry = ConnectionRegistry::new();
        let (_u, mut user) = connect(&lifecycle, &mut registry, "CompanyA", "user1", "user");
        let (_a, mut first_admin) =
            connect(&lifecycle, &mut registry, "CompanyA", "admin1", "admin");
        event(&mut first_admin);

        let _second = connect(&lifecycle, &mut registry, "CompanyA", "admin2", "admin");

        assert_eq!(event(&mut user), None);
        assert_eq!(event(&mut first_admin), None);
    }

    #[test]
    fn test_rejected_credential_closes_without_mutation() {
        let lifecycle = lifecycle();
        let mut registry = ConnectionRegistry::new();
        let (_a, mut admin) = connect(&lifecycle, &mut registry, "CompanyA", "admin1", "admin");
        event(&mut admin);

        let (handle, mut mailbox) = ConnectionHandle::new(8);
        let expired = sign("CompanyA", "user1", "user", 1);
        let result = lifecycle.on_connect(&mut registry, &expired, handle.clone());

        assert_eq!(result, Err(AuthError::Expired));
        assert!(!registry.contains_handle(handle.id()));
        assert_eq!(registry.len(), 1);
        assert_eq!(
            mailbox.try_recv(),
            Some(ConnectionMessage::Close {
                reason: CloseReason::AuthFailed
            })
        );
        assert_eq!(event(&mut admin), None);
    }

    #[test]
    fn test_unknown_role_closes_connection() {
        let lifecycle = lifecycle();
        let mut registry = ConnectionRegistry::new();
        let (handle, mailbox) = ConnectionHandle::new(8);

        let result = lifecycle.on_connect(
            &mut registry,
            &fresh("CompanyA", "root", "superuser"),
            handle,
        );

        assert_eq!(result, Err(AuthError::MalformedPayload));
        assert!(registry.is_empty());
        assert!(mailbox.is_close_requested());
    }

    #[test]
    fn test_user_disconnect_notifies_admins() {
        let lifecycle = lifecycle();
        let mut registry = ConnectionRegistry::new();
        let (user, _m) = connect(&lifecycle, &mut registry, "CompanyA", "user1", "user");
        let (_a, mut admin) = connect(&lifecycle, &mut registry, "CompanyA", "admin1", "admin");
        event(&mut admin);

        let removed = lifecycle.on_disconnect(&mut registry, user.id()).unwrap();

        assert_eq!(removed.role, Role::User);
        assert_eq!(removed.identity, "user1");
        assert!(registry.find_user("CompanyA", "user1").is_none());
        assert_eq!(
            event(&mut admin),
            Some(ServerEvent::UserDisconnected {
                user_id: "user1".to_string()
            })
        );
    }

    #[test]
    fn test_admin_disconnect_is_silent() {
        let lifecycle = lifecycle();
        let mut registry = ConnectionRegistry::new();
        let (_u, mut user) = connect(&lifecycle, &mut registry, "CompanyA", "user1", "user");
        let (admin, _m) = connect(&lifecycle, &mut registry, "CompanyA", "admin1", "admin");
        let (_a2, mut admin2) = connect(&lifecycle, &mut registry, "CompanyA", "admin2", "admin");
        event(&mut admin2);

        let removed = lifecycle.on_disconnect(&mut registry, admin.id()).unwrap();

        assert_eq!(removed.role, Role::Admin);
        assert_eq!(event(&mut user), None);
        assert_eq!(event(&mut admin2), None);
    }

    #[test]
    fn test_disconnect_unknown_is_noop() {
        let lifecycle = lifecycle();
        let mut registry = ConnectionRegistry::new();
        let _u = connect(&lifecycle, &mut registry, "CompanyA", "user1", "user");

        assert!(lifecycle
            .on_disconnect(&mut registry, ConnectionId::new())
            .is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_reconnect_silently_supersedes_by_default() {
        let lifecycle = lifecycle();
        let mut registry = ConnectionRegistry::new();
        let (first, first_mailbox) =
            connect(&lifecycle, &mut registry, "CompanyA", "user1", "user");
        let (second, _m) = connect(&lifecycle, &mut registry, "CompanyA", "user1", "user");

        assert_eq!(registry.find_user("CompanyA", "user1"), Some(&second));
        assert!(!first_mailbox.is_close_requested());

        // The orphaned connection going away leaves the new one in place
        assert!(lifecycle.on_disconnect(&mut registry, first.id()).is_none());
        assert_eq!(registry.find_user("CompanyA", "user1"), Some(&second));
    }

    #[test]
    fn test_reconnect_closes_superseded_when_configured() {
        let lifecycle = SessionLifecycle::new(test_validator(), true);
        let mut registry = ConnectionRegistry::new();
        let (_first, mut first_mailbox) =
            connect(&lifecycle, &mut registry, "CompanyA", "user1", "user");
        let (_second, second_mailbox) =
            connect(&lifecycle, &mut registry, "CompanyA", "user1", "user");

        assert_eq!(
            first_mailbox.try_recv(),
            Some(ConnectionMessage::Close {
                reason: CloseReason::Superseded
            })
        );
        assert!(!second_mailbox.is_close_requested());
    }
}
