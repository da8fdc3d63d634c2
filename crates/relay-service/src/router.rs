//! Message router.
//!
//! Two directions are permitted, both within the sender's tenant:
//! - `user -> admin`: fan out to every admin of the tenant
//! - `admin -> user`: deliver to one named user
//!
//! Everything else is `Unauthorized`. Delivery is fire-and-forget through
//! [`ConnectionHandle::send`](crate::actors::connection::ConnectionHandle::send).

use crate::actors::messages::{ChatMessage, ServerEvent};
use crate::auth::{CredentialClaims, Role};
use crate::errors::RouteError;
use crate::observability::metrics;
use crate::registry::ConnectionRegistry;
use tracing::debug;

/// A request to deliver `content` to a role (and, for users, a specific identity).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageIntent {
    /// `None` when the client named a role that does not exist.
    pub to_role: Option<Role>,
    pub content: String,
    pub target_identity: Option<String>,
}

impl MessageIntent {
    /// Message for all admins of the sender's tenant.
    #[must_use]
    pub fn to_admins(content: impl Into<String>) -> Self {
        Self {
            to_role: Some(Role::Admin),
            content: content.into(),
            target_identity: None,
        }
    }

    /// Message for one user of the sender's tenant.
    #[must_use]
    pub fn to_user(identity: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            to_role: Some(Role::User),
            content: content.into(),
            target_identity: Some(identity.into()),
        }
    }
}

/// Route one message. Returns the number of deliveries issued.
///
/// `timestamp` (Unix seconds) is stamped on the delivered message.
///
/// # Errors
///
/// - `EmptyContent` - checked before anything else
/// - `Unauthorized` - direction other than user->admin or admin->user
/// - `NoRecipients` - user->admin with no admin connected in the tenant
/// - `RecipientNotFound` - admin->user with the target not connected in the tenant
pub fn route(
    registry: &ConnectionRegistry,
    sender: &CredentialClaims,
    intent: &MessageIntent,
    timestamp: i64,
) -> Result<usize, RouteError> {
    if intent.content.is_empty() {
        return Err(RouteError::EmptyContent);
    }

    let message = || {
        ServerEvent::Message(ChatMessage {
            from: sender.identity.clone(),
            content: intent.content.clone(),
            timestamp,
        })
    };

    match (sender.role, intent.to_role) {
        (Role::User, Some(Role::Admin)) => {
            let admins = registry.find_admins(&sender.tenant_id);
            if admins.is_empty() {
                return Err(RouteError::NoRecipients);
            }
            for admin in &admins {
                admin.send(message());
            }

            debug!(
                target: "relay.router",
                tenant_id = %sender.tenant_id,
                recipients = admins.len(),
                content_len = intent.content.len(),
                "Routed user message to admins"
            );
            metrics::record_messages_routed("user_to_admin", admins.len());
            Ok(admins.len())
        }

        (Role::Admin, Some(Role::User)) => {
            let handle = intent
                .target_identity
                .as_deref()
                .and_then(|identity| registry.find_user(&sender.tenant_id, identity))
                .ok_or(RouteError::RecipientNotFound)?;
            handle.send(message());

            debug!(
                target: "relay.router",
                tenant_id = %sender.tenant_id,
                connection_id = %handle.id(),
                content_len = intent.content.len(),
                "Routed admin message to user"
            );
            metrics::record_messages_routed("admin_to_user", 1);
            Ok(1)
        }

        _ => Err(RouteError::Unauthorized),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::actors::connection::{ConnectionHandle, ConnectionMailbox};
    use crate::actors::messages::ConnectionMessage;

    const NOW: i64 = 1_700_000_000;

    fn claims(tenant_id: &str, identity: &str, role: Role) -> CredentialClaims {
        CredentialClaims {
            tenant_id: tenant_id.to_string(),
            identity: identity.to_string(),
            role,
            expires_at: NOW + 3600,
        }
    }

    fn register(
        registry: &mut ConnectionRegistry,
        role: Role,
        identity: &str,
        tenant_id: &str,
    ) -> ConnectionMailbox {
        let (handle, mailbox) = ConnectionHandle::new(8);
        registry.put(role, identity, tenant_id, handle);
        mailbox
    }

    fn expect_message(mailbox: &mut ConnectionMailbox, from: &str, content: &str) {
        assert_eq!(
            mailbox.try_recv(),
            Some(ConnectionMessage::Event(ServerEvent::Message(ChatMessage {
                from: from.to_string(),
                content: content.to_string(),
                timestamp: NOW,
            })))
        );
    }

    #[test]
    fn test_user_to_admin_reaches_every_admin_in_tenant() {
        let mut registry = ConnectionRegistry::new();
        let mut admin1 = register(&mut registry, Role::Admin, "admin1", "CompanyA");
        let mut admin2 = register(&mut registry, Role::Admin, "admin2", "CompanyA");
        let mut other_tenant = register(&mut registry, Role::Admin, "admin3", "CompanyB");

        let sender = claims("CompanyA", "user1", Role::User);
        let delivered = route(&registry, &sender, &MessageIntent::to_admins("hi"), NOW).unwrap();

        assert_eq!(delivered, 2);
        expect_message(&mut admin1, "user1", "hi");
        expect_message(&mut admin2, "user1", "hi");
        assert!(other_tenant.try_recv().is_none());
    }

    #[test]
    fn test_user_to_admin_without_admins_is_no_recipients() {
        let mut registry = ConnectionRegistry::new();
        let _admin_elsewhere = register(&mut registry, Role::Admin, "admin1", "CompanyB");

        let sender = claims("CompanyA", "user1", Role::User);
        assert_eq!(
            route(&registry, &sender, &MessageIntent::to_admins("hi"), NOW),
            Err(RouteError::NoRecipients)
        );
    }

    #[test]
    fn test_admin_to_user_delivers_exactly_once() {
        let mut registry = ConnectionRegistry::new();
        let mut user1 = register(&mut registry, Role::User, "user1", "CompanyA");
        let mut user2 = register(&mut registry, Role::User, "user2", "CompanyA");

        let sender = claims("CompanyA", "admin1", Role::Admin);
        let delivered = route(
            &registry,
            &sender,
            &MessageIntent::to_user("user1", "hello"),
            NOW,
        )
        .unwrap();

        assert_eq!(delivered, 1);
        expect_message(&mut user1, "admin1", "hello");
        assert!(user1.try_recv().is_none());
        assert!(user2.try_recv().is_none());
    }

    #[test]
    fn test_admin_to_unknown_user_is_recipient_not_found() {
        let mut registry = ConnectionRegistry::new();
        let mut other_tenant_user = register(&mut registry, Role::User, "user1", "CompanyB");

        let sender = claims("CompanyA", "admin1", Role::Admin);
        assert_eq!(
            route(&registry, &sender, &MessageIntent::to_user("user1", "hello"), NOW),
            Err(RouteError::RecipientNotFound)
        );
        assert!(other_tenant_user.try_recv().is_none());

        let no_target = MessageIntent {
            target_identity: None,
            ..MessageIntent::to_user("user1", "hello")
        };
        assert_eq!(
            route(&registry, &sender, &no_target, NOW),
            Err(RouteError::RecipientNotFound)
        );
    }

    #[test]
    fn test_empty_content_checked_first() {
        let mut registry = ConnectionRegistry::new();
        let mut admin = register(&mut registry, Role::Admin, "admin1", "CompanyA");
        let _user = register(&mut registry, Role::User, "user1", "CompanyA");

        let user = claims("CompanyA", "user1", Role::User);
        let admin_claims = claims("CompanyA", "admin1", Role::Admin);
        let cases = [
            (&user, MessageIntent::to_admins("")),
            (&admin_claims, MessageIntent::to_user("user1", "")),
            (&user, MessageIntent::to_user("user1", "")),
            (
                &user,
                MessageIntent {
                    to_role: None,
                    content: String::new(),
                    target_identity: None,
                },
            ),
        ];
        for (sender, intent) in cases {
            assert_eq!(
                route(&registry, sender, &intent, NOW),
                Err(RouteError::EmptyContent)
            );
        }
        assert!(admin.try_recv().is_none());
    }

    #[test]
    fn test_disallowed_directions_are_unauthorized() {
        let mut registry = ConnectionRegistry::new();
        let mut user2 = register(&mut registry, Role::User, "user2", "CompanyA");
        let mut admin2 = register(&mut registry, Role::Admin, "admin2", "CompanyA");

        let user = claims("CompanyA", "user1", Role::User);
        let admin = claims("CompanyA", "admin1", Role::Admin);

        let cases = [
            (&user, MessageIntent::to_user("user2", "hi")),
            (&admin, MessageIntent::to_admins("hi")),
            (
                &user,
                MessageIntent {
                    to_role: None,
                    content: "hi".to_string(),
                    target_identity: None,
                },
            ),
        ];
        for (sender, intent) in cases {
            assert_eq!(
                route(&registry, sender, &intent, NOW),
                Err(RouteError::Unauthorized)
            );
        }
        assert!(user2.try_recv().is_none());
        assert!(admin2.try_recv().is_none());
    }
}
