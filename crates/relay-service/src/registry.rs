//! Connection registry.
//!
//! Two role mappings (`users`, `admins`) from `(tenant_id, identity)` to the
//! live [`ConnectionHandle`], plus a reverse index from connection ID to key.
//!
//! # Invariants
//!
//! - At most one entry per `(role, tenant_id, identity)`; `put` overwrites.
//! - Every entry's handle ID appears exactly once in the reverse index, and the
//!   reverse index holds nothing else. A superseded handle is unindexed, so its
//!   later disconnect removes nothing.
//! - A handle addresses at most one entry.
//! - Lookups are always scoped to one tenant.
//!
//! The registry itself is not synchronized. The relay actor owns it, which
//! serializes every read-modify-write.

use crate::actors::connection::ConnectionHandle;
use crate::auth::Role;
use common::types::ConnectionId;
use indexmap::IndexMap;
use std::collections::HashMap;
use tracing::debug;

/// A registered connection.
#[derive(Debug, Clone)]
pub struct SessionEntry {
    pub identity: String,
    pub tenant_id: String,
    pub handle: ConnectionHandle,
}

/// What `remove_by_handle` took out of the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovedSession {
    pub role: Role,
    pub identity: String,
    pub tenant_id: String,
}

/// Per-role mapping, partitioned by tenant. Tenants keep insertion order.
#[derive(Debug, Default)]
struct RoleMap {
    tenants: HashMap<String, IndexMap<String, ConnectionHandle>>,
    len: usize,
}

impl RoleMap {
    fn insert(
        &mut self,
        tenant_id: &str,
        identity: &str,
        handle: ConnectionHandle,
    ) -> Option<ConnectionHandle> {
        let previous = self
            .tenants
            .entry(tenant_id.to_string())
            .or_default()
            .insert(identity.to_string(), handle);
        if previous.is_none() {
            self.len += 1;
        }
        previous
    }

    fn remove(&mut self, tenant_id: &str, identity: &str) -> Option<ConnectionHandle> {
        let tenant = self.tenants.get_mut(tenant_id)?;
        let removed = tenant.shift_remove(identity)?;
        if tenant.is_empty() {
            self.tenants.remove(tenant_id);
        }
        self.len -= 1;
        Some(removed)
    }

    fn get(&self, tenant_id: &str, identity: &str) -> Option<&ConnectionHandle> {
        self.tenants.get(tenant_id)?.get(identity)
    }

    fn tenant(&self, tenant_id: &str) -> Option<&IndexMap<String, ConnectionHandle>> {
        self.tenants.get(tenant_id)
    }
}

#[derive(Debug, Clone)]
struct IndexKey {
    role: Role,
    tenant_id: String,
    identity: String,
}

/// In-memory registry of live connections.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    users: RoleMap,
    admins: RoleMap,
    by_handle: HashMap<ConnectionId, IndexKey>,
}

impl ConnectionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self, role: Role) -> &RoleMap {
        match role {
            Role::User => &self.users,
            Role::Admin => &self.admins,
        }
    }

    fn map_mut(&mut self, role: Role) -> &mut RoleMap {
        match role {
            Role::User => &mut self.users,
            Role::Admin => &mut self.admins,
        }
    }

    /// Insert or overwrite the entry for `identity` in `role`'s mapping.
    ///
    /// Returns the previous entry for the same key, if any. Its handle is no
    /// longer registered; closing it is the caller's decision.
    pub fn put(
        &mut self,
        role: Role,
        identity: &str,
        tenant_id: &str,
        handle: ConnectionHandle,
    ) -> Option<SessionEntry> {
        let id = handle.id();

        // A handle re-registered under another key leaves its old entry
        if let Some(old_key) = self.by_handle.get(&id).cloned() {
            let same_key = old_key.role == role
                && old_key.tenant_id == tenant_id
                && old_key.identity == identity;
            if !same_key {
                self.map_mut(old_key.role)
                    .remove(&old_key.tenant_id, &old_key.identity);
                self.by_handle.remove(&id);
            }
        }

        let previous = self.map_mut(role).insert(tenant_id, identity, handle);
        if let Some(old) = &previous {
            if old.id() != id {
                self.by_handle.remove(&old.id());
            }
        }
        self.by_handle.insert(
            id,
            IndexKey {
                role,
                tenant_id: tenant_id.to_string(),
                identity: identity.to_string(),
            },
        );

        debug!(
            target: "relay.registry",
            role = %role,
            tenant_id = %tenant_id,
            connection_id = %id,
            superseded = previous.is_some(),
            "Registry entry stored"
        );

        previous.map(|handle| SessionEntry {
            identity: identity.to_string(),
            tenant_id: tenant_id.to_string(),
            handle,
        })
    }

    /// Remove the entry registered with this connection, if any.
    pub fn remove_by_handle(&mut self, connection_id: ConnectionId) -> Option<RemovedSession> {
        let key = self.by_handle.remove(&connection_id)?;
        self.map_mut(key.role).remove(&key.tenant_id, &key.identity);

        debug!(
            target: "relay.registry",
            role = %key.role,
            tenant_id = %key.tenant_id,
            connection_id = %connection_id,
            "Registry entry removed"
        );

        Some(RemovedSession {
            role: key.role,
            identity: key.identity,
            tenant_id: key.tenant_id,
        })
    }

    /// Live user identities in `tenant_id`, in registration order.
    #[must_use]
    pub fn list_users(&self, tenant_id: &str) -> Vec<String> {
        self.users
            .tenant(tenant_id)
            .map(|tenant| tenant.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Live admin handles in `tenant_id`, in registration order.
    #[must_use]
    pub fn find_admins(&self, tenant_id: &str) -> Vec<&ConnectionHandle> {
        self.admins
            .tenant(tenant_id)
            .map(|tenant| tenant.values().collect())
            .unwrap_or_default()
    }

    /// The live handle of `identity` among `tenant_id`'s users.
    #[must_use]
    pub fn find_user(&self, tenant_id: &str, identity: &str) -> Option<&ConnectionHandle> {
        self.users.get(tenant_id, identity)
    }

    /// Total entries across both roles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.users.len + self.admins.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `(users, admins)` across all tenants.
    #[must_use]
    pub fn counts(&self) -> (usize, usize) {
        (self.users.len, self.admins.len)
    }

    /// Number of entries for one role across all tenants.
    #[must_use]
    pub fn count(&self, role: Role) -> usize {
        self.map(role).len
    }

    /// Whether this connection currently backs an entry.
    #[must_use]
    pub fn contains_handle(&self, connection_id: ConnectionId) -> bool {
        self.by_handle.contains_key(&connection_id)
    }

    /// Remove every entry, returning the handles that were registered.
    pub fn drain(&mut self) -> Vec<ConnectionHandle> {
        self.by_handle.clear();
        let users = std::mem::take(&mut self.users);
        let admins = std::mem::take(&mut self.admins);
        users
            .tenants
            .into_values()
            .chain(admins.tenants.into_values())
            .flat_map(IndexMap::into_values)
            .collect()
    }
}
