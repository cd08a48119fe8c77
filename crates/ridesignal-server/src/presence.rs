//! Who is online, and on which connection.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use ridesignal_core::{ConnectionId, Identity};

/// Identity ↔ connection map with a reverse index for O(1) disconnect cleanup.
///
/// At most one entry per identity: the first connection to log in keeps it
/// until that connection goes away. Lock order is `by_identity` then
/// `by_connection`; nothing holds the reverse order.
#[derive(Default)]
pub struct PresenceRegistry {
    by_identity: DashMap<Identity, ConnectionId>,
    by_connection: DashMap<ConnectionId, Identity>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `identity` as online on `connection`.
    ///
    /// Returns `false` without touching anything when the identity is already
    /// online elsewhere or the connection is already bound to an identity.
    pub fn register(&self, identity: &Identity, connection: &ConnectionId) -> bool {
        if self.by_connection.contains_key(connection) {
            return false;
        }
        match self.by_identity.entry(identity.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(connection.clone());
                self.by_connection.insert(connection.clone(), identity.clone());
                true
            }
        }
    }

    /// Drop whatever entry `connection` owns. No-op for anonymous connections.
    pub fn unregister(&self, connection: &ConnectionId) -> Option<Identity> {
        let (_, identity) = self.by_connection.remove(connection)?;
        self.by_identity
            .remove_if(&identity, |_, owner| owner == connection);
        Some(identity)
    }

    pub fn lookup(&self, identity: &Identity) -> Option<ConnectionId> {
        self.by_identity.get(identity).map(|c| c.value().clone())
    }

    pub fn identity_of(&self, connection: &ConnectionId) -> Option<Identity> {
        self.by_connection.get(connection).map(|i| i.value().clone())
    }

    pub fn len(&self) -> usize {
        self.by_identity.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_identity.is_empty()
    }
}
