//! Per-connection setup and teardown.
//!
//! `Connected` → `Identified` → `Disconnected`. Teardown runs exactly once,
//! whatever ended the connection.

use chrono::{DateTime, Utc};
use ridesignal_core::{ConnectionId, Identity, OutboundEvent};

use crate::connection::OutboundReceiver;
use crate::hub::Hub;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    Identified,
    Disconnected,
}

/// One live network connection. Owned by its socket driver.
#[derive(Debug)]
pub struct ConnectionSession {
    id: ConnectionId,
    identity: Option<Identity>,
    state: SessionState,
    connected_at: DateTime<Utc>,
}

impl ConnectionSession {
    fn new(id: ConnectionId) -> Self {
        Self {
            id,
            identity: None,
            state: SessionState::Connected,
            connected_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state != SessionState::Disconnected
    }

    /// Bind an identity. Only valid from `Connected`.
    pub(crate) fn identify(&mut self, identity: Identity) -> bool {
        if self.state != SessionState::Connected {
            return false;
        }
        self.identity = Some(identity);
        self.state = SessionState::Identified;
        true
    }
}

/// Open a session: outbound queue, room-membership slot, `connected` greeting.
pub fn connect(hub: &Hub) -> (ConnectionSession, OutboundReceiver) {
    let (id, outbound) = hub.connections.open();
    hub.rooms.open(&id);
    hub.connections.send_to(
        &id,
        OutboundEvent::Connected {
            connection_id: id.clone(),
        }
        .encode(),
    );

    hub.metrics().increment_counter("connections_opened", &[], 1);
    hub.refresh_gauges();
    tracing::info!(connection_id = %id, "Connection opened");

    (ConnectionSession::new(id), outbound)
}

/// Tear a session down: leave all rooms, drop presence, close the queue.
///
/// Returns `false` when the session was already disconnected.
pub fn disconnect(hub: &Hub, session: &mut ConnectionSession) -> bool {
    if session.state == SessionState::Disconnected {
        return false;
    }

    let rooms_left = hub.rooms.leave_all(&session.id);
    let released = hub.presence.unregister(&session.id);
    hub.connections.close(&session.id);
    session.state = SessionState::Disconnected;

    hub.metrics().increment_counter("connections_closed", &[], 1);
    hub.refresh_gauges();
    tracing::info!(
        connection_id = %session.id,
        identity = ?released.as_ref().map(Identity::as_str),
        rooms_left = rooms_left.len(),
        session_secs = (Utc::now() - session.connected_at).num_seconds(),
        "Connection closed"
    );
    true
}
