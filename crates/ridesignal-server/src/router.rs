//! Classifies inbound events and fans them out.

use std::sync::Arc;

use ridesignal_core::events::Envelope;
use ridesignal_core::{Identity, InboundEvent, OutboundEvent, RoomId};
use serde_json::Value;

use crate::error::RouteError;
use crate::hub::Hub;
use crate::identity::{AcceptAnyIdentity, IdentityValidator};
use crate::lifecycle::{self, ConnectionSession};
use crate::rooms::JoinOutcome;

/// Outcome of one inbound frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Dispatch {
    /// Handled; `delivered` frames were queued for recipients.
    Routed { event: &'static str, delivered: usize },
    /// Unknown event name.
    Ignored,
    /// Dropped; a diagnostic went back to the sender.
    Rejected(RouteError),
}

pub struct EventRouter {
    hub: Arc<Hub>,
    validator: Arc<dyn IdentityValidator>,
}

impl EventRouter {
    pub fn new(hub: Arc<Hub>) -> Self {
        Self {
            hub,
            validator: Arc::new(AcceptAnyIdentity),
        }
    }

    pub fn with_validator(mut self, validator: Arc<dyn IdentityValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    /// Route one raw text frame received on `session`.
    pub async fn dispatch(&self, session: &mut ConnectionSession, raw: &str) -> Dispatch {
        if !session.is_open() {
            return Dispatch::Ignored;
        }

        let envelope = match Envelope::decode(raw) {
            Ok(envelope) => envelope,
            Err(e) => return self.reject(session, e.into()),
        };
        let name = envelope.event.clone();
        let event = match InboundEvent::classify(envelope) {
            Ok(Some(event)) => event,
            Ok(None) => {
                tracing::debug!(connection_id = %session.id(), event = %name, "Ignoring unknown event");
                return Dispatch::Ignored;
            }
            Err(e) => return self.reject(session, e.into()),
        };

        let label = event.name();
        self.hub
            .metrics()
            .increment_counter("events_received", &[("event", label)], 1);

        let routed = match event {
            InboundEvent::Login { identity } => self.login(session, identity).await,
            InboundEvent::SendRequest { payload } => {
                Ok(self.broadcast_except_sender(session, OutboundEvent::ReceiveRequest(payload)))
            }
            InboundEvent::SendNotification { payload } => Ok(
                self.broadcast_except_sender(session, OutboundEvent::ReceiveNotification(payload)),
            ),
            InboundEvent::JoinPrivateChat { sender, receiver } => {
                self.join_private_chat(session, &sender, &receiver)
            }
            InboundEvent::SendPrivateMessage { room_id, message } => {
                Ok(self.send_private_message(session, &room_id, message))
            }
            InboundEvent::CancelRide { ride_id } => Ok(self.cancel_ride(session, ride_id)),
        };

        match routed {
            Ok(delivered) => Dispatch::Routed {
                event: label,
                delivered,
            },
            Err(e) => self.reject(session, e),
        }
    }

    /// Transport-level disconnect. Safe to call more than once.
    pub fn disconnect(&self, session: &mut ConnectionSession) -> bool {
        lifecycle::disconnect(&self.hub, session)
    }

    async fn login(
        &self,
        session: &mut ConnectionSession,
        identity: Identity,
    ) -> Result<usize, RouteError> {
        if let Some(current) = session.identity() {
            tracing::debug!(
                connection_id = %session.id(),
                identity = %current,
                "Already identified, ignoring login"
            );
            return Ok(0);
        }

        self.validator
            .validate(session.id(), &identity)
            .await
            .map_err(RouteError::IdentityRejected)?;

        if self.hub.presence.register(&identity, session.id()) {
            tracing::info!(connection_id = %session.id(), identity = %identity, "User logged in");
            session.identify(identity);
            self.hub.refresh_gauges();
        } else {
            tracing::debug!(
                connection_id = %session.id(),
                identity = %identity,
                "Identity already online, keeping first session"
            );
        }
        Ok(0)
    }

    fn broadcast_except_sender(&self, session: &ConnectionSession, event: OutboundEvent) -> usize {
        self.hub
            .connections
            .broadcast_except(session.id(), &event.encode())
    }

    /// Join the sender, and the receiver's live connection if any, to the
    /// pair's room; acknowledge to the sender.
    ///
    /// `sender` must be this connection's own identity: the bound one once
    /// identified, and never an identity held by another live connection.
    fn join_private_chat(
        &self,
        session: &ConnectionSession,
        sender: &Identity,
        receiver: &Identity,
    ) -> Result<usize, RouteError> {
        let owned = match session.identity() {
            Some(bound) => bound == sender,
            None => self
                .hub
                .presence
                .lookup(sender)
                .map_or(true, |holder| &holder == session.id()),
        };
        if !owned {
            return Err(RouteError::SenderMismatch {
                claimed: sender.to_string(),
            });
        }

        let room = RoomId::private_chat(sender, receiver);
        self.hub.rooms.join(session.id(), &room);

        match self.hub.presence.lookup(receiver) {
            Some(peer) if &peer != session.id() => {
                if self.hub.rooms.join(&peer, &room) == JoinOutcome::UnknownConnection {
                    tracing::debug!(room_id = %room, peer = %peer, "Receiver left before joining");
                }
            }
            Some(_) => {}
            None => {
                tracing::debug!(room_id = %room, receiver = %receiver, "Receiver offline, joining sender only");
            }
        }

        tracing::debug!(connection_id = %session.id(), room_id = %room, "Joined private chat");
        let ack = OutboundEvent::PrivateChatJoined { room_id: room }.encode();
        Ok(usize::from(self.hub.connections.send_to(session.id(), ack).is_queued()))
    }

    fn send_private_message(&self, session: &ConnectionSession, room: &RoomId, message: Value) -> usize {
        let frame = OutboundEvent::ReceivePrivateMessage(message).encode();
        let delivered = self.hub.rooms.broadcast(room, &frame, &self.hub.connections);
        tracing::debug!(connection_id = %session.id(), room_id = %room, delivered, "Private message");
        delivered
    }

    fn cancel_ride(&self, session: &ConnectionSession, ride_id: String) -> usize {
        tracing::info!(connection_id = %session.id(), ride_id = %ride_id, "Ride cancelled");
        self.hub
            .connections
            .broadcast_all(&OutboundEvent::RideCancelled { ride_id }.encode())
    }

    fn reject(&self, session: &ConnectionSession, err: RouteError) -> Dispatch {
        tracing::warn!(
            connection_id = %session.id(),
            code = err.code(),
            error = %err,
            "Dropping inbound event"
        );
        self.hub
            .metrics()
            .increment_counter("events_rejected", &[("code", err.code())], 1);

        let diagnostic = OutboundEvent::Error {
            code: err.code().to_string(),
            message: err.to_string(),
            event: err.event().map(str::to_string),
        };
        self.hub.connections.send_to(session.id(), diagnostic.encode());
        Dispatch::Rejected(err)
    }
}
