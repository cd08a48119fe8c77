//! Wire protocol: every text frame is `{ "event": <name>, "data": <payload> }`.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ProtocolError;
use crate::ids::{ConnectionId, Identity, RoomId};

/// An encoded outbound frame, shared across fan-out recipients.
pub type Frame = Arc<str>;

pub const LOGIN: &str = "Login";
pub const SEND_REQUEST: &str = "send_request";
pub const SEND_NOTIFICATION: &str = "send_notification";
pub const JOIN_PRIVATE_CHAT: &str = "join_private_chat";
pub const SEND_PRIVATE_MESSAGE: &str = "send_private_message";
pub const CANCEL_RIDE: &str = "cancel_ride";

/// Raw envelope as read off the socket.
#[derive(Debug, Deserialize)]
pub struct Envelope {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    pub fn decode(raw: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(raw).map_err(|e| ProtocolError::InvalidFrame(e.to_string()))
    }
}

/// Classified inbound event.
#[derive(Clone, Debug, PartialEq)]
pub enum InboundEvent {
    Login { identity: Identity },
    SendRequest { payload: Value },
    SendNotification { payload: Value },
    JoinPrivateChat { sender: Identity, receiver: Identity },
    SendPrivateMessage { room_id: RoomId, message: Value },
    CancelRide { ride_id: String },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LoginData {
    Bare(String),
    Object {
        #[serde(alias = "username")]
        identity: String,
    },
}

#[derive(Deserialize)]
struct JoinPrivateChatData {
    sender: String,
    receiver: String,
}

#[derive(Deserialize)]
struct SendPrivateMessageData {
    #[serde(rename = "roomId", alias = "roomName", alias = "room_id")]
    room_id: String,
    message: Value,
}

#[derive(Deserialize)]
struct CancelRideData {
    #[serde(rename = "rideId", alias = "ride_id")]
    ride_id: String,
}

impl InboundEvent {
    /// Decode and classify a raw text frame.
    ///
    /// `Ok(None)` means the event name is unknown and should be ignored.
    pub fn decode(raw: &str) -> Result<Option<Self>, ProtocolError> {
        Self::classify(Envelope::decode(raw)?)
    }

    pub fn classify(envelope: Envelope) -> Result<Option<Self>, ProtocolError> {
        let Envelope { event, data } = envelope;
        let parsed = match event.as_str() {
            LOGIN | "login" => {
                let identity = match payload::<LoginData>(LOGIN, data)? {
                    LoginData::Bare(s) | LoginData::Object { identity: s } => s,
                };
                Self::Login {
                    identity: Identity::parse(&identity).map_err(|e| e.in_event(LOGIN))?,
                }
            }
            SEND_REQUEST => Self::SendRequest {
                payload: opaque(SEND_REQUEST, data)?,
            },
            SEND_NOTIFICATION => Self::SendNotification {
                payload: opaque(SEND_NOTIFICATION, data)?,
            },
            JOIN_PRIVATE_CHAT => {
                let d: JoinPrivateChatData = payload(JOIN_PRIVATE_CHAT, data)?;
                Self::JoinPrivateChat {
                    sender: Identity::parse(&d.sender)
                        .map_err(|e| e.in_event(JOIN_PRIVATE_CHAT))?,
                    receiver: Identity::parse(&d.receiver)
                        .map_err(|e| e.in_event(JOIN_PRIVATE_CHAT))?,
                }
            }
            SEND_PRIVATE_MESSAGE => {
                let d: SendPrivateMessageData = payload(SEND_PRIVATE_MESSAGE, data)?;
                if d.room_id.is_empty() {
                    return Err(ProtocolError::malformed(SEND_PRIVATE_MESSAGE, "roomId is empty"));
                }
                Self::SendPrivateMessage {
                    room_id: RoomId::from_raw(d.room_id),
                    message: d.message,
                }
            }
            CANCEL_RIDE => {
                let d: CancelRideData = payload(CANCEL_RIDE, data)?;
                if d.ride_id.is_empty() {
                    return Err(ProtocolError::malformed(CANCEL_RIDE, "rideId is empty"));
                }
                Self::CancelRide { ride_id: d.ride_id }
            }
            _ => return Ok(None),
        };
        Ok(Some(parsed))
    }

    /// Canonical wire name, used as a log and metrics label.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Login { .. } => LOGIN,
            Self::SendRequest { .. } => SEND_REQUEST,
            Self::SendNotification { .. } => SEND_NOTIFICATION,
            Self::JoinPrivateChat { .. } => JOIN_PRIVATE_CHAT,
            Self::SendPrivateMessage { .. } => SEND_PRIVATE_MESSAGE,
            Self::CancelRide { .. } => CANCEL_RIDE,
        }
    }
}

fn payload<T: DeserializeOwned>(event: &str, data: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(data).map_err(|e| ProtocolError::malformed(event, e.to_string()))
}

fn opaque(event: &str, data: Value) -> Result<Value, ProtocolError> {
    if data.is_null() {
        return Err(ProtocolError::malformed(event, "missing data"));
    }
    Ok(data)
}

/// Events pushed to clients.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum OutboundEvent {
    Connected {
        connection_id: ConnectionId,
    },
    ReceiveRequest(Value),
    ReceiveNotification(Value),
    PrivateChatJoined {
        room_id: RoomId,
    },
    ReceivePrivateMessage(Value),
    RideCancelled {
        ride_id: String,
    },
    Error {
        code: String,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        event: Option<String>,
    },
}

impl OutboundEvent {
    pub fn diagnostic(err: &ProtocolError) -> Self {
        Self::Error {
            code: err.code().to_string(),
            message: err.to_string(),
            event: err.event().map(str::to_string),
        }
    }

    /// Serialize once for fan-out.
    pub fn encode(&self) -> Frame {
        match serde_json::to_string(self) {
            Ok(json) => Arc::from(json),
            // Unreachable for these variants; still emit a well-formed frame.
            Err(_) => Arc::from(r#"{"event":"error","data":{"code":"INTERNAL_ERROR","message":"encode failed"}}"#),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(v: Value) -> Result<Option<InboundEvent>, ProtocolError> {
        InboundEvent::decode(&v.to_string())
    }

    #[test]
    fn login_accepts_bare_string() {
        let ev = decode(json!({"event": "Login", "data": "alice"})).unwrap().unwrap();
        assert_eq!(ev, InboundEvent::Login { identity: Identity::from_raw("alice") });
    }

    #[test]
    fn login_accepts_object_and_lowercase_alias() {
        let ev = decode(json!({"event": "login", "data": {"username": "bob"}}))
            .unwrap()
            .unwrap();
        assert_eq!(ev, InboundEvent::Login { identity: Identity::from_raw("bob") });
    }

    #[test]
    fn login_without_identity_is_malformed() {
        let err = decode(json!({"event": "Login"})).unwrap_err();
        assert_eq!(err.code(), "MALFORMED_PAYLOAD");
        let err = decode(json!({"event": "Login", "data": "  "})).unwrap_err();
        assert_eq!(err.code(), "INVALID_IDENTITY");
    }

    #[test]
    fn request_payload_is_passed_through() {
        let ev = decode(json!({"event": "send_request", "data": {"from": "a", "seats": 2}}))
            .unwrap()
            .unwrap();
        assert_eq!(
            ev,
            InboundEvent::SendRequest { payload: json!({"from": "a", "seats": 2}) }
        );
    }

    #[test]
    fn notification_without_data_is_malformed() {
        let err = decode(json!({"event": "send_notification"})).unwrap_err();
        assert_eq!(err.event(), Some("send_notification"));
    }

    #[test]
    fn private_message_accepts_room_name_alias() {
        let ev = decode(json!({
            "event": "send_private_message",
            "data": {"roomName": "alice_bob", "message": {"text": "hi"}}
        }))
        .unwrap()
        .unwrap();
        assert_eq!(
            ev,
            InboundEvent::SendPrivateMessage {
                room_id: RoomId::from_raw("alice_bob"),
                message: json!({"text": "hi"}),
            }
        );
    }

    #[test]
    fn private_message_missing_message_is_malformed() {
        let err = decode(json!({"event": "send_private_message", "data": {"roomId": "r"}}))
            .unwrap_err();
        assert_eq!(err.code(), "MALFORMED_PAYLOAD");
    }

    #[test]
    fn join_requires_both_parties() {
        let err = decode(json!({"event": "join_private_chat", "data": {"sender": "alice"}}))
            .unwrap_err();
        assert_eq!(err.event(), Some("join_private_chat"));
    }

    #[test]
    fn invalid_party_names_the_event() {
        let err = decode(json!({
            "event": "join_private_chat",
            "data": {"sender": "alice", "receiver": ""}
        }))
        .unwrap_err();
        assert_eq!(err.code(), "INVALID_IDENTITY");
        assert_eq!(err.event(), Some("join_private_chat"));

        let err = decode(json!({"event": "Login", "data": "\u{7}"})).unwrap_err();
        assert_eq!(err.event(), Some("Login"));
    }

    #[test]
    fn cancel_ride_requires_ride_id() {
        assert!(decode(json!({"event": "cancel_ride", "data": {}})).is_err());
        assert!(decode(json!({"event": "cancel_ride", "data": {"rideId": ""}})).is_err());
        let ev = decode(json!({"event": "cancel_ride", "data": {"rideId": "r1"}}))
            .unwrap()
            .unwrap();
        assert_eq!(ev.name(), CANCEL_RIDE);
    }

    #[test]
    fn unknown_event_is_ignored() {
        assert_eq!(decode(json!({"event": "typing", "data": {}})).unwrap(), None);
    }

    #[test]
    fn garbage_frame_is_parse_error() {
        let err = InboundEvent::decode("not json").unwrap_err();
        assert_eq!(err.code(), "PARSE_ERROR");
        let err = InboundEvent::decode(r#"{"data": 1}"#).unwrap_err();
        assert_eq!(err.code(), "PARSE_ERROR");
    }

    #[test]
    fn outbound_struct_variant_shape() {
        let frame = OutboundEvent::PrivateChatJoined { room_id: RoomId::from_raw("alice_bob") }.encode();
        let v: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(v, json!({"event": "private_chat_joined", "data": {"roomId": "alice_bob"}}));
    }

    #[test]
    fn outbound_passthrough_shape() {
        let frame = OutboundEvent::ReceiveRequest(json!({"seats": 2})).encode();
        let v: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(v, json!({"event": "receive_request", "data": {"seats": 2}}));

        let frame = OutboundEvent::RideCancelled { ride_id: "r1".into() }.encode();
        let v: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(v, json!({"event": "ride_cancelled", "data": {"rideId": "r1"}}));
    }

    #[test]
    fn diagnostic_carries_code_and_event() {
        let err = ProtocolError::malformed(CANCEL_RIDE, "missing field `rideId`");
        let v: Value = serde_json::from_str(&OutboundEvent::diagnostic(&err).encode()).unwrap();
        assert_eq!(v["event"], "error");
        assert_eq!(v["data"]["code"], "MALFORMED_PAYLOAD");
        assert_eq!(v["data"]["event"], "cancel_ride");

        let err = ProtocolError::InvalidFrame("eof".into());
        let v: Value = serde_json::from_str(&OutboundEvent::diagnostic(&err).encode()).unwrap();
        assert!(v["data"].get("event").is_none());
    }
}
