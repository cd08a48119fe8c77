pub mod errors;
pub mod events;
pub mod ids;

pub use errors::ProtocolError;
pub use events::{Frame, InboundEvent, OutboundEvent};
pub use ids::{ConnectionId, Identity, RoomId};
