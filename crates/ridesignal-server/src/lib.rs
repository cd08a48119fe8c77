pub mod connection;
pub mod error;
pub mod hub;
pub mod identity;
pub mod lifecycle;
pub mod presence;
pub mod rooms;
pub mod router;
pub mod server;
pub mod socket;

pub use error::{RouteError, ServerError};
pub use hub::{Hub, HubStats};
pub use identity::{AcceptAnyIdentity, AllowList, IdentityValidator};
pub use router::{Dispatch, EventRouter};
pub use server::{start, ServerConfig, ServerHandle};
