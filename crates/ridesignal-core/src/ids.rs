use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::errors::ProtocolError;

/// Longest identity accepted on `Login`.
pub const MAX_IDENTITY_LEN: usize = 128;

const ROOM_SEPARATOR: char = '_';
const ROOM_ESCAPE: char = '\\';

macro_rules! string_id {
    ($name:ident) => {
        #[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn from_raw(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::convert::Infallible;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.to_owned()))
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(ConnectionId);
string_id!(Identity);
string_id!(RoomId);

impl ConnectionId {
    /// Transport-assigned identifier, `conn_<uuid v7>`.
    pub fn new() -> Self {
        Self(format!("conn_{}", Uuid::now_v7()))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl Identity {
    /// Validate a client-supplied identity.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ProtocolError::invalid_identity("identity is empty"));
        }
        if trimmed.chars().count() > MAX_IDENTITY_LEN {
            return Err(ProtocolError::invalid_identity(format!(
                "identity longer than {MAX_IDENTITY_LEN} characters"
            )));
        }
        if trimmed.chars().any(char::is_control) {
            return Err(ProtocolError::invalid_identity(
                "identity contains control characters",
            ));
        }
        Ok(Self(trimmed.to_owned()))
    }
}

impl RoomId {
    /// Room shared by a private conversation between two identities.
    ///
    /// Order-independent: both participants resolve the same room regardless
    /// of who initiates. Each part is escaped so distinct pairs never collide.
    pub fn private_chat(a: &Identity, b: &Identity) -> Self {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let mut name = String::with_capacity(lo.0.len() + hi.0.len() + 1);
        push_escaped(&mut name, lo.as_str());
        name.push(ROOM_SEPARATOR);
        push_escaped(&mut name, hi.as_str());
        Self(name)
    }
}

fn push_escaped(out: &mut String, part: &str) {
    for c in part.chars() {
        if c == ROOM_SEPARATOR || c == ROOM_ESCAPE {
            out.push(ROOM_ESCAPE);
        }
        out.push(c);
    }
}
