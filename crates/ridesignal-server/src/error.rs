use ridesignal_core::ProtocolError;
use ridesignal_settings::SettingsError;

/// Why an inbound event was dropped. Reported to the sender only.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("identity rejected: {0}")]
    IdentityRejected(String),

    /// `join_private_chat` named a sender this connection is not bound to.
    #[error("sender {claimed} does not belong to this connection")]
    SenderMismatch { claimed: String },
}

impl RouteError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Protocol(e) => e.code(),
            Self::IdentityRejected(_) => "IDENTITY_REJECTED",
            Self::SenderMismatch { .. } => "SENDER_MISMATCH",
        }
    }

    pub fn event(&self) -> Option<&str> {
        match self {
            Self::Protocol(e) => e.event(),
            Self::IdentityRejected(_) => Some(ridesignal_core::events::LOGIN),
            Self::SenderMismatch { .. } => Some(ridesignal_core::events::JOIN_PRIVATE_CHAT),
        }
    }
}

/// Startup failures. The only errors that stop the process.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid CORS origin: {0}")]
    InvalidOrigin(String),

    #[error(transparent)]
    Settings(#[from] SettingsError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_pass_through_protocol_errors() {
        let err: RouteError = ProtocolError::malformed("cancel_ride", "missing rideId").into();
        assert_eq!(err.code(), "MALFORMED_PAYLOAD");
        assert_eq!(err.event(), Some("cancel_ride"));
        assert_eq!(err.to_string(), "malformed cancel_ride payload: missing rideId");
    }

    #[test]
    fn identity_rejection_points_at_login() {
        let err = RouteError::IdentityRejected("unknown user".into());
        assert_eq!(err.code(), "IDENTITY_REJECTED");
        assert_eq!(err.event(), Some("Login"));
    }

    #[test]
    fn sender_mismatch_points_at_join() {
        let err = RouteError::SenderMismatch {
            claimed: "alice".into(),
        };
        assert_eq!(err.code(), "SENDER_MISMATCH");
        assert_eq!(err.event(), Some("join_private_chat"));
        assert_eq!(err.to_string(), "sender alice does not belong to this connection");
    }
}
