/// Malformed-input errors raised while decoding an inbound frame.
///
/// Never fatal: the router drops the event and echoes a diagnostic to the
/// originating connection only.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    #[error("malformed {event} payload: {reason}")]
    MalformedPayload { event: String, reason: String },

    #[error("invalid identity: {reason}")]
    InvalidIdentity {
        event: Option<String>,
        reason: String,
    },
}

impl ProtocolError {
    pub fn malformed(event: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedPayload {
            event: event.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_identity(reason: impl Into<String>) -> Self {
        Self::InvalidIdentity {
            event: None,
            reason: reason.into(),
        }
    }

    /// Attribute an identity error to the event whose payload carried it.
    pub fn in_event(self, name: &str) -> Self {
        match self {
            Self::InvalidIdentity { reason, .. } => Self::InvalidIdentity {
                event: Some(name.to_string()),
                reason,
            },
            other => other,
        }
    }

    /// Wire code carried in the `error` diagnostic.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidFrame(_) => "PARSE_ERROR",
            Self::MalformedPayload { .. } => "MALFORMED_PAYLOAD",
            Self::InvalidIdentity { .. } => "INVALID_IDENTITY",
        }
    }

    /// Name of the event the error relates to, when it got that far.
    pub fn event(&self) -> Option<&str> {
        match self {
            Self::MalformedPayload { event, .. } => Some(event),
            Self::InvalidIdentity { event, .. } => event.as_deref(),
            Self::InvalidFrame(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes() {
        assert_eq!(ProtocolError::InvalidFrame("x".into()).code(), "PARSE_ERROR");
        assert_eq!(
            ProtocolError::malformed("cancel_ride", "missing rideId").code(),
            "MALFORMED_PAYLOAD"
        );
        assert_eq!(ProtocolError::invalid_identity("empty").code(), "INVALID_IDENTITY");
    }

    #[test]
    fn display_names_event() {
        let err = ProtocolError::malformed("cancel_ride", "missing field `rideId`");
        assert_eq!(
            err.to_string(),
            "malformed cancel_ride payload: missing field `rideId`"
        );
        assert_eq!(err.event(), Some("cancel_ride"));
    }

    #[test]
    fn identity_error_carries_event_once_attributed() {
        let err = ProtocolError::invalid_identity("identity is empty");
        assert_eq!(err.event(), None);
        let err = err.in_event("join_private_chat");
        assert_eq!(err.event(), Some("join_private_chat"));
        assert_eq!(err.to_string(), "invalid identity: identity is empty");
    }

    #[test]
    fn in_event_leaves_other_errors_alone() {
        let err = ProtocolError::InvalidFrame("eof".into()).in_event("Login");
        assert_eq!(err.event(), None);
    }
}
