//! Seam for the external identity/auth collaborator consulted on `Login`.

use std::collections::HashSet;

use async_trait::async_trait;
use ridesignal_core::{ConnectionId, Identity};

#[async_trait]
pub trait IdentityValidator: Send + Sync {
    /// `Err(reason)` refuses the login; the reason is echoed to the caller.
    async fn validate(&self, connection: &ConnectionId, identity: &Identity) -> Result<(), String>;
}

/// Trusts whatever identity the client claims.
///
/// Client-supplied identities are unauthenticated under this validator;
/// production deployments should inject one backed by the auth service.
pub struct AcceptAnyIdentity;

#[async_trait]
impl IdentityValidator for AcceptAnyIdentity {
    async fn validate(&self, _connection: &ConnectionId, _identity: &Identity) -> Result<(), String> {
        Ok(())
    }
}

/// Accepts only identities from a fixed set.
pub struct AllowList {
    allowed: HashSet<Identity>,
}

impl AllowList {
    pub fn new(allowed: impl IntoIterator<Item = Identity>) -> Self {
        Self {
            allowed: allowed.into_iter().collect(),
        }
    }
}

#[async_trait]
impl IdentityValidator for AllowList {
    async fn validate(&self, _connection: &ConnectionId, identity: &Identity) -> Result<(), String> {
        if self.allowed.contains(identity) {
            Ok(())
        } else {
            Err(format!("unknown user: {identity}"))
        }
    }
}
