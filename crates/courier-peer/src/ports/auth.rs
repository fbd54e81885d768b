//! Authentication Port
//!
//! Judges the connect packet a remote sends while opening a connection.

use courier_types::ConnectPacket;
use std::net::SocketAddr;
use subtle::ConstantTimeEq;
use thiserror::Error;

/// Reason sent to a remote whose hail the authenticator refused.
pub const AUTH_REJECTED_REASON: &str = "Failed to authenticate connection";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthDecision {
    Accept,
    /// Refuse with a reason the remote gets to see.
    Reject(String),
}

impl AuthDecision {
    pub fn reject(reason: impl Into<String>) -> Self {
        AuthDecision::Reject(reason.into())
    }

    pub fn is_accept(&self) -> bool {
        matches!(self, AuthDecision::Accept)
    }
}

/// The authenticator itself failed; the connection is refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Authentication backend unavailable: {0}")]
    Unavailable(String),

    #[error("Authentication failed: {0}")]
    Failed(String),
}

/// Decides whether a connecting remote is let in.
pub trait Authenticator: Send + Sync + 'static {
    fn authenticate(&self, hail: &ConnectPacket, remote: SocketAddr)
        -> Result<AuthDecision, AuthError>;
}

impl<F> Authenticator for F
where
    F: Fn(&ConnectPacket, SocketAddr) -> Result<AuthDecision, AuthError> + Send + Sync + 'static,
{
    fn authenticate(
        &self,
        hail: &ConnectPacket,
        remote: SocketAddr,
    ) -> Result<AuthDecision, AuthError> {
        self(hail, remote)
    }
}

/// Accepts or rejects everyone.
#[derive(Debug, Clone, Copy)]
pub struct StaticAuthenticator {
    accept: bool,
}

impl StaticAuthenticator {
    pub fn new(accept: bool) -> Self {
        Self { accept }
    }
}

impl Authenticator for StaticAuthenticator {
    fn authenticate(&self, _: &ConnectPacket, _: SocketAddr) -> Result<AuthDecision, AuthError> {
        if self.accept {
            Ok(AuthDecision::Accept)
        } else {
            Ok(AuthDecision::reject(AUTH_REJECTED_REASON))
        }
    }
}

/// Accepts hails whose credential equals a shared secret.
#[derive(Clone)]
pub struct CredentialAuthenticator {
    secret: String,
}

impl CredentialAuthenticator {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }
}

impl std::fmt::Debug for CredentialAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialAuthenticator")
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl Authenticator for CredentialAuthenticator {
    fn authenticate(&self, hail: &ConnectPacket, _: SocketAddr) -> Result<AuthDecision, AuthError> {
        let matches: bool = hail
            .credential()
            .as_bytes()
            .ct_eq(self.secret.as_bytes())
            .into();

        if matches {
            Ok(AuthDecision::Accept)
        } else {
            Ok(AuthDecision::reject(AUTH_REJECTED_REASON))
        }
    }
}
