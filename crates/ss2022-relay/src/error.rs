//! Session and server error taxonomy.

use thiserror::Error;

/// Errors that terminate a single client session. Every variant maps to
/// either a graceful FIN close (`ClientDisconnected`/`RemoteDisconnected`)
/// or an abortive RST close (everything else).
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("buffer too short for current decoder state")]
    InitialRequestTooSmall,
    #[error("unknown address type {0}")]
    UnknownAddressType(u8),
    #[error("request carries neither padding nor an initial payload")]
    NoInitialPayloadOrPadding,
    #[error("request timestamp is outside the ±30s freshness window")]
    TimestampTooOld,
    #[error("request salt was already seen within the replay window")]
    DuplicateSalt,
    #[error("AEAD authentication failed")]
    AuthFailed,
    #[error("could not connect to remote target: {0}")]
    CantConnectToRemote(#[source] std::io::Error),
    #[error("client disconnected")]
    ClientDisconnected,
    #[error("remote disconnected")]
    RemoteDisconnected,
    #[error("protocol decode error: {0}")]
    Protocol(ss2022_protocol::ProtocolError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<ss2022_protocol::ProtocolError> for SessionError {
    /// Flattens the wire-level error taxonomy into the session-level one,
    /// so `UnknownAddressType`/`NoInitialPayloadOrPadding` are
    /// distinguishable by metrics and logs rather than all collapsing
    /// into a single `Protocol(_)` bucket.
    fn from(err: ss2022_protocol::ProtocolError) -> Self {
        match err {
            ss2022_protocol::ProtocolError::UnknownAddressType(atyp) => {
                SessionError::UnknownAddressType(atyp)
            }
            ss2022_protocol::ProtocolError::NoInitialPayloadOrPadding => {
                SessionError::NoInitialPayloadOrPadding
            }
            other => SessionError::Protocol(other),
        }
    }
}

impl SessionError {
    /// Whether this error represents an ordinary peer close (graceful FIN)
    /// rather than a protocol/crypto violation (abortive RST).
    pub fn is_graceful(&self) -> bool {
        matches!(
            self,
            SessionError::ClientDisconnected | SessionError::RemoteDisconnected
        )
    }
}

impl From<ss2022_crypto::CryptoError> for SessionError {
    fn from(_: ss2022_crypto::CryptoError) -> Self {
        SessionError::AuthFailed
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
