//! Frame decode errors.

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("buffer too short: need at least {need} bytes, found {found}")]
    BufferTooShort { need: usize, found: usize },
    #[error("unknown address type {0}")]
    UnknownAddressType(u8),
    #[error("domain name is not valid UTF-8")]
    DomainNotUtf8,
    #[error("request must carry padding or an initial payload, found neither")]
    NoInitialPayloadOrPadding,
    #[error("expected request type 0 (CLIENT_STREAM), found {0}")]
    InvalidRequestType(u8),
    #[error("expected response type 1 (SERVER_STREAM), found {0}")]
    InvalidResponseType(u8),
}
