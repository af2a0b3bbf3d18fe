//! Wire framing for the Shadowsocks SIP022 TCP protocol: destination
//! addresses, fixed/variable-length request headers, the fixed-length
//! response header, and the chunk length prefix used for payload
//! records. This crate knows nothing about AEAD or sockets; it only
//! encodes and decodes already-plaintext byte layouts.

mod address;
mod error;
mod header;

pub use address::Address;
pub use error::ProtocolError;
pub use header::{
    decode_chunk_length, encode_chunk_length, FixedRequestHeader, FixedResponseHeader,
    VariableRequestHeader, FIXED_REQUEST_HEADER_LEN, REQUEST_TYPE_CLIENT_STREAM,
    RESPONSE_TYPE_SERVER_STREAM,
};
