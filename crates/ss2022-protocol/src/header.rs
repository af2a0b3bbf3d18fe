//! The fixed and variable-length request/response headers, and the
//! 2-byte chunk length prefix used for every payload frame after the
//! first. All integers are big-endian on the wire.

use bytes::Bytes;

use crate::address::Address;
use crate::error::ProtocolError;

/// `type` byte identifying a client->server stream frame.
pub const REQUEST_TYPE_CLIENT_STREAM: u8 = 0;
/// `type` byte identifying a server->client stream frame.
pub const RESPONSE_TYPE_SERVER_STREAM: u8 = 1;

/// Plaintext length of [`FixedRequestHeader`] (excludes the AEAD tag).
pub const FIXED_REQUEST_HEADER_LEN: usize = 11;

/// `type(1) || timestamp(8) || length(2)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedRequestHeader {
    pub timestamp: u64,
    /// Length of the upcoming variable-length header ciphertext
    /// (excluding its tag).
    pub length: u16,
}

impl FixedRequestHeader {
    pub fn encode(&self) -> [u8; FIXED_REQUEST_HEADER_LEN] {
        let mut out = [0u8; FIXED_REQUEST_HEADER_LEN];
        out[0] = REQUEST_TYPE_CLIENT_STREAM;
        out[1..9].copy_from_slice(&self.timestamp.to_be_bytes());
        out[9..11].copy_from_slice(&self.length.to_be_bytes());
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        if buf.len() < FIXED_REQUEST_HEADER_LEN {
            return Err(ProtocolError::BufferTooShort {
                need: FIXED_REQUEST_HEADER_LEN,
                found: buf.len(),
            });
        }
        let ty = buf[0];
        if ty != REQUEST_TYPE_CLIENT_STREAM {
            return Err(ProtocolError::InvalidRequestType(ty));
        }
        let timestamp = u64::from_be_bytes(buf[1..9].try_into().unwrap());
        let length = u16::from_be_bytes(buf[9..11].try_into().unwrap());
        Ok(Self { timestamp, length })
    }
}

/// `address_type || address || port(2) || padding_length(2) || padding ||
/// initial_payload`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableRequestHeader {
    pub address: Address,
    pub port: u16,
    pub padding_length: u16,
    pub initial_payload: Bytes,
}

impl VariableRequestHeader {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.address.encode(&mut out);
        out.extend_from_slice(&self.port.to_be_bytes());
        out.extend_from_slice(&self.padding_length.to_be_bytes());
        out.resize(out.len() + self.padding_length as usize, 0);
        out.extend_from_slice(&self.initial_payload);
        out
    }

    /// Decode from a fully AEAD-opened plaintext block.
    pub fn decode(block: &[u8]) -> Result<Self, ProtocolError> {
        let mut cursor = block;
        let address = Address::decode(&mut cursor)?;

        if cursor.len() < 4 {
            return Err(ProtocolError::BufferTooShort {
                need: 4,
                found: cursor.len(),
            });
        }
        let port = u16::from_be_bytes(cursor[0..2].try_into().unwrap());
        let padding_length = u16::from_be_bytes(cursor[2..4].try_into().unwrap());
        cursor = &cursor[4..];

        let padding_len = padding_length as usize;
        if cursor.len() < padding_len {
            return Err(ProtocolError::BufferTooShort {
                need: padding_len,
                found: cursor.len(),
            });
        }
        cursor = &cursor[padding_len..];

        let initial_payload = Bytes::copy_from_slice(cursor);
        if padding_length == 0 && initial_payload.is_empty() {
            return Err(ProtocolError::NoInitialPayloadOrPadding);
        }

        Ok(Self {
            address,
            port,
            padding_length,
            initial_payload,
        })
    }
}

/// `type(1) || timestamp(8) || request_salt(salt_length) || length(2)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedResponseHeader {
    pub timestamp: u64,
    pub request_salt: Vec<u8>,
    /// Length of the response's first payload record (no separate length
    /// prefix is sent for that first chunk).
    pub length: u16,
}

impl FixedResponseHeader {
    pub fn plaintext_len(salt_length: usize) -> usize {
        1 + 8 + salt_length + 2
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::plaintext_len(self.request_salt.len()));
        out.push(RESPONSE_TYPE_SERVER_STREAM);
        out.extend_from_slice(&self.timestamp.to_be_bytes());
        out.extend_from_slice(&self.request_salt);
        out.extend_from_slice(&self.length.to_be_bytes());
        out
    }

    pub fn decode(buf: &[u8], salt_length: usize) -> Result<Self, ProtocolError> {
        let need = Self::plaintext_len(salt_length);
        if buf.len() < need {
            return Err(ProtocolError::BufferTooShort {
                need,
                found: buf.len(),
            });
        }
        let ty = buf[0];
        if ty != RESPONSE_TYPE_SERVER_STREAM {
            return Err(ProtocolError::InvalidResponseType(ty));
        }
        let timestamp = u64::from_be_bytes(buf[1..9].try_into().unwrap());
        let request_salt = buf[9..9 + salt_length].to_vec();
        let length_off = 9 + salt_length;
        let length = u16::from_be_bytes(buf[length_off..length_off + 2].try_into().unwrap());
        Ok(Self {
            timestamp,
            request_salt,
            length,
        })
    }
}

/// Encode a chunk length prefix (big-endian `u16`).
pub fn encode_chunk_length(len: u16) -> [u8; 2] {
    len.to_be_bytes()
}

/// Decode a chunk length prefix from an AEAD-opened 2-byte plaintext.
pub fn decode_chunk_length(buf: &[u8]) -> Result<u16, ProtocolError> {
    if buf.len() < 2 {
        return Err(ProtocolError::BufferTooShort {
            need: 2,
            found: buf.len(),
        });
    }
    Ok(u16::from_be_bytes([buf[0], buf[1]]))
}
