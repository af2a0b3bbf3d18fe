//! Destination address encoding shared by the variable-length request
//! header: IPv4, IPv6, or a length-prefixed ASCII domain name.

use std::net::{Ipv4Addr, Ipv6Addr};

use crate::error::ProtocolError;

const TYPE_IPV4: u8 = 1;
const TYPE_DOMAIN: u8 = 3;
const TYPE_IPV6: u8 = 4;

/// A SIP022 destination address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    V4(Ipv4Addr),
    V6(Ipv6Addr),
    Domain(String),
}

impl Address {
    pub fn encode(&self, out: &mut Vec<u8>) {
        match self {
            Address::V4(addr) => {
                out.push(TYPE_IPV4);
                out.extend_from_slice(&addr.octets());
            }
            Address::V6(addr) => {
                out.push(TYPE_IPV6);
                out.extend_from_slice(&addr.octets());
            }
            Address::Domain(name) => {
                out.push(TYPE_DOMAIN);
                out.push(name.len() as u8);
                out.extend_from_slice(name.as_bytes());
            }
        }
    }

    /// Decode an address from the front of `cursor`, advancing it past
    /// the bytes consumed.
    pub fn decode(cursor: &mut &[u8]) -> Result<Self, ProtocolError> {
        let atyp = take_u8(cursor)?;
        match atyp {
            TYPE_IPV4 => {
                let bytes = take_exact(cursor, 4)?;
                Ok(Address::V4(Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3])))
            }
            TYPE_IPV6 => {
                let bytes = take_exact(cursor, 16)?;
                let mut octets = [0u8; 16];
                octets.copy_from_slice(bytes);
                Ok(Address::V6(Ipv6Addr::from(octets)))
            }
            TYPE_DOMAIN => {
                let len = take_u8(cursor)? as usize;
                let bytes = take_exact(cursor, len)?;
                let name = std::str::from_utf8(bytes)
                    .map_err(|_| ProtocolError::DomainNotUtf8)?
                    .to_owned();
                Ok(Address::Domain(name))
            }
            other => Err(ProtocolError::UnknownAddressType(other)),
        }
    }
}

fn take_u8(cursor: &mut &[u8]) -> Result<u8, ProtocolError> {
    let bytes = take_exact(cursor, 1)?;
    Ok(bytes[0])
}

fn take_exact<'a>(cursor: &mut &'a [u8], len: usize) -> Result<&'a [u8], ProtocolError> {
    if cursor.len() < len {
        return Err(ProtocolError::BufferTooShort {
            need: len,
            found: cursor.len(),
        });
    }
    let (head, tail) = cursor.split_at(len);
    *cursor = tail;
    Ok(head)
}
