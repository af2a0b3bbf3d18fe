//! AEAD cipher suite abstraction for the Shadowsocks SIP022 TCP protocol:
//! key/salt/tag lengths, HKDF-SHA1 subkey derivation, CSPRNG salts, and
//! per-direction AEAD encrypt/decrypt contexts with monotonically
//! increasing little-endian nonces.

#![forbid(unsafe_code)]

mod aead;
mod error;
mod nonce;
mod suite;

pub use aead::{Decryptor, Encryptor};
pub use error::CryptoError;
pub use nonce::Nonce;
pub use suite::{derive_subkey, random_salt, CipherKind, TAG_LENGTH};
