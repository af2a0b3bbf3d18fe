//! The abstract AEAD cipher suite: key/salt/tag lengths, subkey
//! derivation and CSPRNG salts, parameterized over one of the three
//! concrete algorithms SIP022 allows.

use hkdf::Hkdf;
use sha1::Sha1;

use crate::error::CryptoError;

/// Tag length is fixed at 16 bytes for all three suites.
pub const TAG_LENGTH: usize = 16;

const SUBKEY_INFO: &[u8] = b"ss-subkey";

/// One of the three AEAD cipher suites SIP022 permits for TCP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CipherKind {
    Aes128Gcm,
    Aes256Gcm,
    ChaCha20Poly1305,
}

impl CipherKind {
    /// `key_length` in bytes: 16 for AES-128-GCM, 32 otherwise.
    pub fn key_length(self) -> usize {
        match self {
            CipherKind::Aes128Gcm => 16,
            CipherKind::Aes256Gcm | CipherKind::ChaCha20Poly1305 => 32,
        }
    }

    /// `salt_length` equals `key_length` per SIP022.
    pub fn salt_length(self) -> usize {
        self.key_length()
    }

    /// `tag_length`, 16 bytes for all three suites.
    pub fn tag_length(self) -> usize {
        TAG_LENGTH
    }

    /// Parse a `method` string as found in the JSON configuration file.
    pub fn parse(method: &str) -> Option<Self> {
        match method {
            "aes-128-gcm" => Some(CipherKind::Aes128Gcm),
            "aes-256-gcm" => Some(CipherKind::Aes256Gcm),
            "chacha20-poly1305" | "chacha20-ietf-poly1305" => Some(CipherKind::ChaCha20Poly1305),
            _ => None,
        }
    }

    /// The method string this kind would parse back from.
    pub fn as_str(self) -> &'static str {
        match self {
            CipherKind::Aes128Gcm => "aes-128-gcm",
            CipherKind::Aes256Gcm => "aes-256-gcm",
            CipherKind::ChaCha20Poly1305 => "chacha20-ietf-poly1305",
        }
    }
}

/// Generate a cryptographically secure salt of `kind.salt_length()` bytes.
pub fn random_salt(kind: CipherKind) -> Result<Vec<u8>, CryptoError> {
    let mut salt = vec![0u8; kind.salt_length()];
    getrandom::getrandom(&mut salt).map_err(|_| CryptoError::RngFailure)?;
    Ok(salt)
}

/// `HKDF-SHA1(psk, salt, info = "ss-subkey")`, truncated/extended to
/// `kind.key_length()` bytes. Deterministic for a given `(psk, salt)` pair.
pub fn derive_subkey(kind: CipherKind, psk: &[u8], salt: &[u8]) -> Vec<u8> {
    let hk = Hkdf::<Sha1>::new(Some(salt), psk);
    let mut out = vec![0u8; kind.key_length()];
    hk.expand(SUBKEY_INFO, &mut out)
        .expect("HKDF-SHA1 output is always small enough to expand");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lengths_match_spec() {
        assert_eq!(CipherKind::Aes128Gcm.key_length(), 16);
        assert_eq!(CipherKind::Aes256Gcm.key_length(), 32);
        assert_eq!(CipherKind::ChaCha20Poly1305.key_length(), 32);
        for kind in [
            CipherKind::Aes128Gcm,
            CipherKind::Aes256Gcm,
            CipherKind::ChaCha20Poly1305,
        ] {
            assert_eq!(kind.salt_length(), kind.key_length());
            assert_eq!(kind.tag_length(), 16);
        }
    }

    #[test]
    fn parse_round_trips() {
        for kind in [
            CipherKind::Aes128Gcm,
            CipherKind::Aes256Gcm,
            CipherKind::ChaCha20Poly1305,
        ] {
            assert_eq!(CipherKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(CipherKind::parse("rot13"), None);
    }

    #[test]
    fn subkey_derivation_is_deterministic() {
        let psk = [0x11u8; 32];
        let salt = [0x22u8; 32];
        let a = derive_subkey(CipherKind::Aes256Gcm, &psk, &salt);
        let b = derive_subkey(CipherKind::Aes256Gcm, &psk, &salt);
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn subkey_derivation_is_salt_sensitive() {
        let psk = [0x11u8; 32];
        let a = derive_subkey(CipherKind::Aes256Gcm, &psk, &[0x01; 32]);
        let b = derive_subkey(CipherKind::Aes256Gcm, &psk, &[0x02; 32]);
        assert_ne!(a, b);
    }

    #[test]
    fn random_salt_has_expected_length_and_varies() {
        let a = random_salt(CipherKind::ChaCha20Poly1305).unwrap();
        let b = random_salt(CipherKind::ChaCha20Poly1305).unwrap();
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
    }

    proptest::proptest! {
        #[test]
        fn subkey_derivation_never_panics(
            psk in proptest::collection::vec(proptest::prelude::any::<u8>(), 1..64),
            salt in proptest::collection::vec(proptest::prelude::any::<u8>(), 1..64),
        ) {
            let _ = derive_subkey(CipherKind::Aes128Gcm, &psk, &salt);
            let _ = derive_subkey(CipherKind::Aes256Gcm, &psk, &salt);
            let _ = derive_subkey(CipherKind::ChaCha20Poly1305, &psk, &salt);
        }
    }
}
