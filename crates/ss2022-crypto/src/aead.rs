//! Per-direction AEAD context: a subkey, a monotonically increasing
//! nonce, and the `seal`/`open` operations built on top of whichever
//! concrete algorithm the session's [`CipherKind`] selects.

use aes_gcm::{Aes128Gcm, Aes256Gcm};
use chacha20poly1305::{
    aead::{Aead as _, KeyInit},
    ChaCha20Poly1305,
};
use zeroize::Zeroize;

use crate::error::CryptoError;
use crate::nonce::Nonce;
use crate::suite::CipherKind;

enum Algo {
    Aes128(Aes128Gcm),
    Aes256(Aes256Gcm),
    ChaCha20(ChaCha20Poly1305),
}

impl Algo {
    fn new(kind: CipherKind, key: &[u8]) -> Self {
        match kind {
            CipherKind::Aes128Gcm => {
                Algo::Aes128(Aes128Gcm::new_from_slice(key).expect("key length matches CipherKind"))
            }
            CipherKind::Aes256Gcm => {
                Algo::Aes256(Aes256Gcm::new_from_slice(key).expect("key length matches CipherKind"))
            }
            CipherKind::ChaCha20Poly1305 => Algo::ChaCha20(
                ChaCha20Poly1305::new_from_slice(key).expect("key length matches CipherKind"),
            ),
        }
    }

    fn seal(&self, nonce: &[u8; 12], plaintext: &[u8]) -> Vec<u8> {
        let n = nonce.into();
        match self {
            Algo::Aes128(c) => c.encrypt(n, plaintext),
            Algo::Aes256(c) => c.encrypt(n, plaintext),
            Algo::ChaCha20(c) => c.encrypt(n, plaintext),
        }
        .expect("AEAD encryption does not fail for well-formed inputs")
    }

    fn open(&self, nonce: &[u8; 12], sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let n = nonce.into();
        let result = match self {
            Algo::Aes128(c) => c.decrypt(n, sealed),
            Algo::Aes256(c) => c.decrypt(n, sealed),
            Algo::ChaCha20(c) => c.decrypt(n, sealed),
        };
        result.map_err(|_| CryptoError::AuthFailed)
    }
}

/// Seals plaintext with a subkey, incrementing the nonce after every
/// successful seal. One instance exists per session per direction.
pub struct Encryptor {
    algo: Algo,
    nonce: Nonce,
}

impl Encryptor {
    pub fn new(kind: CipherKind, mut subkey: Vec<u8>) -> Self {
        let algo = Algo::new(kind, &subkey);
        subkey.zeroize();
        Self {
            algo,
            nonce: Nonce::zero(),
        }
    }

    /// Seal `plaintext`, returning ciphertext with the tag appended.
    /// Advances the nonce unconditionally (AEAD sealing cannot fail).
    pub fn seal(&mut self, plaintext: &[u8]) -> Vec<u8> {
        let sealed = self.algo.seal(self.nonce.as_bytes(), plaintext);
        self.nonce.increment();
        sealed
    }
}

/// Opens AEAD records with a subkey, incrementing the nonce only on a
/// successful open so that a forged frame cannot desynchronize the
/// nonce sequence.
pub struct Decryptor {
    algo: Algo,
    nonce: Nonce,
}

impl Decryptor {
    pub fn new(kind: CipherKind, mut subkey: Vec<u8>) -> Self {
        let algo = Algo::new(kind, &subkey);
        subkey.zeroize();
        Self {
            algo,
            nonce: Nonce::zero(),
        }
    }

    /// Open `sealed` (ciphertext with trailing tag). On success, advances
    /// the nonce. On `AuthFailed`, the nonce is left unchanged, but the
    /// session must be torn down regardless since SIP022's ordering
    /// guarantee depends on discarding the whole stream after one failure.
    pub fn open(&mut self, sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let plaintext = self.algo.open(self.nonce.as_bytes(), sealed)?;
        self.nonce.increment();
        Ok(plaintext)
    }
}
