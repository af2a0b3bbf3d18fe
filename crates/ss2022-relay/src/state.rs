//! Server-wide shared state: the PSK and the replay-defense salt cache.
//! Everything else (session buffers, AEAD nonces, sockets) is exclusive
//! to its worker task.

use std::sync::Arc;

use ss2022_crypto::CipherKind;

use crate::salt_cache::SaltCache;

/// State shared by every concurrent session. The only mutable part is
/// the salt cache, which synchronizes itself internally.
pub struct ServerState {
    psk: Vec<u8>,
    cipher: CipherKind,
    salt_cache: SaltCache,
}

impl ServerState {
    pub fn new(psk: Vec<u8>, cipher: CipherKind) -> Arc<Self> {
        Arc::new(Self {
            psk,
            cipher,
            salt_cache: SaltCache::new(),
        })
    }

    pub fn psk(&self) -> &[u8] {
        &self.psk
    }

    pub fn cipher(&self) -> CipherKind {
        self.cipher
    }

    pub fn salt_cache(&self) -> &SaltCache {
        &self.salt_cache
    }
}
