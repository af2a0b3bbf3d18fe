//! Error types for the cipher suite.

/// Errors produced by subkey derivation and AEAD sealing/opening.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("AEAD authentication failed")]
    AuthFailed,
    #[error("CSPRNG failure while generating a salt or nonce")]
    RngFailure,
}
