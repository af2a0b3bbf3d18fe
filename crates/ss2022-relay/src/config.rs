//! Configuration loading: `{ port, key, method }` from a JSON file.

use serde::{Deserialize, Serialize};

use ss2022_crypto::CipherKind;

use crate::error::ConfigError;

/// On-disk server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    /// Hex-encoded pre-shared key. Length must match `method`'s
    /// `key_length`.
    pub key: String,
    /// Cipher suite name, e.g. `"aes-256-gcm"`.
    pub method: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8388,
            key: hex::encode([0u8; 32]),
            method: "aes-256-gcm".to_owned(),
        }
    }
}

impl ServerConfig {
    /// Load and validate configuration from a JSON file at `path`.
    pub fn load_from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate that `key` is syntactically hex and matches `method`'s
    /// expected key length.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let cipher = self
            .cipher_kind()
            .ok_or_else(|| ConfigError::Invalid(format!("unknown method: {}", self.method)))?;

        let key_bytes = self
            .key_bytes()
            .map_err(|e| ConfigError::Invalid(format!("invalid key hex: {e}")))?;

        if key_bytes.len() != cipher.key_length() {
            return Err(ConfigError::Invalid(format!(
                "key length {} does not match {}'s expected {} bytes",
                key_bytes.len(),
                self.method,
                cipher.key_length()
            )));
        }

        if self.port == 0 {
            return Err(ConfigError::Invalid("port must be > 0".to_owned()));
        }

        Ok(())
    }

    pub fn cipher_kind(&self) -> Option<CipherKind> {
        CipherKind::parse(&self.method)
    }

    pub fn key_bytes(&self) -> Result<Vec<u8>, hex::FromHexError> {
        hex::decode(&self.key)
    }
}
