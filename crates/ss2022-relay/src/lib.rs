//! ss2022-relay: server-side relay for the Shadowsocks 2022 (SIP022)
//! AEAD TCP proxy protocol.
//!
//! This crate owns the hard engineering: the replay-defense salt cache,
//! the per-connection decoder state machine, and the relay engine that
//! multiplexes client and remote sockets. Cipher primitives live in
//! `ss2022-crypto`; wire header encoding lives in `ss2022-protocol`.

pub mod config;
pub mod error;
pub mod metrics;
pub mod relay;
pub mod salt_cache;
pub mod server;
pub mod session;
pub mod state;

pub use config::ServerConfig;
pub use error::{ConfigError, SessionError};
pub use server::{start, start_blocking, stop, RelayHandle};
pub use state::ServerState;
