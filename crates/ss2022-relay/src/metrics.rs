//! Relay metrics: active sessions, bytes relayed per direction, AEAD
//! failures, and replay rejections, exported in Prometheus text format.
//!
//! A `Registry` owning a handful of `Counter`/`Gauge` instruments, with a
//! thin `record_*`/`export` API.

use prometheus::{Counter, Gauge, Encoder, Opts, Registry, TextEncoder};

use crate::error::SessionError;

pub struct RelayMetrics {
    active_sessions: Gauge,
    total_sessions: Counter,
    bytes_to_remote: Counter,
    bytes_to_client: Counter,
    aead_failures: Counter,
    replay_rejections: Counter,
    other_errors: Counter,
    registry: Registry,
}

impl RelayMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let active_sessions = Gauge::with_opts(Opts::new(
            "ss2022_relay_active_sessions",
            "Number of currently active client sessions",
        ))?;
        registry.register(Box::new(active_sessions.clone()))?;

        let total_sessions = Counter::with_opts(Opts::new(
            "ss2022_relay_total_sessions",
            "Total number of client sessions accepted",
        ))?;
        registry.register(Box::new(total_sessions.clone()))?;

        let bytes_to_remote = Counter::with_opts(Opts::new(
            "ss2022_relay_bytes_to_remote_total",
            "Total plaintext bytes relayed from clients to remote targets",
        ))?;
        registry.register(Box::new(bytes_to_remote.clone()))?;

        let bytes_to_client = Counter::with_opts(Opts::new(
            "ss2022_relay_bytes_to_client_total",
            "Total plaintext bytes relayed from remote targets to clients",
        ))?;
        registry.register(Box::new(bytes_to_client.clone()))?;

        let aead_failures = Counter::with_opts(Opts::new(
            "ss2022_relay_aead_failures_total",
            "Total sessions terminated by an AEAD authentication failure",
        ))?;
        registry.register(Box::new(aead_failures.clone()))?;

        let replay_rejections = Counter::with_opts(Opts::new(
            "ss2022_relay_replay_rejections_total",
            "Total sessions rejected for replaying a previously seen salt",
        ))?;
        registry.register(Box::new(replay_rejections.clone()))?;

        let other_errors = Counter::with_opts(Opts::new(
            "ss2022_relay_other_errors_total",
            "Total sessions terminated by an error other than AEAD failure or replay",
        ))?;
        registry.register(Box::new(other_errors.clone()))?;

        Ok(Self {
            active_sessions,
            total_sessions,
            bytes_to_remote,
            bytes_to_client,
            aead_failures,
            replay_rejections,
            other_errors,
            registry,
        })
    }

    pub fn session_opened(&self) {
        self.total_sessions.inc();
        self.active_sessions.inc();
    }

    pub fn session_closed(&self) {
        self.active_sessions.dec();
    }

    pub fn record_bytes_to_remote(&self, n: usize) {
        self.bytes_to_remote.inc_by(n as f64);
    }

    pub fn record_bytes_to_client(&self, n: usize) {
        self.bytes_to_client.inc_by(n as f64);
    }

    pub fn record_session_error(&self, err: &SessionError) {
        match err {
            SessionError::AuthFailed => self.aead_failures.inc(),
            SessionError::DuplicateSalt => self.replay_rejections.inc(),
            _ => self.other_errors.inc(),
        }
    }

    /// Render the current state of all registered metrics in Prometheus
    /// text exposition format.
    pub fn export(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_counters_track_open_and_close() {
        let metrics = RelayMetrics::new().unwrap();
        metrics.session_opened();
        metrics.session_opened();
        metrics.session_closed();
        let exported = metrics.export().unwrap();
        assert!(exported.contains("ss2022_relay_total_sessions 2"));
        assert!(exported.contains("ss2022_relay_active_sessions 1"));
    }

    #[test]
    fn errors_are_classified() {
        let metrics = RelayMetrics::new().unwrap();
        metrics.record_session_error(&SessionError::AuthFailed);
        metrics.record_session_error(&SessionError::DuplicateSalt);
        metrics.record_session_error(&SessionError::NoInitialPayloadOrPadding);
        let exported = metrics.export().unwrap();
        assert!(exported.contains("ss2022_relay_aead_failures_total 1"));
        assert!(exported.contains("ss2022_relay_replay_rejections_total 1"));
        assert!(exported.contains("ss2022_relay_other_errors_total 1"));
    }
}
