//! The relay engine: multiplexes a client socket and a remote socket,
//! feeds the client's decoded frames to the state machine, and frames
//! remote bytes back to the client.
//!
//! One tokio task per accepted client, running a `tokio::select!` loop
//! over the client and remote `TcpStream`s once both are established.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{lookup_host, TcpStream};
use tracing::{debug, trace, warn};

use ss2022_protocol::{encode_chunk_length, Address, FixedResponseHeader};

use crate::error::SessionError;
use crate::metrics::RelayMetrics;
use crate::session::{ClientSession, SessionEvent, MAX_FRAME_LEN};
use crate::state::ServerState;

/// Per-iteration receive cap.
const READ_CHUNK: usize = 32 * 1024;

/// Handle one accepted client end to end: run the session, then tear it
/// down gracefully or abortively depending on how it ended.
pub async fn handle_connection(
    mut client: TcpStream,
    peer_addr: SocketAddr,
    state: Arc<ServerState>,
    metrics: Arc<RelayMetrics>,
) {
    metrics.session_opened();
    let outcome = run_session(&mut client, &state, &metrics).await;
    metrics.session_closed();

    match outcome {
        Ok(()) => debug!(peer = %peer_addr, "session ended"),
        Err(err) if err.is_graceful() => {
            debug!(peer = %peer_addr, reason = %err, "closing gracefully");
            let _ = client.shutdown().await;
        }
        Err(err) => {
            warn!(peer = %peer_addr, reason = %err, "aborting session with RST");
            metrics.record_session_error(&err);
            abortive_close(&client);
        }
    }
}

async fn run_session(
    client: &mut TcpStream,
    state: &Arc<ServerState>,
    metrics: &Arc<RelayMetrics>,
) -> Result<(), SessionError> {
    let mut session = ClientSession::new(state.cipher(), state.psk())
        .map_err(|_| SessionError::AuthFailed)?;
    let mut read_buf = vec![0u8; READ_CHUNK];

    // Phase 1: read client bytes until the variable header decodes and
    // hands us a Dial event. No remote socket exists yet. A single read
    // can carry the header and one or more payload chunks together (a
    // coalesced `write_all`, or Nagle-merged loopback segments), so once
    // the Dial event lands, every subsequent `ToRemote` chunk from the
    // same `advance()` batch is forwarded to the freshly dialed remote
    // rather than assumed absent.
    let mut remote = loop {
        let n = client.read(&mut read_buf).await?;
        if n == 0 {
            return Err(SessionError::ClientDisconnected);
        }
        session.feed(&read_buf[..n]);

        let events = session.advance(state.psk(), now_ms(), state.salt_cache())?;
        let mut dialed: Option<TcpStream> = None;
        for event in events {
            match event {
                SessionEvent::Dial {
                    address,
                    port,
                    initial_payload,
                } => {
                    let mut remote_stream = dial(&address, port).await?;
                    remote_stream.write_all(&initial_payload).await?;
                    dialed = Some(remote_stream);
                }
                SessionEvent::ToRemote(chunk) => {
                    let remote_stream = dialed
                        .as_mut()
                        .expect("wait_for_payload cannot precede wait_for_variable's Dial event");
                    remote_stream.write_all(&chunk).await?;
                    metrics.record_bytes_to_remote(chunk.len());
                }
            }
        }
        if let Some(remote) = dialed {
            break remote;
        }
    };

    // Phase 2: multiplex client and remote until either side closes or a
    // protocol/crypto error occurs.
    let mut remote_buf = vec![0u8; READ_CHUNK];
    loop {
        tokio::select! {
            result = client.read(&mut read_buf) => {
                let n = result?;
                if n == 0 {
                    return Err(SessionError::ClientDisconnected);
                }
                session.feed(&read_buf[..n]);
                let events = session.advance(state.psk(), now_ms(), state.salt_cache())?;
                for event in events {
                    match event {
                        SessionEvent::ToRemote(chunk) => {
                            trace!(bytes = chunk.len(), "client -> remote");
                            remote.write_all(&chunk).await?;
                            metrics.record_bytes_to_remote(chunk.len());
                        }
                        SessionEvent::Dial { .. } => {
                            unreachable!("wait_for_variable only runs once per session")
                        }
                    }
                }
            }
            result = remote.read(&mut remote_buf) => {
                let n = result?;
                if n == 0 {
                    return Err(SessionError::RemoteDisconnected);
                }
                forward_to_client(client, &mut session, &remote_buf[..n]).await?;
                metrics.record_bytes_to_client(n);
            }
        }
    }
}

/// Resolve and connect to `address:port`. Domain names are tried in the
/// order `lookup_host` returns them; the first successful connect wins.
async fn dial(address: &Address, port: u16) -> Result<TcpStream, SessionError> {
    match address {
        Address::V4(ip) => TcpStream::connect((*ip, port))
            .await
            .map_err(SessionError::CantConnectToRemote),
        Address::V6(ip) => TcpStream::connect((*ip, port))
            .await
            .map_err(SessionError::CantConnectToRemote),
        Address::Domain(domain) => {
            let endpoints = lookup_host((domain.as_str(), port))
                .await
                .map_err(SessionError::CantConnectToRemote)?;
            let mut last_err = None;
            for endpoint in endpoints {
                match TcpStream::connect(endpoint).await {
                    Ok(stream) => return Ok(stream),
                    Err(err) => last_err = Some(err),
                }
            }
            Err(SessionError::CantConnectToRemote(last_err.unwrap_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses resolved")
            })))
        }
    }
}

/// Seal and frame `plaintext` (bytes just read from the remote) for the
/// client stream. Splits inputs larger than `MAX_FRAME_LEN` into multiple
/// length-prefixed frames rather than rejecting them.
async fn forward_to_client(
    client: &mut TcpStream,
    session: &mut ClientSession,
    plaintext: &[u8],
) -> Result<(), SessionError> {
    if plaintext.is_empty() {
        return Ok(());
    }

    let mut out = Vec::new();
    let mut chunks = plaintext.chunks(MAX_FRAME_LEN);
    let first = chunks.next().expect("plaintext is non-empty");

    if !session.sent_initial_response {
        out.extend_from_slice(session.response_salt());
        let header = FixedResponseHeader {
            timestamp: now_ms() as u64 / 1000,
            request_salt: session.response_salt().to_vec(),
            length: first.len() as u16,
        };
        out.extend_from_slice(&session.response_encryptor().seal(&header.encode()));
        session.sent_initial_response = true;
    } else {
        out.extend_from_slice(&session.response_encryptor().seal(&encode_chunk_length(first.len() as u16)));
    }
    out.extend_from_slice(&session.response_encryptor().seal(first));

    for chunk in chunks {
        out.extend_from_slice(&session.response_encryptor().seal(&encode_chunk_length(chunk.len() as u16)));
        out.extend_from_slice(&session.response_encryptor().seal(chunk));
    }

    client.write_all(&out).await?;
    Ok(())
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is after the Unix epoch")
        .as_millis() as i64
}

/// Abortive close: `SO_LINGER(onoff=1, linger=0)` so the peer observes a
/// TCP RST instead of a graceful FIN.
/// `tokio::net::TcpStream` has no direct `SO_LINGER` API, so this wraps
/// the stream's raw handle in a transient `socket2::Socket` just long
/// enough to set the option, then forgets it so the original `TcpStream`
/// keeps ownership of the descriptor.
fn abortive_close(stream: &TcpStream) {
    if let Err(err) = set_linger_zero(stream) {
        warn!(error = %err, "failed to set SO_LINGER for abortive close");
    }
}

#[cfg(unix)]
fn set_linger_zero(stream: &TcpStream) -> std::io::Result<()> {
    use std::os::unix::io::{AsRawFd, FromRawFd};
    let socket = unsafe { socket2::Socket::from_raw_fd(stream.as_raw_fd()) };
    let result = socket.set_linger(Some(std::time::Duration::from_secs(0)));
    std::mem::forget(socket);
    result
}

#[cfg(windows)]
fn set_linger_zero(stream: &TcpStream) -> std::io::Result<()> {
    use std::os::windows::io::{AsRawSocket, FromRawSocket};
    let socket = unsafe { socket2::Socket::from_raw_socket(stream.as_raw_socket()) };
    let result = socket.set_linger(Some(std::time::Duration::from_secs(0)));
    std::mem::forget(socket);
    result
}
