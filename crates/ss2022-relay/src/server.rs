//! Lifecycle API (`start`/`start_blocking`/`stop`), the accept loop, and
//! the metrics/health HTTP surface.
//!
//! A spawned HTTP router runs alongside a spawned `TcpListener`
//! accept loop; both watch a shared `CancellationToken` for shutdown.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use ss2022_crypto::CipherKind;

use crate::metrics::RelayMetrics;
use crate::relay;
use crate::state::ServerState;

/// A handle to a running relay server, returned by [`start`]. Dropping
/// this does not stop the server; call [`stop`] explicitly.
pub struct RelayHandle {
    cancel: CancellationToken,
    accept_task: JoinHandle<()>,
    http_task: JoinHandle<()>,
    local_addr: SocketAddr,
}

impl RelayHandle {
    /// The address the SIP022 listener actually bound to. Useful in
    /// tests that pass port `0` to get an OS-assigned port.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

/// Non-blocking: spawn the acceptor (and its metrics/health HTTP
/// sidecar) and return immediately with a handle.
pub async fn start(
    port: u16,
    psk: Vec<u8>,
    cipher: CipherKind,
    metrics_addr: SocketAddr,
) -> std::io::Result<RelayHandle> {
    let state = ServerState::new(psk, cipher);
    let metrics = Arc::new(RelayMetrics::new().expect("metric names are valid and non-duplicate"));
    let cancel = CancellationToken::new();

    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    let local_addr = listener.local_addr()?;
    info!(%port, method = cipher.as_str(), "listening for SIP022 clients");

    let accept_task = tokio::spawn(accept_loop(
        listener,
        state,
        metrics.clone(),
        cancel.clone(),
    ));

    let http_listener = TcpListener::bind(metrics_addr).await?;
    info!(addr = %metrics_addr, "metrics/health endpoint listening");
    let http_task = tokio::spawn(serve_http(http_listener, metrics, cancel.clone()));

    Ok(RelayHandle {
        cancel,
        accept_task,
        http_task,
        local_addr,
    })
}

/// Blocking: equivalent to `start` followed by waiting for the server to
/// stop (either via [`stop`] on another task, or an unrecoverable bind
/// error).
pub async fn start_blocking(
    port: u16,
    psk: Vec<u8>,
    cipher: CipherKind,
    metrics_addr: SocketAddr,
) -> std::io::Result<()> {
    let handle = start(port, psk, cipher, metrics_addr).await?;
    let _ = handle.accept_task.await;
    let _ = handle.http_task.await;
    Ok(())
}

/// Signal the stop flag and wait for both background tasks to join.
pub async fn stop(handle: RelayHandle) {
    handle.cancel.cancel();
    let _ = handle.accept_task.await;
    let _ = handle.http_task.await;
}

async fn accept_loop(
    listener: TcpListener,
    state: Arc<ServerState>,
    metrics: Arc<RelayMetrics>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("accept loop stopping");
                break;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((socket, peer_addr)) => {
                        let state = state.clone();
                        let metrics = metrics.clone();
                        tokio::spawn(async move {
                            relay::handle_connection(socket, peer_addr, state, metrics).await;
                        });
                    }
                    Err(err) => {
                        warn!(error = %err, "accept failed");
                    }
                }
            }
        }
    }
}

async fn serve_http(listener: TcpListener, metrics: Arc<RelayMetrics>, cancel: CancellationToken) {
    let router = Router::new()
        .route("/healthz", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(metrics)
        .layer(TraceLayer::new_for_http());

    let serve = axum::serve(listener, router).with_graceful_shutdown(async move {
        cancel.cancelled().await;
    });

    if let Err(err) = serve.await {
        error!(error = %err, "metrics/health HTTP server error");
    }
}

async fn health_handler() -> StatusCode {
    StatusCode::OK
}

async fn metrics_handler(State(metrics): State<Arc<RelayMetrics>>) -> Result<String, StatusCode> {
    metrics
        .export()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}
