//! HTTP front for the proxy
//!
//! Binds the loopback listener, wires the routes around an [`Adapter`], and
//! owns lifecycle concerns: the pre-bind port probe, the runtime console and
//! graceful shutdown with a bounded drain.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod console;
mod routes;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::{any, get, post};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use claudeproxy_llm::Adapter;
pub use routes::HEALTH_SENTINEL;
use routes::ProxyState;

/// How long graceful shutdown waits for in-flight requests
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// What the pre-bind probe found on the configured port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortStatus {
    /// Nothing is listening; safe to bind
    Free,
    /// An earlier instance of this proxy answered the health probe
    EarlierInstance,
    /// Some other process is listening
    ForeignProcess,
}

/// Probe the configured port before binding
///
/// The proxy never silently picks another port; the caller turns a non-free
/// status into a clear message and a non-zero exit.
pub async fn probe_port(port: u16) -> PortStatus {
    let connect = tokio::net::TcpStream::connect(("127.0.0.1", port));
    let stream = match tokio::time::timeout(Duration::from_secs(1), connect).await {
        Ok(Ok(stream)) => stream,
        // Connection refused or timed out: nothing is listening
        _ => return PortStatus::Free,
    };

    let body = tokio::time::timeout(Duration::from_secs(1), http_get(stream, "/healthz"))
        .await
        .ok()
        .flatten()
        .unwrap_or_default();

    if body.contains(HEALTH_SENTINEL) {
        PortStatus::EarlierInstance
    } else {
        PortStatus::ForeignProcess
    }
}

/// Minimal HTTP/1.0 GET, enough to read the sentinel off a health endpoint
async fn http_get(mut stream: tokio::net::TcpStream, path: &str) -> Option<String> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let request = format!("GET {path} HTTP/1.0\r\nHost: 127.0.0.1\r\n\r\n");
    stream.write_all(request.as_bytes()).await.ok()?;

    let mut body = Vec::new();
    stream.read_to_end(&mut body).await.ok()?;
    Some(String::from_utf8_lossy(&body).into_owned())
}

/// Assembled proxy server
pub struct Server {
    router: Router,
    listen_address: SocketAddr,
}

impl Server {
    /// Wire the routes around an adapter
    pub fn new(adapter: Arc<dyn Adapter>, port: u16) -> Self {
        let state = ProxyState { adapter };

        let router = Router::new()
            .route("/v1/messages", post(routes::messages))
            .route("/healthz", get(routes::healthz))
            .route("/v1/{*path}", any(routes::not_found))
            .with_state(state)
            .layer(TraceLayer::new_for_http());

        Self {
            router,
            listen_address: SocketAddr::from(([127, 0, 0, 1], port)),
        }
    }

    /// Configured listen address
    pub const fn listen_address(&self) -> SocketAddr {
        self.listen_address
    }

    /// Consume the server and return the inner router
    ///
    /// Useful for testing when the caller manages the listener.
    pub fn into_router(self) -> Router {
        self.router
    }

    /// Serve until shutdown, then drain
    ///
    /// Shutdown starts when the token fires (console `Q`) or the process
    /// receives SIGINT/SIGTERM; both feed the same token. New connections are
    /// refused once shutdown starts, and in-flight requests get up to 10 s
    /// before the close is forced.
    pub async fn serve(self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.listen_address).await?;
        tracing::info!(address = %self.listen_address, "listening");

        let drain = shutdown.clone();
        let serve = axum::serve(listener, self.router)
            .with_graceful_shutdown(async move { drain.cancelled().await });

        tokio::select! {
            result = serve => result?,
            () = async {
                tokio::select! {
                    () = shutdown.cancelled() => {}
                    signal = os_shutdown_signal() => {
                        tracing::info!(signal, "shutdown signal received");
                        shutdown.cancel();
                    }
                }
                tokio::time::sleep(DRAIN_TIMEOUT).await;
            } => {
                tracing::warn!("drain deadline reached; forcing shutdown");
            }
        }

        Ok(())
    }
}

/// Resolve with the name of the OS shutdown signal once one arrives
///
/// Listens for SIGTERM where the platform has it, alongside interrupt. A
/// handler that cannot be installed is logged and skipped rather than taking
/// the proxy down.
async fn os_shutdown_signal() -> &'static str {
    let interrupt = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::error!(%error, "interrupt handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    () = interrupt => "interrupt",
                    _ = terminate.recv() => "terminate",
                }
            }
            Err(error) => {
                tracing::error!(%error, "SIGTERM handler unavailable");
                interrupt.await;
                "interrupt"
            }
        }
    }

    #[cfg(not(unix))]
    {
        interrupt.await;
        "interrupt"
    }
}
