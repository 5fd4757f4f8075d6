//! HTTP server implementation.

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use hyper_util::server::graceful::GracefulShutdown;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use super::service::{AdmissionService, DEFAULT_MAX_BODY_BYTES};
use crate::admission::Registry;
use crate::error::Result;

/// How long in-flight connections may take to finish after shutdown starts.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// HTTP ingress for the admission registry.
pub struct HttpServer {
    /// Address to bind to
    addr: SocketAddr,
    /// The registry instance
    registry: Arc<Registry>,
    /// Largest accepted request body
    max_body_bytes: usize,
}

impl HttpServer {
    /// Create a new HTTP server for the given registry.
    pub fn new(addr: SocketAddr, registry: Arc<Registry>) -> Self {
        Self {
            addr,
            registry,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    /// Set the largest request body the server accepts.
    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    /// Bind the configured address and serve until `signal` resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind(self.addr).await?;
        self.serve_listener(listener, signal).await
    }

    /// Serve connections from an already bound listener until `signal`
    /// resolves.
    ///
    /// Once the signal fires no new connections are accepted; requests
    /// already in flight are answered before this returns.
    pub async fn serve_listener<F>(self, listener: TcpListener, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let service = Arc::new(AdmissionService::new(self.registry, self.max_body_bytes));

        info!(
            addr = %listener.local_addr()?,
            max_body_bytes = self.max_body_bytes,
            "HTTP ingress listening"
        );

        let graceful = GracefulShutdown::new();
        tokio::pin!(signal);

        loop {
            tokio::select! {
                _ = &mut signal => {
                    info!("Stopping HTTP ingress, draining connections");
                    break;
                }
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(v) => v,
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                            continue;
                        }
                    };

                    debug!(peer = %peer, "New connection");
                    let service = service.clone();

                    let io = TokioIo::new(stream);
                    let handler = service_fn(move |request| {
                        let service = service.clone();
                        async move { Ok::<_, Infallible>(service.handle(request).await) }
                    });
                    let connection =
                        graceful.watch(http1::Builder::new().serve_connection(io, handler));

                    tokio::spawn(async move {
                        if let Err(e) = connection.await {
                            error!(peer = %peer, error = %e, "HTTP connection error");
                        }
                    });
                }
            }
        }

        drop(listener);
        match tokio::time::timeout(SHUTDOWN_GRACE, graceful.shutdown()).await {
            Ok(()) => info!("HTTP ingress stopped"),
            Err(_) => warn!(
                grace_secs = SHUTDOWN_GRACE.as_secs(),
                "Timed out waiting for connections to drain"
            ),
        }
        Ok(())
    }
}
