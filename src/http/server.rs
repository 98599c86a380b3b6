//! HTTP server implementation.

use std::future::Future;
use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing::{error, info};

use super::service::{router, AppState};
use crate::error::{Result, ViewmeterError};

/// HTTP server for the view counting service.
pub struct HttpServer {
    /// Address to bind to
    addr: SocketAddr,
    state: AppState,
}

impl HttpServer {
    pub fn new(addr: SocketAddr, state: AppState) -> Self {
        Self { addr, state }
    }

    /// Bind and serve until `signal` resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.addr).await.map_err(|e| {
            error!(addr = %self.addr, error = %e, "Failed to bind HTTP listener");
            ViewmeterError::Io(e)
        })?;

        serve_listener(listener, self.state, signal).await
    }
}

/// Serve on an already bound listener until `signal` resolves.
///
/// Each request sees the peer address it was accepted from, which the rate
/// limit gate uses as the client identity.
pub async fn serve_listener<F>(listener: TcpListener, state: AppState, signal: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    info!(addr = %addr, "Starting HTTP server with graceful shutdown");

    let app = router(state).into_make_service_with_connect_info::<SocketAddr>();

    axum::serve(listener, app)
        .with_graceful_shutdown(signal)
        .await
        .map_err(|e| {
            error!(error = %e, "HTTP server failed");
            ViewmeterError::Io(e)
        })
}
