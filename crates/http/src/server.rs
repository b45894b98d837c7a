//! HTTP listener for the gateway

use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::{AppState, router};

/// Serves the gateway router on a TCP listener
#[derive(Clone, Debug)]
pub struct HttpServer {
    router: Router<()>,
}

impl HttpServer {
    pub fn new(state: AppState) -> Self {
        Self {
            router: router(state),
        }
    }

    /// Accept requests until `shutdown` is cancelled
    ///
    /// # Errors
    ///
    /// Returns an error if the listener fails.
    #[tracing::instrument(name = "http.serve", skip_all)]
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: CancellationToken,
    ) -> std::io::Result<()> {
        if let Ok(addr) = listener.local_addr() {
            info!("HTTP gateway listening on {addr}");
        }

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        debug!("HTTP gateway stopped");
        Ok(())
    }
}
