//! Composition root: chat node, HTTP gateway and status ticker

use peerchat_http::{AppState, HttpServer};
use peerchat_p2p::{ChatNode, PeerAddress, RelayRegistry};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Settings;
use crate::identity::load_or_create_secret_key;
use crate::{DaemonError, Result};

/// How long shutdown waits for the HTTP server to drain
const SERVER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// A running peerchat node with its HTTP gateway
#[derive(Debug)]
pub struct Daemon {
    node: Arc<ChatNode>,
    http_addr: SocketAddr,
    shutdown: CancellationToken,
    server: JoinHandle<()>,
    heartbeat: Option<JoinHandle<()>>,
}

impl Daemon {
    /// Start the node, then the HTTP gateway.
    ///
    /// The inbound stream handler is registered before the HTTP listener
    /// is bound.
    ///
    /// # Errors
    ///
    /// Returns an error if the identity, endpoint or listener setup fails.
    pub async fn start(settings: &Settings) -> Result<Self> {
        let secret_key = match &settings.p2p.secret_key_path {
            Some(path) => Some(load_or_create_secret_key(path).await?),
            None => None,
        };

        let node_config = settings.node_config(secret_key)?;
        let node = Arc::new(ChatNode::spawn(node_config, RelayRegistry::new()).await?);

        let bind_addr = settings.http_bind_addr()?;
        let listener = TcpListener::bind(bind_addr)
            .await
            .map_err(|e| DaemonError::Http(format!("Failed to bind to {bind_addr}: {e}")))?;
        let http_addr = listener.local_addr()?;

        let shutdown = CancellationToken::new();
        let server = HttpServer::new(AppState::new(Arc::clone(&node)));
        let server = tokio::spawn({
            let shutdown = shutdown.clone();
            async move {
                if let Err(e) = server.serve(listener, shutdown).await {
                    error!("HTTP server error: {e}");
                }
            }
        });

        let heartbeat = (settings.status_interval_secs > 0).then(|| {
            spawn_heartbeat(
                Arc::clone(&node),
                Duration::from_secs(settings.status_interval_secs),
                shutdown.clone(),
            )
        });

        info!("Daemon started: node {} gateway http://{http_addr}/", node.node_id());

        Ok(Self {
            node,
            http_addr,
            shutdown,
            server,
            heartbeat,
        })
    }

    #[must_use]
    pub const fn node(&self) -> &Arc<ChatNode> {
        &self.node
    }

    /// Address the HTTP gateway is bound to
    #[must_use]
    pub const fn http_addr(&self) -> SocketAddr {
        self.http_addr
    }

    pub async fn listen_addrs(&self) -> Vec<PeerAddress> {
        self.node.listen_addrs().await
    }

    /// Stop the gateway, then the node
    pub async fn shutdown(self) {
        info!("Shutting down daemon");
        self.shutdown.cancel();

        if !join_or_abort(self.server, SERVER_SHUTDOWN_TIMEOUT).await {
            warn!("HTTP server did not stop within {SERVER_SHUTDOWN_TIMEOUT:?}, aborted");
        }
        if let Some(heartbeat) = self.heartbeat {
            heartbeat.abort();
        }

        self.node.shutdown().await;
    }
}

/// Wait up to `limit` for `task` to finish, aborting it otherwise.
/// Returns whether it finished on its own.
async fn join_or_abort(mut task: JoinHandle<()>, limit: Duration) -> bool {
    if tokio::time::timeout(limit, &mut task).await.is_ok() {
        return true;
    }
    task.abort();
    false
}

/// Peers online as reported by the status ticker, this node included
const fn online_count(remote_peers: usize) -> usize {
    remote_peers + 1
}

/// Periodically log how many relays and peers are active
fn spawn_heartbeat(
    node: Arc<ChatNode>,
    period: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let relays = node.registry().len().await;
                    let remote_peers = node.connected_peers().await.len();
                    let online = online_count(remote_peers);
                    info!(relays, remote_peers, "{online} peers online");
                }
            }
        }
        debug!("Status ticker stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_online_count_includes_self() {
        assert_eq!(online_count(0), 1);
        assert_eq!(online_count(3), 4);
    }

    #[tokio::test]
    async fn test_join_or_abort_returns_when_task_finishes() {
        let task = tokio::spawn(async {});
        assert!(join_or_abort(task, Duration::from_secs(5)).await);
    }

    #[tokio::test]
    async fn test_join_or_abort_stops_stuck_task() {
        let (alive, mut gone) = tokio::sync::oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let _alive = alive;
            std::future::pending::<()>().await;
        });

        assert!(!join_or_abort(task, Duration::from_millis(50)).await);
        tokio::time::timeout(Duration::from_secs(5), &mut gone)
            .await
            .expect("aborted task was left running")
            .unwrap_err();
    }
}
