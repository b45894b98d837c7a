//! Chat node: iroh endpoint, inbound protocol handler and connection table

use futures::StreamExt;
use iroh::{
    Endpoint, NodeId, RelayMap, RelayMode, RelayUrl, SecretKey, Watcher,
    endpoint::{Connection, RecvStream, SendStream},
    protocol::{AcceptError, ProtocolHandler, Router},
};
use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::address::{DialOptions, PeerAddress};
use crate::protocols::CHAT_ALPN;
use crate::registry::{RelayHandle, RelayRegistry};
use crate::relay::create_relay;
use crate::stream::{ChatStream, read_preamble, write_preamble};
use crate::{P2PError, Result};

/// Default bound for dialing and opening a stream
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(15);

/// How long [`ChatNode::listen_addrs`] waits for the endpoint's first address
const ADDR_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Relay server selection for the endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayConfig {
    /// The library's public relay servers
    Default,
    /// No relay; direct connectivity only
    Disabled,
    /// A single relay server
    Custom(RelayUrl),
}

/// Configuration for a [`ChatNode`]
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Node identity (if not provided, one will be generated)
    pub secret_key: Option<SecretKey>,
    /// IPv4 bind address for the endpoint; port 0 picks an ephemeral port
    pub bind_addr: SocketAddrV4,
    pub relay: RelayConfig,
    /// Enable n0 DNS and local network discovery
    pub discovery: bool,
    pub dial_timeout: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            secret_key: None,
            bind_addr: SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0),
            relay: RelayConfig::Default,
            discovery: true,
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
        }
    }
}

impl NodeConfig {
    /// Loopback-only node without relays or discovery
    #[must_use]
    pub fn local() -> Self {
        Self {
            bind_addr: SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0),
            relay: RelayConfig::Disabled,
            discovery: false,
            ..Self::default()
        }
    }
}

type ConnectionTable = Arc<RwLock<HashMap<NodeId, Connection>>>;

/// State shared between the node and its protocol handler
#[derive(Debug)]
struct Shared {
    registry: RelayRegistry,
    connections: ConnectionTable,
    next_stream_id: AtomicU64,
    dial_timeout: Duration,
    shutdown_token: CancellationToken,
}

impl Shared {
    fn next_stream_id(&self) -> u64 {
        self.next_stream_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Store a connection and drop it from the table once it closes
    async fn track_connection(&self, peer: NodeId, connection: Connection) {
        self.connections
            .write()
            .await
            .insert(peer, connection.clone());

        let connections = Arc::clone(&self.connections);
        tokio::spawn(async move {
            let reason = connection.closed().await;
            debug!("Connection to {peer} closed: {reason}");

            let mut table = connections.write().await;
            if table
                .get(&peer)
                .is_some_and(|current| current.close_reason().is_some())
            {
                table.remove(&peer);
            }
        });
    }

    async fn live_connection(&self, peer: NodeId) -> Option<Connection> {
        self.connections
            .read()
            .await
            .get(&peer)
            .filter(|connection| connection.close_reason().is_none())
            .cloned()
    }

    async fn attach(&self, stream: ChatStream) -> RelayHandle {
        let peer = stream.peer().to_string();
        let stream_id = stream.id();
        let (recv, send) = stream.split();
        create_relay(&self.registry, peer, stream_id, recv, send).await
    }

    async fn accept_stream(&self, peer: NodeId, send: SendStream, mut recv: RecvStream) {
        match tokio::time::timeout(self.dial_timeout, read_preamble(&mut recv)).await {
            Ok(Ok(())) => {
                let stream = ChatStream::new(self.next_stream_id(), peer, send, recv);
                info!("new stream={} from {peer}", stream.id());
                self.attach(stream).await;
            }
            Ok(Err(e)) => warn!("Rejected stream from {peer}: {e}"),
            Err(_) => warn!("Rejected stream from {peer}: no preamble within {:?}", self.dial_timeout),
        }
    }
}

/// Inbound handler for the chat ALPN
#[derive(Debug, Clone)]
struct ChatProtocol {
    shared: Arc<Shared>,
}

impl ProtocolHandler for ChatProtocol {
    async fn accept(&self, connection: Connection) -> std::result::Result<(), AcceptError> {
        let peer = connection.remote_node_id()?;
        info!("Accepted chat connection from {peer}");
        self.shared
            .track_connection(peer, connection.clone())
            .await;

        loop {
            tokio::select! {
                stream = connection.accept_bi() => match stream {
                    Ok((send, recv)) => {
                        let shared = Arc::clone(&self.shared);
                        tokio::spawn(async move {
                            shared.accept_stream(peer, send, recv).await;
                        });
                    }
                    Err(e) => {
                        debug!("Connection from {peer} stopped accepting streams: {e}");
                        break;
                    }
                },
                () = self.shared.shutdown_token.cancelled() => break,
            }
        }

        Ok(())
    }
}

/// Local peer: dials, accepts and relays chat streams
pub struct ChatNode {
    router: Router,
    node_id: NodeId,
    relay_url: Option<RelayUrl>,
    shared: Arc<Shared>,
}

impl ChatNode {
    /// Bind the endpoint and register the chat protocol handler
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint fails to bind.
    pub async fn spawn(config: NodeConfig, registry: RelayRegistry) -> Result<Self> {
        let mut builder = Endpoint::builder()
            .alpns(vec![CHAT_ALPN.to_vec()])
            .bind_addr_v4(config.bind_addr);

        if let Some(secret_key) = config.secret_key {
            builder = builder.secret_key(secret_key);
        }

        let relay_url = match config.relay {
            RelayConfig::Default => {
                builder = builder.relay_mode(RelayMode::Default);
                None
            }
            RelayConfig::Disabled => {
                builder = builder.relay_mode(RelayMode::Disabled);
                None
            }
            RelayConfig::Custom(url) => {
                builder = builder.relay_mode(RelayMode::Custom(RelayMap::from(url.clone())));
                Some(url)
            }
        };

        if config.discovery {
            builder = builder.discovery_n0().discovery_local_network();
        }

        let endpoint = builder
            .bind()
            .await
            .map_err(|e| P2PError::Bind(e.to_string()))?;
        let node_id = endpoint.node_id();

        let shared = Arc::new(Shared {
            registry,
            connections: Arc::new(RwLock::new(HashMap::new())),
            next_stream_id: AtomicU64::new(0),
            dial_timeout: config.dial_timeout,
            shutdown_token: CancellationToken::new(),
        });

        let router = Router::builder(endpoint)
            .accept(
                CHAT_ALPN,
                ChatProtocol {
                    shared: Arc::clone(&shared),
                },
            )
            .spawn();

        info!("Chat node started with ID: {node_id}");

        Ok(Self {
            router,
            node_id,
            relay_url,
            shared,
        })
    }

    /// Get this node's ID
    #[must_use]
    pub const fn node_id(&self) -> NodeId {
        self.node_id
    }

    #[must_use]
    pub fn registry(&self) -> &RelayRegistry {
        &self.shared.registry
    }

    /// Addresses other peers can dial.
    ///
    /// One entry per direct address the endpoint has discovered, plus the
    /// home relay (or the configured custom relay). Unspecified addresses
    /// such as `0.0.0.0` are never listed.
    pub async fn listen_addrs(&self) -> Vec<PeerAddress> {
        let endpoint = self.router.endpoint();
        let discovered = tokio::time::timeout(ADDR_DISCOVERY_TIMEOUT, async {
            let mut updates = std::pin::pin!(endpoint.node_addr().stream());
            while let Some(update) = updates.next().await {
                if let Some(node_addr) = update {
                    return Some(node_addr);
                }
            }
            None
        })
        .await
        .ok()
        .flatten();

        let (direct, relay_url): (Vec<SocketAddr>, Option<RelayUrl>) = match discovered {
            Some(node_addr) => (
                node_addr.direct_addresses().copied().collect(),
                node_addr.relay_url().cloned(),
            ),
            None => {
                debug!("No address discovered within {ADDR_DISCOVERY_TIMEOUT:?}, using bound sockets");
                (endpoint.bound_sockets(), None)
            }
        };

        let mut addrs: Vec<PeerAddress> = direct
            .into_iter()
            .filter(|socket| !socket.ip().is_unspecified())
            .map(|socket| PeerAddress::direct(self.node_id, vec![socket]))
            .collect();

        if let Some(url) = relay_url.or_else(|| self.relay_url.clone()) {
            addrs.push(PeerAddress::relayed(self.node_id, url));
        }
        addrs
    }

    /// Get list of connected peers
    pub async fn connected_peers(&self) -> Vec<NodeId> {
        self.shared.connections.read().await.keys().copied().collect()
    }

    /// Connect to a peer, reusing a live connection when one exists
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established in time.
    #[instrument(skip(self, options), fields(peer = %addr.node_id()))]
    pub async fn dial(&self, addr: &PeerAddress, options: &DialOptions) -> Result<Connection> {
        let peer = addr.node_id();
        if let Some(connection) = self.shared.live_connection(peer).await {
            debug!("Reusing connection to {peer}");
            return Ok(connection);
        }

        debug!("Dialing {addr} (relayed: {})", options.relayed);
        let connection = tokio::time::timeout(
            self.shared.dial_timeout,
            self.router.endpoint().connect(addr.to_node_addr(), CHAT_ALPN),
        )
        .await
        .map_err(|_| P2PError::Timeout(format!("dialing {peer}")))?
        .map_err(|e| P2PError::ConnectionFailed(format!("Failed to connect to {peer}: {e}")))?;

        self.shared.track_connection(peer, connection.clone()).await;
        info!("Successfully connected to peer: {peer}");
        Ok(connection)
    }

    /// Open a chat stream on `connection` and announce the protocol.
    ///
    /// Direct dials are bounded by the dial timeout; relayed ones are not.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream cannot be opened or the preamble write
    /// fails.
    pub async fn open_chat_stream(
        &self,
        connection: &Connection,
        options: &DialOptions,
    ) -> Result<ChatStream> {
        let peer = connection
            .remote_node_id()
            .map_err(|e| P2PError::ConnectionFailed(format!("Failed to get remote node ID: {e}")))?;

        let open = async {
            let (mut send, recv) = connection.open_bi().await?;
            write_preamble(&mut send).await?;
            Ok::<_, P2PError>((send, recv))
        };

        let (send, recv) = if options.relayed {
            open.await?
        } else {
            tokio::time::timeout(self.shared.dial_timeout, open)
                .await
                .map_err(|_| P2PError::Timeout(format!("opening stream to {peer}")))??
        };

        let stream = ChatStream::new(self.shared.next_stream_id(), peer, send, recv);
        debug!("Opened stream {} to {peer}", stream.id());
        Ok(stream)
    }

    /// Dial, open a chat stream and register a relay for it
    ///
    /// # Errors
    ///
    /// Returns an error if dialing or opening the stream fails.
    #[instrument(skip(self), fields(peer = %addr.node_id()))]
    pub async fn connect_and_relay(&self, addr: &PeerAddress) -> Result<RelayHandle> {
        let options = DialOptions::for_address(addr);
        let connection = self.dial(addr, &options).await?;
        let stream = self.open_chat_stream(&connection, &options).await?;
        Ok(self.shared.attach(stream).await)
    }

    /// Stop relays, close connections and the endpoint
    pub async fn shutdown(&self) {
        info!("Starting shutdown of chat node");
        self.shared.shutdown_token.cancel();
        self.shared.registry.close_all();

        for (peer, connection) in self.shared.connections.read().await.iter() {
            debug!("Closing connection to peer: {peer}");
            connection.close(0u8.into(), b"node shutdown");
        }

        if let Err(e) = self.router.shutdown().await {
            warn!("Router shutdown failed: {e}");
        }
        self.shared.connections.write().await.clear();
        info!("Chat node shutdown completed");
    }

    /// Check if the node is shutting down
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.shared.shutdown_token.is_cancelled()
    }
}

impl std::fmt::Debug for ChatNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatNode")
            .field("node_id", &self.node_id)
            .field("relay_url", &self.relay_url)
            .finish_non_exhaustive()
    }
}

/// Status string reported for a dialed connection
#[must_use]
pub fn connection_status(connection: &Connection) -> &'static str {
    if connection.close_reason().is_none() {
        "open"
    } else {
        "closed"
    }
}
