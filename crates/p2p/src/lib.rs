//! P2P chat relay using Iroh

pub mod address;
pub mod codec;
pub mod error;
pub mod node;
pub mod protocols;
pub mod registry;
pub mod relay;
pub mod stream;

pub use address::{DialOptions, PeerAddress};
pub use error::P2PError;
pub use node::{ChatNode, NodeConfig, RelayConfig, connection_status};
pub use protocols::{CHAT_ALPN, CHAT_PROTOCOL};
pub use registry::{BroadcastReport, InboundMessage, RelayHandle, RelayKey, RelayRegistry};
pub use relay::create_relay;

pub use iroh::{NodeId, RelayUrl, SecretKey};

pub type Result<T> = std::result::Result<T, P2PError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
    use std::time::Duration;

    async fn local_node() -> ChatNode {
        ChatNode::spawn(NodeConfig::local(), RelayRegistry::new())
            .await
            .unwrap()
    }

    async fn loopback_addr(node: &ChatNode) -> PeerAddress {
        let port = node
            .listen_addrs()
            .await
            .iter()
            .flat_map(|addr| addr.to_node_addr().direct_addresses().copied().collect::<Vec<_>>())
            .find(SocketAddr::is_ipv4)
            .map(|socket| socket.port())
            .unwrap();
        PeerAddress::direct(
            node.node_id(),
            vec![SocketAddr::from((Ipv4Addr::LOCALHOST, port))],
        )
    }

    async fn wait_for_relays(registry: &RelayRegistry, expected: usize) {
        tokio::time::timeout(Duration::from_secs(10), async {
            while registry.len().await != expected {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("relay count never reached expected value");
    }

    #[test_log::test(tokio::test)]
    async fn test_node_creation() {
        let node = local_node().await;
        tracing::info!("Created node with ID: {}", node.node_id());
        assert!(!node.listen_addrs().await.is_empty());
        assert!(node.registry().is_empty().await);
    }

    #[test_log::test(tokio::test)]
    async fn test_listen_addrs_are_dialable() {
        let config = NodeConfig {
            bind_addr: SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0),
            ..NodeConfig::local()
        };
        let node = ChatNode::spawn(config, RelayRegistry::new()).await.unwrap();

        for addr in &node.listen_addrs().await {
            assert_eq!(addr.node_id(), node.node_id());
            assert!(!addr.to_string().contains("0.0.0.0"), "{addr}");
            assert!(
                addr.to_node_addr()
                    .direct_addresses()
                    .all(|socket| !socket.ip().is_unspecified()),
                "{addr}"
            );
        }
    }

    #[test_log::test(tokio::test)]
    async fn test_listen_addrs_include_custom_relay() {
        let relay: RelayUrl = "https://relay.example.org".parse().unwrap();
        let config = NodeConfig {
            relay: RelayConfig::Custom(relay),
            ..NodeConfig::local()
        };
        let node = ChatNode::spawn(config, RelayRegistry::new()).await.unwrap();

        let addrs = node.listen_addrs().await;
        assert!(addrs.iter().any(PeerAddress::is_relayed));
    }

    #[test_log::test(tokio::test)]
    async fn test_connect_registers_relay_on_both_sides() {
        let node1 = local_node().await;
        let node2 = local_node().await;

        let handle = node2.connect_and_relay(&loopback_addr(&node1).await).await.unwrap();
        assert_eq!(handle.key().to_string(), format!("{}-0", node1.node_id()));
        assert_eq!(node2.registry().len().await, 1);

        wait_for_relays(node1.registry(), 1).await;
        let inbound_keys = node1.registry().keys().await;
        assert_eq!(inbound_keys[0].peer, node2.node_id().to_string());

        assert!(node2.connected_peers().await.contains(&node1.node_id()));
        assert!(node1.connected_peers().await.contains(&node2.node_id()));
    }

    #[test_log::test(tokio::test)]
    async fn test_repeated_connect_creates_distinct_relays() {
        let node1 = local_node().await;
        let node2 = local_node().await;
        let addr = loopback_addr(&node1).await;

        let first = node2.connect_and_relay(&addr).await.unwrap();
        let second = node2.connect_and_relay(&addr).await.unwrap();

        assert_ne!(first.key(), second.key());
        assert_eq!(node2.registry().len().await, 2);
        assert_eq!(node2.connected_peers().await.len(), 1);
        wait_for_relays(node1.registry(), 2).await;
    }

    #[test_log::test(tokio::test)]
    async fn test_broadcast_round_trip() {
        let node1 = local_node().await;
        let node2 = local_node().await;
        let mut received = node1.registry().subscribe();

        node2.connect_and_relay(&loopback_addr(&node1).await).await.unwrap();
        let report = node2.registry().broadcast("héllo from node2").await;
        assert_eq!(report.delivered, 1);

        let message = tokio::time::timeout(Duration::from_secs(10), received.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(message.text, "héllo from node2\n");
        assert_eq!(message.key.peer, node2.node_id().to_string());

        // and back again over the accepted side
        let mut replies = node2.registry().subscribe();
        node1.registry().broadcast("pong").await;
        let reply = tokio::time::timeout(Duration::from_secs(10), replies.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply.text, "pong\n");
    }

    #[test_log::test(tokio::test)]
    async fn test_dial_unreachable_peer_fails() {
        let config = NodeConfig {
            dial_timeout: Duration::from_secs(2),
            ..NodeConfig::local()
        };
        let node = ChatNode::spawn(config, RelayRegistry::new()).await.unwrap();

        let stranger = SecretKey::generate(&mut rand::thread_rng()).public();
        let addr = PeerAddress::direct(stranger, vec![SocketAddr::from((Ipv4Addr::LOCALHOST, 9))]);
        let result = node.connect_and_relay(&addr).await;

        assert!(result.is_err());
        assert!(node.registry().is_empty().await);
    }

    #[test_log::test(tokio::test)]
    async fn test_shutdown_drops_relays() {
        let node1 = local_node().await;
        let node2 = local_node().await;
        node2.connect_and_relay(&loopback_addr(&node1).await).await.unwrap();
        wait_for_relays(node1.registry(), 1).await;

        node2.shutdown().await;
        assert!(node2.is_shutting_down());
        wait_for_relays(node2.registry(), 0).await;
        wait_for_relays(node1.registry(), 0).await;
    }
}
