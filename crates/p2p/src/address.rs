//! Peer address parsing and dial options

use iroh::{NodeAddr, NodeId, RelayUrl};
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use crate::P2PError;

/// How a [`PeerAddress`] reaches its node
#[derive(Debug, Clone, PartialEq, Eq)]
enum Route {
    /// Node id only; the endpoint's discovery resolves it
    Discovery,
    /// One or more direct UDP socket addresses
    Direct(Vec<SocketAddr>),
    /// Through a relay server
    Relay(RelayUrl),
}

/// Textual peer address.
///
/// Accepted forms:
/// - `<node-id>`
/// - `<node-id>@<ip>:<port>[,<ip>:<port>...]`
/// - `<node-id>@<http|https relay url>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerAddress {
    node_id: NodeId,
    route: Route,
}

impl PeerAddress {
    /// Address reachable at the given direct socket addresses
    #[must_use]
    pub fn direct(node_id: NodeId, addrs: Vec<SocketAddr>) -> Self {
        let route = if addrs.is_empty() {
            Route::Discovery
        } else {
            Route::Direct(addrs)
        };
        Self { node_id, route }
    }

    /// Address reachable through a relay server
    #[must_use]
    pub const fn relayed(node_id: NodeId, relay_url: RelayUrl) -> Self {
        Self {
            node_id,
            route: Route::Relay(relay_url),
        }
    }

    /// The node identity this address points at
    #[must_use]
    pub const fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// Whether the address routes through a relay server
    #[must_use]
    pub const fn is_relayed(&self) -> bool {
        matches!(self.route, Route::Relay(_))
    }

    /// Convert into the address type the endpoint dials
    #[must_use]
    pub fn to_node_addr(&self) -> NodeAddr {
        match &self.route {
            Route::Discovery => NodeAddr::new(self.node_id),
            Route::Direct(addrs) => NodeAddr::from_parts(self.node_id, None, addrs.clone()),
            Route::Relay(url) => NodeAddr::from_parts(self.node_id, Some(url.clone()), Vec::new()),
        }
    }
}

impl FromStr for PeerAddress {
    type Err = P2PError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(P2PError::InvalidAddress("empty address".to_string()));
        }

        let (id_part, route_part) = match s.split_once('@') {
            Some((id, route)) => (id, Some(route)),
            None => (s, None),
        };

        let node_id = id_part
            .parse::<NodeId>()
            .map_err(|e| P2PError::InvalidAddress(format!("invalid node id `{id_part}`: {e}")))?;

        let route = match route_part {
            None => Route::Discovery,
            Some(route) if route.starts_with("http://") || route.starts_with("https://") => {
                let url = route.parse::<RelayUrl>().map_err(|e| {
                    P2PError::InvalidAddress(format!("invalid relay url `{route}`: {e}"))
                })?;
                Route::Relay(url)
            }
            Some(route) => {
                let addrs = route
                    .split(',')
                    .map(|part| {
                        part.trim().parse::<SocketAddr>().map_err(|e| {
                            P2PError::InvalidAddress(format!("invalid socket address `{part}`: {e}"))
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Route::Direct(addrs)
            }
        };

        Ok(Self { node_id, route })
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.route {
            Route::Discovery => write!(f, "{}", self.node_id),
            Route::Direct(addrs) => {
                write!(f, "{}@", self.node_id)?;
                for (i, addr) in addrs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{addr}")?;
                }
                Ok(())
            }
            Route::Relay(url) => write!(f, "{}@{url}", self.node_id),
        }
    }
}

/// Options applied when dialing a peer and opening a chat stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DialOptions {
    /// The path goes through a relay server. Relayed stream opens are not
    /// bounded by the dial timeout.
    pub relayed: bool,
}

impl DialOptions {
    /// Derive options from the shape of the address
    #[must_use]
    pub const fn for_address(addr: &PeerAddress) -> Self {
        Self {
            relayed: addr.is_relayed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node_id() -> NodeId {
        iroh::SecretKey::generate(&mut rand::thread_rng()).public()
    }

    #[test]
    fn test_parse_node_id_only() {
        let id = node_id();
        let addr: PeerAddress = id.to_string().parse().unwrap();
        assert_eq!(addr.node_id(), id);
        assert!(!addr.is_relayed());
        assert!(addr.to_node_addr().direct_addresses().next().is_none());
    }

    #[test]
    fn test_parse_direct_addresses() {
        let id = node_id();
        let addr: PeerAddress = format!("{id}@127.0.0.1:4000,[::1]:4001").parse().unwrap();
        let node_addr = addr.to_node_addr();
        let direct: Vec<_> = node_addr.direct_addresses().copied().collect();
        assert_eq!(direct.len(), 2);
        assert!(direct.contains(&"127.0.0.1:4000".parse().unwrap()));
        assert!(!addr.is_relayed());
        assert_eq!(DialOptions::for_address(&addr), DialOptions { relayed: false });
    }

    #[test]
    fn test_parse_relay_url_sets_relayed() {
        let id = node_id();
        let addr: PeerAddress = format!("{id}@https://relay.example.org").parse().unwrap();
        assert!(addr.is_relayed());
        assert!(DialOptions::for_address(&addr).relayed);
        assert!(addr.to_node_addr().relay_url().is_some());
    }

    #[test]
    fn test_display_round_trips() {
        let id = node_id();
        for text in [
            id.to_string(),
            format!("{id}@10.0.0.1:9000"),
            format!("{id}@https://relay.example.org/"),
        ] {
            let parsed: PeerAddress = text.parse().unwrap();
            let reparsed: PeerAddress = parsed.to_string().parse().unwrap();
            assert_eq!(parsed, reparsed, "round trip of {text}");
        }
    }

    #[test]
    fn test_malformed_addresses_are_rejected() {
        let id = node_id();
        for text in [
            String::new(),
            "   ".to_string(),
            "not-a-node-id".to_string(),
            "/ip4/127.0.0.1/tcp/4001".to_string(),
            format!("{id}@"),
            format!("{id}@localhost"),
            format!("{id}@127.0.0.1:4000,nope"),
        ] {
            let result = text.parse::<PeerAddress>();
            assert!(
                matches!(result, Err(P2PError::InvalidAddress(_))),
                "expected {text:?} to be rejected"
            );
        }
    }
}
