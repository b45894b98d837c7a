//! Registry of active message relays

use bytes::Bytes;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{RwLock, broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::codec::encode_line;
use crate::{P2PError, Result};

/// Capacity of the inbound message fan-out channel
const INBOUND_CHANNEL_CAPACITY: usize = 256;

/// Identifies one relay: the remote peer plus the stream id
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RelayKey {
    pub peer: String,
    pub stream_id: u64,
}

impl RelayKey {
    #[must_use]
    pub fn new(peer: impl Into<String>, stream_id: u64) -> Self {
        Self {
            peer: peer.into(),
            stream_id,
        }
    }
}

impl fmt::Display for RelayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.peer, self.stream_id)
    }
}

/// Writable endpoint of a relay
///
/// Chunks written here are forwarded unchanged to the remote stream by the
/// relay's outbound task.
#[derive(Debug, Clone)]
pub struct RelayHandle {
    key: RelayKey,
    tx: mpsc::UnboundedSender<Bytes>,
}

impl RelayHandle {
    pub(crate) const fn new(key: RelayKey, tx: mpsc::UnboundedSender<Bytes>) -> Self {
        Self { key, tx }
    }

    #[must_use]
    pub const fn key(&self) -> &RelayKey {
        &self.key
    }

    /// Queue bytes for the remote stream
    ///
    /// # Errors
    ///
    /// Returns an error if the relay's outbound task has stopped.
    pub fn write(&self, chunk: impl Into<Bytes>) -> Result<()> {
        self.tx
            .send(chunk.into())
            .map_err(|_| P2PError::RelayClosed(self.key.to_string()))
    }

    /// Whether the outbound task is gone
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Whether both handles write into the same relay
    #[must_use]
    pub fn is_same_relay(&self, other: &Self) -> bool {
        self.tx.same_channel(&other.tx)
    }
}

/// One decoded line received on a relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub key: RelayKey,
    pub text: String,
}

/// Outcome of a broadcast
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub attempted: usize,
    pub delivered: usize,
    pub failed: usize,
}

struct Inner {
    relays: RwLock<Vec<RelayHandle>>,
    inbound: broadcast::Sender<InboundMessage>,
    shutdown: CancellationToken,
}

/// Shared, ordered collection of relays.
///
/// Cloning is cheap; all clones see the same relays. Entries are appended on
/// registration and removed when the relay's stream ends. Registering the
/// same stream twice yields two entries.
#[derive(Clone)]
pub struct RelayRegistry {
    inner: Arc<Inner>,
}

impl RelayRegistry {
    #[must_use]
    pub fn new() -> Self {
        let (inbound, _) = broadcast::channel(INBOUND_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                relays: RwLock::new(Vec::new()),
                inbound,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Append a relay
    pub async fn register(&self, handle: RelayHandle) {
        debug!("Registering relay {}", handle.key());
        self.inner.relays.write().await.push(handle);
    }

    /// Remove the entries of this relay, returning whether any existed.
    ///
    /// Entries are matched by relay, not by key, so another relay that
    /// happens to share the key stays registered.
    pub async fn unregister(&self, handle: &RelayHandle) -> bool {
        let mut relays = self.inner.relays.write().await;
        let before = relays.len();
        relays.retain(|entry| !entry.is_same_relay(handle));
        let removed = relays.len() != before;
        if removed {
            debug!("Unregistered relay {}", handle.key());
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.inner.relays.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.relays.read().await.is_empty()
    }

    /// Keys in registration order
    pub async fn keys(&self) -> Vec<RelayKey> {
        self.inner
            .relays
            .read()
            .await
            .iter()
            .map(|handle| handle.key().clone())
            .collect()
    }

    /// Write `message` plus a line terminator to every relay, in registration
    /// order. A failed write is logged and does not stop the remaining ones.
    pub async fn broadcast(&self, message: &str) -> BroadcastReport {
        let line = encode_line(message);
        let relays = self.inner.relays.read().await;
        let mut report = BroadcastReport::default();

        for handle in relays.iter() {
            report.attempted += 1;
            match handle.write(line.clone()) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!("Broadcast to {} failed: {e}", handle.key());
                    report.failed += 1;
                }
            }
        }

        report
    }

    /// Receive every inbound line decoded by any relay from now on
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<InboundMessage> {
        self.inner.inbound.subscribe()
    }

    pub(crate) fn publish(&self, message: InboundMessage) {
        // No subscribers is the normal case
        let _ = self.inner.inbound.send(message);
    }

    /// Token for a new relay; cancelled by [`RelayRegistry::close_all`]
    pub(crate) fn relay_token(&self) -> CancellationToken {
        self.inner.shutdown.child_token()
    }

    /// Stop every relay. Each one unregisters itself as it winds down.
    pub fn close_all(&self) {
        self.inner.shutdown.cancel();
    }
}

impl Default for RelayRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RelayRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayRegistry").finish_non_exhaustive()
    }
}
