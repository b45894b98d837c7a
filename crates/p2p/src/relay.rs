//! Bidirectional text relay between a local write queue and a peer stream
//!
//! Every relay runs two tasks. The inbound task decodes lines from the
//! stream, logs them and publishes them to registry subscribers. The
//! outbound task drains the relay's queue into the stream. When either side
//! ends, the shared token stops the other and the relay unregisters itself.

use bytes::Bytes;
use futures::StreamExt;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::codec::{ChatCodec, display_text};
use crate::registry::{InboundMessage, RelayHandle, RelayKey, RelayRegistry};

/// Bound on finishing the send side once the outbound task stops
const FINISH_TIMEOUT: Duration = Duration::from_secs(5);

/// Create a relay over `reader`/`writer` and register it.
///
/// The returned handle is the relay's writable endpoint. Calling this twice
/// for the same peer and stream creates two independent relays.
pub async fn create_relay<R, W>(
    registry: &RelayRegistry,
    peer: impl Into<String>,
    stream_id: u64,
    reader: R,
    writer: W,
) -> RelayHandle
where
    R: AsyncRead + Send + Unpin + 'static,
    W: AsyncWrite + Send + Unpin + 'static,
{
    let key = RelayKey::new(peer, stream_id);
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = RelayHandle::new(key.clone(), tx);
    let token = registry.relay_token();

    registry.register(handle.clone()).await;

    let inbound = tokio::spawn(pump_inbound(
        reader,
        key.clone(),
        registry.clone(),
        token.clone(),
    ));
    let outbound = tokio::spawn(pump_outbound(rx, writer, key.clone(), token));

    let registry = registry.clone();
    let registered = handle.clone();
    tokio::spawn(async move {
        let (inbound, outbound) = tokio::join!(inbound, outbound);
        if let Err(e) = inbound {
            warn!("Inbound task of relay {key} panicked: {e}");
        }
        if let Err(e) = outbound {
            warn!("Outbound task of relay {key} panicked: {e}");
        }
        registry.unregister(&registered).await;
        info!("Relay {key} closed");
    });

    handle
}

async fn pump_inbound<R>(
    reader: R,
    key: RelayKey,
    registry: RelayRegistry,
    token: CancellationToken,
) where
    R: AsyncRead + Unpin,
{
    let mut lines = FramedRead::new(reader, ChatCodec::default());

    loop {
        tokio::select! {
            () = token.cancelled() => break,
            line = lines.next() => match line {
                Some(Ok(text)) => {
                    info!("{}.stream[{}] > {}", key.peer, key.stream_id, display_text(&text));
                    registry.publish(InboundMessage { key: key.clone(), text });
                }
                Some(Err(e)) => {
                    warn!("Read from relay {key} failed: {e}");
                    break;
                }
                None => {
                    info!("Relay {key} source exhausted");
                    break;
                }
            },
        }
    }

    token.cancel();
}

async fn pump_outbound<W>(
    mut rx: mpsc::UnboundedReceiver<Bytes>,
    mut writer: W,
    key: RelayKey,
    token: CancellationToken,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            () = token.cancelled() => break,
            chunk = rx.recv() => match chunk {
                Some(chunk) => {
                    debug!("Relay {key} sending {} bytes", chunk.len());
                    tokio::select! {
                        () = token.cancelled() => break,
                        written = write_chunk(&mut writer, &chunk) => {
                            if let Err(e) = written {
                                warn!("Write to relay {key} failed: {e}");
                                break;
                            }
                        }
                    }
                }
                None => break,
            },
        }
    }

    rx.close();
    match tokio::time::timeout(FINISH_TIMEOUT, writer.shutdown()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!("Finishing relay {key} sink failed: {e}"),
        Err(_) => debug!("Finishing relay {key} sink timed out"),
    }
    token.cancel();
}

async fn write_chunk<W>(writer: &mut W, chunk: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(chunk).await?;
    writer.flush().await
}
