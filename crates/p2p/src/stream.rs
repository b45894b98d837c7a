//! Chat streams and the protocol preamble

use iroh::NodeId;
use iroh::endpoint::{RecvStream, SendStream};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::protocols::{CHAT_PROTOCOL, LINE_TERMINATOR};
use crate::{P2PError, Result};

/// A bidirectional QUIC stream speaking the chat protocol
pub struct ChatStream {
    id: u64,
    peer: NodeId,
    send: SendStream,
    recv: RecvStream,
}

impl ChatStream {
    pub(crate) const fn new(id: u64, peer: NodeId, send: SendStream, recv: RecvStream) -> Self {
        Self {
            id,
            peer,
            send,
            recv,
        }
    }

    /// Process-wide unique id assigned by the node
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Node on the other end
    #[must_use]
    pub const fn peer(&self) -> NodeId {
        self.peer
    }

    /// Split into the readable and writable halves
    #[must_use]
    pub fn split(self) -> (RecvStream, SendStream) {
        (self.recv, self.send)
    }
}

impl std::fmt::Debug for ChatStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatStream")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .finish_non_exhaustive()
    }
}

fn preamble() -> Vec<u8> {
    let mut line = CHAT_PROTOCOL.as_bytes().to_vec();
    line.push(LINE_TERMINATOR);
    line
}

/// Announce the chat protocol on a freshly opened stream
///
/// # Errors
///
/// Returns an error if the write fails.
pub async fn write_preamble<W>(writer: &mut W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    AsyncWriteExt::write_all(writer, &preamble()).await?;
    AsyncWriteExt::flush(writer).await?;
    Ok(())
}

/// Consume and check the preamble of an accepted stream.
///
/// Reads exactly the preamble's length so no payload bytes are lost.
///
/// # Errors
///
/// Returns an error if the stream ends early or announces another protocol.
pub async fn read_preamble<R>(reader: &mut R) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let expected = preamble();
    let mut received = vec![0u8; expected.len()];
    AsyncReadExt::read_exact(reader, &mut received).await?;

    if received == expected {
        Ok(())
    } else {
        Err(P2PError::Protocol(format!(
            "unexpected stream preamble {:?}",
            String::from_utf8_lossy(&received)
        )))
    }
}
