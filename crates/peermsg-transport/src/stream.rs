use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf, ReadHalf, WriteHalf};

static NEXT_STREAM_ID: AtomicU64 = AtomicU64::new(1);

/// Read side of a split [`PeerStream`].
pub type StreamReadHalf = ReadHalf<PeerStream>;
/// Write side of a split [`PeerStream`].
pub type StreamWriteHalf = WriteHalf<PeerStream>;

trait DuplexIo: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> DuplexIo for T {}

/// A bidirectional byte stream multiplexed over a connection.
///
/// This is the fundamental I/O type handed out by substrates. It wraps
/// whatever duplex the substrate produces and tags it with the protocol
/// it was negotiated for and a process-unique id for diagnostics.
pub struct PeerStream {
    id: u64,
    protocol: String,
    inner: Box<dyn DuplexIo>,
}

impl PeerStream {
    /// Wrap a substrate duplex negotiated for `protocol`.
    pub fn new<T>(protocol: impl Into<String>, io: T) -> Self
    where
        T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            id: NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed),
            protocol: protocol.into(),
            inner: Box::new(io),
        }
    }

    /// Process-unique stream id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Protocol identifier this stream was opened for.
    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    /// Split into independently owned read and write halves.
    ///
    /// Shutting down the write half closes only the outbound direction.
    pub fn into_split(self) -> (StreamReadHalf, StreamWriteHalf) {
        tokio::io::split(self)
    }
}

impl AsyncRead for PeerStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for PeerStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

impl std::fmt::Debug for PeerStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerStream")
            .field("id", &self.id)
            .field("protocol", &self.protocol)
            .finish()
    }
}
