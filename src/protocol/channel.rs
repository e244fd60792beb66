//! # Framed control channel.
//!
//! [`ControlChannel`] wraps any duplex byte transport and exposes it as a pair
//! of framed halves speaking [`Message`]s:
//!
//! ```text
//!  transport (UnixStream / DuplexStream)
//!        │ tokio::io::split
//!        ├──► ChannelReader  (FramedRead  + MessageCodec)
//!        └──► ChannelWriter  (FramedWrite + MessageCodec)
//! ```
//!
//! The orchestrator owns one end per worker (inside the worker link task);
//! the worker owns the other end (inside [`WorkerClient`](crate::WorkerClient)).

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadHalf, WriteHalf};
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::{
    error::ProtocolError,
    protocol::{Message, MessageCodec},
};

/// Byte transport usable as a control channel.
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> Transport for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

type BoxTransport = Box<dyn Transport>;

/// In-memory buffer size of [`ControlChannel::pair`].
const PAIR_BUFFER: usize = 1024;

/// Receiving half of a control channel.
pub struct ChannelReader {
    inner: FramedRead<ReadHalf<BoxTransport>, MessageCodec>,
}

impl ChannelReader {
    /// Waits for the next message.
    ///
    /// Returns `None` once the peer closed the channel.
    pub async fn recv(&mut self) -> Option<Result<Message, ProtocolError>> {
        self.inner.next().await
    }
}

/// Sending half of a control channel.
pub struct ChannelWriter {
    inner: FramedWrite<WriteHalf<BoxTransport>, MessageCodec>,
}

impl ChannelWriter {
    /// Writes and flushes one message.
    pub async fn send(&mut self, msg: Message) -> Result<(), ProtocolError> {
        self.inner.send(msg).await
    }
}

/// Bidirectional, framed control channel.
pub struct ControlChannel {
    reader: ChannelReader,
    writer: ChannelWriter,
}

impl ControlChannel {
    /// Wraps a duplex transport.
    pub fn new<T: Transport>(io: T) -> Self {
        let boxed: BoxTransport = Box::new(io);
        let (read, write) = tokio::io::split(boxed);
        Self {
            reader: ChannelReader {
                inner: FramedRead::new(read, MessageCodec::new()),
            },
            writer: ChannelWriter {
                inner: FramedWrite::new(write, MessageCodec::new()),
            },
        }
    }

    /// Creates two connected in-memory channel ends.
    pub fn pair() -> (ControlChannel, ControlChannel) {
        let (a, b): (DuplexStream, DuplexStream) = tokio::io::duplex(PAIR_BUFFER);
        (ControlChannel::new(a), ControlChannel::new(b))
    }

    /// Adopts a connected standard-library Unix socket.
    ///
    /// Must be called from within a Tokio runtime.
    #[cfg(unix)]
    pub fn from_std(stream: std::os::unix::net::UnixStream) -> std::io::Result<Self> {
        stream.set_nonblocking(true)?;
        let stream = tokio::net::UnixStream::from_std(stream)?;
        Ok(Self::new(stream))
    }

    /// Splits the channel into independently owned halves.
    pub fn split(self) -> (ChannelReader, ChannelWriter) {
        (self.reader, self.writer)
    }

    /// Shorthand for [`ChannelWriter::send`].
    pub async fn send(&mut self, msg: Message) -> Result<(), ProtocolError> {
        self.writer.send(msg).await
    }

    /// Shorthand for [`ChannelReader::recv`].
    pub async fn recv(&mut self) -> Option<Result<Message, ProtocolError>> {
        self.reader.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pair_delivers_messages_both_ways() {
        let (mut orchestrator, mut worker) = ControlChannel::pair();

        worker.send(Message::Ready).await.unwrap();
        assert_eq!(orchestrator.recv().await.unwrap().unwrap(), Message::Ready);

        orchestrator.send(Message::Serve).await.unwrap();
        assert_eq!(worker.recv().await.unwrap().unwrap(), Message::Serve);
    }

    #[tokio::test]
    async fn dropping_one_end_closes_the_other() {
        let (mut orchestrator, worker) = ControlChannel::pair();
        drop(worker);
        assert!(orchestrator.recv().await.is_none());
    }
}
