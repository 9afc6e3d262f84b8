//! Delimiter-bounded packet transport over a duplex byte stream.
//!
//! The reader accumulates bytes until a packet terminator appears and hands
//! back the raw packet (pre-unstuff, pre-decrypt). Writes are atomic per
//! packet.

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::protocol::PACKET_TERMINATOR;

const READ_CHUNK: usize = 4096;

/// Reading half: yields one raw packet per call.
pub struct PacketReader {
    io: Box<dyn AsyncRead + Send + Unpin>,
    buf: BytesMut,
}

impl PacketReader {
    pub fn new(io: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Self {
            io: Box::new(io),
            buf: BytesMut::with_capacity(READ_CHUNK),
        }
    }

    /// Block until a complete packet (through its terminator) is buffered,
    /// consume it, and return it.
    ///
    /// Returns [`Error::Disconnected`] when the peer closes and
    /// [`Error::Cancelled`] when `cancel` fires first.
    pub async fn read_packet(&mut self, cancel: &CancellationToken) -> Result<Bytes> {
        loop {
            if let Some(pos) = self.buf.iter().position(|&b| b == PACKET_TERMINATOR) {
                return Ok(self.buf.split_to(pos + 1).freeze());
            }
            self.buf.reserve(READ_CHUNK);
            let n = tokio::select! {
                res = self.io.read_buf(&mut self.buf) => res?,
                () = cancel.cancelled() => return Err(Error::Cancelled),
            };
            if n == 0 {
                return Err(Error::Disconnected);
            }
        }
    }
}

/// Writing half: one buffer write per packet.
pub struct PacketWriter {
    io: Box<dyn AsyncWrite + Send + Unpin>,
}

impl PacketWriter {
    pub fn new(io: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        Self { io: Box::new(io) }
    }

    pub async fn write_packet(&mut self, packet: &[u8]) -> Result<()> {
        self.io.write_all(packet).await?;
        self.io.flush().await?;
        Ok(())
    }
}

/// Split a duplex stream into the two packet halves.
pub fn split_stream(
    stream: impl AsyncRead + AsyncWrite + Send + 'static,
) -> (PacketReader, PacketWriter) {
    let (read, write) = tokio::io::split(stream);
    (PacketReader::new(read), PacketWriter::new(write))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn packets_split_at_terminator() {
        let (client, server) = tokio::io::duplex(256);
        let (mut reader, _writer) = split_stream(server);
        let cancel = CancellationToken::new();

        let (_, mut client_write) = tokio::io::split(client);
        client_write
            .write_all(&[0x7E, 0x01, 0x02, 0x7F, 0x7E, 0x03, 0x7F])
            .await
            .unwrap();

        let first = reader.read_packet(&cancel).await.unwrap();
        assert_eq!(&first[..], &[0x7E, 0x01, 0x02, 0x7F]);
        let second = reader.read_packet(&cancel).await.unwrap();
        assert_eq!(&second[..], &[0x7E, 0x03, 0x7F]);
    }

    #[tokio::test]
    async fn split_reads_reassemble() {
        let (client, server) = tokio::io::duplex(256);
        let (mut reader, _writer) = split_stream(server);

        let (_, mut client_write) = tokio::io::split(client);
        let read_task = tokio::spawn(async move {
            let cancel = CancellationToken::new();
            reader.read_packet(&cancel).await
        });
        client_write.write_all(&[0x7E, 0xAA]).await.unwrap();
        tokio::task::yield_now().await;
        client_write.write_all(&[0xBB, 0x7F]).await.unwrap();

        let packet = read_task.await.unwrap().unwrap();
        assert_eq!(&packet[..], &[0x7E, 0xAA, 0xBB, 0x7F]);
    }

    #[tokio::test]
    async fn eof_surfaces_disconnected() {
        let (client, server) = tokio::io::duplex(64);
        let (mut reader, _writer) = split_stream(server);
        drop(client);

        let err = reader.read_packet(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, Error::Disconnected));
    }

    #[tokio::test]
    async fn cancellation_interrupts_blocked_read() {
        let (_client, server) = tokio::io::duplex(64);
        let (mut reader, _writer) = split_stream(server);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = reader.read_packet(&cancel).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }
}
