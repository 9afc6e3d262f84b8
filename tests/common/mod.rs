//! Scripted panel harness driving a session over an in-memory duplex pipe.
#![allow(dead_code)] // each test binary uses a different slice of the harness

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use itv2_gateway::codec::PayloadWriter;
use itv2_gateway::config::{IntegrationConfig, TimingConfig};
use itv2_gateway::crypto::FrameCipher;
use itv2_gateway::protocol::{framing, registry, Envelope, Frame, Message};
use itv2_gateway::session::{PanelEvent, Session};

/// Timing tuned for tests: second-granularity heartbeat, short timeouts.
pub fn test_timing() -> TimingConfig {
    TimingConfig {
        transaction_timeout_secs: 5,
        handshake_timeout_secs: 5,
        lock_timeout_secs: 5,
        version_probe_delay_secs: 1,
        poll_interval_secs: 1,
    }
}

/// Spin up a session attached to one end of a duplex pipe, returning the
/// panel harness for the other end.
pub fn session_pair(
    integration: IntegrationConfig,
) -> (Arc<Session>, Panel, mpsc::Receiver<PanelEvent>) {
    let (panel_stream, server_stream) = tokio::io::duplex(4096);
    let (events_tx, events_rx) = mpsc::channel(64);
    let shutdown = CancellationToken::new();
    let session = Session::attach(
        server_stream,
        None,
        test_timing(),
        Arc::new(integration),
        events_tx,
        &shutdown,
    );
    (session, Panel::new(panel_stream), events_rx)
}

/// A panel side speaking raw wire bytes with its own sequence counters.
pub struct Panel<S = DuplexStream> {
    read: ReadHalf<S>,
    write: WriteHalf<S>,
    buf: Vec<u8>,
    /// Panel's own sender sequence.
    pub seq: u8,
    /// Last sender sequence observed from the server.
    pub last_server_seq: u8,
    pub app_seq: u8,
    /// Panel -> server cipher (the server's inbound key).
    pub send_cipher: Option<FrameCipher>,
    /// Server -> panel cipher (the server's outbound key).
    pub recv_cipher: Option<FrameCipher>,
}

impl<S: AsyncRead + AsyncWrite> Panel<S> {
    pub fn new(stream: S) -> Self {
        let (read, write) = tokio::io::split(stream);
        Self {
            read,
            write,
            buf: Vec::new(),
            seq: 0,
            last_server_seq: 0,
            app_seq: 0,
            send_cipher: None,
            recv_cipher: None,
        }
    }

    /// Read one frame from the server, or `None` on EOF.
    pub async fn read_frame(&mut self) -> Option<Frame> {
        loop {
            if let Some(pos) = self.buf.iter().position(|&b| b == 0x7F) {
                let packet: Vec<u8> = self.buf.drain(..=pos).collect();
                let (_header, body) = framing::split_packet(&packet).expect("bad packet");
                let inner = match &self.recv_cipher {
                    Some(cipher) => cipher.decrypt(&body).expect("bad ciphertext"),
                    None => body,
                };
                let frame = Frame::decode(&inner, |c| registry().has_app_sequence(c))
                    .expect("bad frame");
                self.last_server_seq = frame.sender_seq;
                return Some(frame);
            }
            let mut chunk = [0u8; 1024];
            let n = self.read.read(&mut chunk).await.expect("read failed");
            if n == 0 {
                return None;
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }

    /// Read and decode one frame into its typed envelope.
    pub async fn read_envelope(&mut self) -> Option<Envelope> {
        let frame = self.read_frame().await?;
        Some(Envelope::from_frame(frame).expect("bad payload"))
    }

    /// Send a raw frame, allocating the panel-side sequences.
    pub async fn send_frame(&mut self, command: Option<u16>, payload: Vec<u8>) -> u8 {
        self.seq = self.seq.wrapping_add(1);
        let app_seq = match command {
            Some(c) if registry().has_app_sequence(c) => {
                self.app_seq = self.app_seq.wrapping_add(1);
                Some(self.app_seq)
            }
            _ => None,
        };
        let frame = Frame {
            sender_seq: self.seq,
            receiver_seq: self.last_server_seq,
            command,
            app_seq,
            payload,
        };
        let mut inner = frame.encode();
        if let Some(cipher) = &self.send_cipher {
            inner = cipher.encrypt(&inner);
        }
        let packet = framing::envelope(&[], &inner);
        self.write.write_all(&packet).await.expect("write failed");
        self.seq
    }

    /// Send a typed message.
    pub async fn send_message(&mut self, message: &Message) -> u8 {
        let mut writer = PayloadWriter::new();
        message.encode_payload(&mut writer).expect("encode failed");
        self.send_frame(message.command_code(), writer.into_vec()).await
    }

    /// Send an empty-payload SimpleAck.
    pub async fn ack(&mut self) -> u8 {
        self.send_frame(None, Vec::new()).await
    }
}
