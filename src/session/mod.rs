//! Per-connection session: sequence counters, encryption state, active
//! transactions, heartbeat, shutdown.
//!
//! A single exclusive lock serialises every state mutation. Two logical
//! entry points compete for it: the listen loop delivering decoded inbound
//! messages, and the public send API initiating outbound transactions.

mod command_response;
mod handshake;
mod simple_ack;
mod transaction;

pub use transaction::SendOutcome;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::config::{IntegrationConfig, TimingConfig};
use crate::crypto::FrameCipher;
use crate::error::{Error, Result};
use crate::protocol::{framing, registry, Envelope, Frame, Message, TransactionKind};
use crate::transport::{split_stream, PacketReader, PacketWriter};
use crate::types::{SessionId, SessionStats};

use transaction::{make_transaction, ActiveTransaction, Completion};

/// One decoded inbound message, published upward on the notification
/// channel.
#[derive(Debug, Clone)]
pub struct PanelEvent {
    pub session_id: SessionId,
    pub received_at: SystemTime,
    pub message: Message,
}

#[derive(Debug, Default)]
struct SessionCounters {
    frames_in: AtomicU64,
    frames_out: AtomicU64,
    packets_dropped: AtomicU64,
    transactions_aborted: AtomicU64,
}

/// Frame serializer over the write half, encrypting once outbound keying
/// is active.
pub(crate) struct FrameWriter {
    pipe: PacketWriter,
    cipher: Option<FrameCipher>,
}

impl FrameWriter {
    async fn send_frame(&mut self, frame: &Frame) -> Result<()> {
        let mut inner = frame.encode();
        if let Some(cipher) = &self.cipher {
            inner = cipher.encrypt(&inner);
        }
        let packet = framing::envelope(&[], &inner);
        self.pipe.write_packet(&packet).await
    }
}

/// Lock-protected heart of a session: counters, crypto, and the writer.
/// Transactions mutate it while stepping.
pub(crate) struct SessionCore {
    local_seq: u8,
    remote_seq: u8,
    app_seq: u8,
    writer: FrameWriter,
    recv_cipher: Option<FrameCipher>,
    counters: Arc<SessionCounters>,
}

impl SessionCore {
    fn next_local_seq(&mut self) -> u8 {
        self.local_seq = self.local_seq.wrapping_add(1);
        self.local_seq
    }

    fn next_app_seq(&mut self) -> u8 {
        self.app_seq = self.app_seq.wrapping_add(1);
        self.app_seq
    }

    pub(crate) fn local_seq(&self) -> u8 {
        self.local_seq
    }

    /// Track the panel's counters from a decoded frame.
    fn observe_remote(&mut self, env: &Envelope) {
        self.remote_seq = env.sender_seq;
        if let Some(app) = env.app_seq {
            self.app_seq = app;
        }
    }

    /// Envelope and send one message, allocating the transport sequence and
    /// (when the command is flagged) the application sequence.
    pub(crate) async fn send_message(&mut self, message: &Message) -> Result<u8> {
        let local = self.next_local_seq();
        let (command, app_seq) = match message.command_code() {
            None => (None, None),
            Some(command) => {
                let app = registry()
                    .has_app_sequence(command)
                    .then(|| self.next_app_seq());
                (Some(command), app)
            }
        };
        let mut writer = crate::codec::PayloadWriter::new();
        message.encode_payload(&mut writer)?;
        let frame = Frame {
            sender_seq: local,
            receiver_seq: self.remote_seq,
            command,
            app_seq,
            payload: writer.into_vec(),
        };
        trace!(
            message = message.name(),
            sender_seq = local,
            receiver_seq = self.remote_seq,
            "sending frame"
        );
        self.writer.send_frame(&frame).await?;
        self.counters.frames_out.fetch_add(1, Ordering::Relaxed);
        Ok(local)
    }

    pub(crate) fn activate_send(&mut self, cipher: FrameCipher) {
        self.writer.cipher = Some(cipher);
    }

    pub(crate) fn activate_recv(&mut self, cipher: FrameCipher) {
        self.recv_cipher = Some(cipher);
    }

    fn clear_crypto(&mut self) {
        self.writer.cipher = None;
        self.recv_cipher = None;
    }
}

struct SessionState {
    core: SessionCore,
    transactions: Vec<ActiveTransaction>,
}

/// One panel connection.
pub struct Session {
    id: SessionId,
    peer: Option<SocketAddr>,
    shutdown: CancellationToken,
    timing: TimingConfig,
    integration: Arc<IntegrationConfig>,
    state: Mutex<SessionState>,
    events: mpsc::Sender<PanelEvent>,
    counters: Arc<SessionCounters>,
    next_txn_id: AtomicU64,
    heartbeat_started: AtomicBool,
    reader: std::sync::Mutex<Option<PacketReader>>,
}

impl Session {
    /// Attach a session to a connected duplex stream. The caller spawns
    /// [`Session::run`] to drive it.
    pub fn attach(
        stream: impl AsyncRead + AsyncWrite + Send + 'static,
        peer: Option<SocketAddr>,
        timing: TimingConfig,
        integration: Arc<IntegrationConfig>,
        events: mpsc::Sender<PanelEvent>,
        parent_shutdown: &CancellationToken,
    ) -> Arc<Self> {
        let (reader, writer) = split_stream(stream);
        let counters = Arc::new(SessionCounters::default());
        Arc::new(Self {
            id: SessionId::generate(),
            peer,
            shutdown: parent_shutdown.child_token(),
            timing,
            integration,
            state: Mutex::new(SessionState {
                core: SessionCore {
                    local_seq: 0,
                    remote_seq: 0,
                    app_seq: 0,
                    writer: FrameWriter {
                        pipe: writer,
                        cipher: None,
                    },
                    recv_cipher: None,
                    counters: Arc::clone(&counters),
                },
                transactions: Vec::new(),
            }),
            events,
            counters,
            next_txn_id: AtomicU64::new(1),
            heartbeat_started: AtomicBool::new(false),
            reader: std::sync::Mutex::new(Some(reader)),
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Request session termination.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            frames_in: self.counters.frames_in.load(Ordering::Relaxed),
            frames_out: self.counters.frames_out.load(Ordering::Relaxed),
            packets_dropped: self.counters.packets_dropped.load(Ordering::Relaxed),
            transactions_aborted: self.counters.transactions_aborted.load(Ordering::Relaxed),
        }
    }

    /// Drive the session until disconnect or shutdown.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let mut reader = self
            .reader
            .lock()
            .expect("reader mutex poisoned")
            .take()
            .ok_or_else(|| Error::NotSupported("session already running".into()))?;

        let result = self.listen(&mut reader).await;
        self.teardown().await;
        match result {
            Err(Error::Cancelled) => Ok(()),
            other => other,
        }
    }

    async fn listen(self: &Arc<Self>, reader: &mut PacketReader) -> Result<()> {
        loop {
            let packet = reader.read_packet(&self.shutdown).await?;
            if let Err(e) = self.process_packet(&packet).await {
                if e.is_fatal() {
                    return Err(e);
                }
                self.counters.packets_dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    session = %self.id,
                    error = %e,
                    packet = %hex::encode(&packet),
                    "dropping packet"
                );
            }
        }
    }

    async fn lock_state(&self) -> Result<MutexGuard<'_, SessionState>> {
        let timeout = self.timing.lock_timeout();
        tokio::time::timeout(timeout, self.state.lock())
            .await
            .map_err(|_| Error::Deadlock(timeout))
    }

    async fn process_packet(self: &Arc<Self>, packet: &[u8]) -> Result<()> {
        let mut state = self.lock_state().await?;

        let (_header, body) = framing::split_packet(packet)?;
        let inner = match &state.core.recv_cipher {
            Some(cipher) => cipher.decrypt(&body)?,
            None => body,
        };
        let frame = Frame::decode(&inner, |c| registry().has_app_sequence(c))?;
        let env = Envelope::from_frame(frame)?;
        self.counters.frames_in.fetch_add(1, Ordering::Relaxed);
        trace!(
            session = %self.id,
            message = env.message.name(),
            sender_seq = env.sender_seq,
            receiver_seq = env.receiver_seq,
            "frame received"
        );

        // Panels are lenient about the mirrored sequence; so are we.
        if env.receiver_seq != state.core.local_seq() {
            debug!(
                session = %self.id,
                expected = state.core.local_seq(),
                got = env.receiver_seq,
                "receiver sequence mismatch (tolerated)"
            );
        }
        state.core.observe_remote(&env);

        if self
            .events
            .try_send(PanelEvent {
                session_id: self.id,
                received_at: SystemTime::now(),
                message: env.message.clone(),
            })
            .is_err()
        {
            warn!(session = %self.id, "notification channel full; event dropped");
        }

        self.dispatch(&mut state, env).await
    }

    /// Offer the message to active transactions in insertion order; the
    /// first that takes it wins. Unclaimed non-reply messages open a new
    /// inbound transaction from their registered pattern.
    async fn dispatch(self: &Arc<Self>, state: &mut SessionState, env: Envelope) -> Result<()> {
        let mut transactions = std::mem::take(&mut state.transactions);
        let mut taken = false;
        let mut handshake_failed = false;

        for active in transactions.iter_mut() {
            match active.txn.try_continue(&mut state.core, &env).await {
                Ok(true) => {
                    taken = true;
                    break;
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(session = %self.id, txn = active.id, error = %e, "transaction aborted");
                    active.txn.abort();
                    self.counters
                        .transactions_aborted
                        .fetch_add(1, Ordering::Relaxed);
                    if active.txn.is_handshake() {
                        handshake_failed = true;
                    }
                }
            }
        }

        let mut handshake_done = false;
        transactions.retain(|active| {
            if active.txn.can_continue() {
                true
            } else {
                if active.txn.handshake_complete() {
                    handshake_done = true;
                }
                false
            }
        });
        state.transactions = transactions;

        if handshake_failed {
            error!(session = %self.id, "handshake aborted; terminating session");
            state.core.clear_crypto();
            self.shutdown.cancel();
            return Ok(());
        }

        if !taken {
            if env.message.is_reply() {
                debug!(
                    session = %self.id,
                    message = env.message.name(),
                    "stray reply correlates with no transaction"
                );
            } else {
                self.begin_inbound_transaction(state, &env).await;
            }
        }

        if handshake_done {
            self.start_heartbeat();
        }
        Ok(())
    }

    async fn begin_inbound_transaction(self: &Arc<Self>, state: &mut SessionState, env: &Envelope) {
        let kind = registry().pattern_for(&env.message);
        let cancel = self.shutdown.child_token();
        let mut txn = make_transaction(kind, cancel.clone(), None, Arc::clone(&self.integration));

        match txn.begin_inbound(&mut state.core, env).await {
            Ok(()) => {
                if txn.can_continue() {
                    let timeout = if txn.is_handshake() {
                        self.timing.handshake_timeout()
                    } else {
                        self.timing.transaction_timeout()
                    };
                    let id = self.next_txn_id.fetch_add(1, Ordering::Relaxed);
                    self.spawn_transaction_timer(id, cancel, timeout, txn.is_handshake());
                    state.transactions.push(ActiveTransaction { id, txn });
                }
            }
            Err(e) => {
                let fatal = txn.is_handshake();
                txn.abort();
                self.counters
                    .transactions_aborted
                    .fetch_add(1, Ordering::Relaxed);
                if fatal {
                    error!(session = %self.id, error = %e, "handshake failed; terminating session");
                    state.core.clear_crypto();
                    self.shutdown.cancel();
                } else {
                    warn!(
                        session = %self.id,
                        message = env.message.name(),
                        error = %e,
                        "inbound transaction failed to begin"
                    );
                }
            }
        }
    }

    /// Initiate an outbound command and wait for its completion.
    ///
    /// Resolves with the panel's response code for command-response
    /// patterns, or acknowledgment for simple-ack patterns.
    pub async fn send_command(self: &Arc<Self>, message: Message) -> Result<SendOutcome> {
        if message.is_reply() {
            return Err(Error::NotSupported(
                "replies cannot initiate a transaction".into(),
            ));
        }
        let kind = registry().pattern_for(&message);
        if kind == TransactionKind::Handshake {
            return Err(Error::NotSupported(
                "the handshake is initiated by the panel".into(),
            ));
        }

        let (tx, rx): (Completion, oneshot::Receiver<Result<SendOutcome>>) = oneshot::channel();
        {
            let mut state = self.lock_state().await?;
            let cancel = self.shutdown.child_token();
            let mut txn =
                make_transaction(kind, cancel.clone(), Some(tx), Arc::clone(&self.integration));
            txn.begin_outbound(&mut state.core, message).await?;
            if txn.can_continue() {
                let id = self.next_txn_id.fetch_add(1, Ordering::Relaxed);
                self.spawn_transaction_timer(id, cancel, self.timing.transaction_timeout(), false);
                state.transactions.push(ActiveTransaction { id, txn });
            }
        }

        match rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(Error::Cancelled),
        }
    }

    fn spawn_transaction_timer(
        self: &Arc<Self>,
        id: u64,
        cancel: CancellationToken,
        timeout: Duration,
        handshake: bool,
    ) {
        let session = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                () = cancel.cancelled() => {}
                () = tokio::time::sleep(timeout) => {
                    session.expire_transaction(id, handshake).await;
                }
            }
        });
    }

    async fn expire_transaction(&self, id: u64, handshake: bool) {
        let mut state = match self.lock_state().await {
            Ok(state) => state,
            Err(e) => {
                error!(session = %self.id, error = %e, "lock timeout expiring transaction");
                self.shutdown.cancel();
                return;
            }
        };
        let Some(pos) = state.transactions.iter().position(|t| t.id == id) else {
            return;
        };
        let mut active = state.transactions.remove(pos);
        warn!(session = %self.id, txn = id, "transaction timed out");
        active.txn.fail(Error::Timeout);
        self.counters
            .transactions_aborted
            .fetch_add(1, Ordering::Relaxed);
        if handshake {
            state.core.clear_crypto();
            drop(state);
            self.shutdown.cancel();
        }
    }

    /// Post-handshake keep-alive: one software version probe, then periodic
    /// connection polls until shutdown. Heartbeats are ordinary
    /// transactions, sequenced and encrypted like everything else.
    fn start_heartbeat(self: &Arc<Self>) {
        if self.heartbeat_started.swap(true, Ordering::SeqCst) {
            return;
        }
        let session = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                () = session.shutdown.cancelled() => return,
                () = tokio::time::sleep(session.timing.version_probe_delay()) => {}
            }
            match session
                .send_command(Message::SoftwareVersionRequest(
                    crate::protocol::SoftwareVersionRequest,
                ))
                .await
            {
                Ok(outcome) => debug!(session = %session.id, ?outcome, "version probe answered"),
                Err(e) => warn!(session = %session.id, error = %e, "version probe failed"),
            }

            let mut ticker = tokio::time::interval(session.timing.poll_interval());
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await; // the first tick fires immediately
            loop {
                tokio::select! {
                    () = session.shutdown.cancelled() => return,
                    _ = ticker.tick() => {}
                }
                match session
                    .send_command(Message::ConnectionPoll(crate::protocol::ConnectionPoll))
                    .await
                {
                    Ok(_) => trace!(session = %session.id, "poll acknowledged"),
                    Err(e) => warn!(session = %session.id, error = %e, "connection poll failed"),
                }
            }
        });
    }

    /// Cancel the token, abort remaining transactions best-effort, and
    /// dispose key material.
    async fn teardown(&self) {
        self.shutdown.cancel();
        let grabbed = tokio::time::timeout(Duration::from_secs(1), self.state.lock()).await;
        if let Ok(mut state) = grabbed {
            for mut active in state.transactions.drain(..) {
                active.txn.abort();
                self.counters
                    .transactions_aborted
                    .fetch_add(1, Ordering::Relaxed);
            }
            state.core.clear_crypto();
        }
        info!(session = %self.id, peer = ?self.peer, stats = ?self.stats(), "session closed");
    }
}
