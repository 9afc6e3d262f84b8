//! Transaction base: a short-lived state machine owning a temporarily
//! exclusive correlation window over 2-3 frames.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::config::IntegrationConfig;
use crate::error::{Error, Result};
use crate::protocol::{Envelope, ResponseCode, TransactionKind};

use super::command_response::CommandResponseTransaction;
use super::handshake::HandshakeTransaction;
use super::simple_ack::SimpleAckTransaction;
use super::SessionCore;

/// What an outbound initiation resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// The panel acknowledged the message.
    Acked,
    /// The panel rejected the message with a `CommandError`. Logged and
    /// surfaced; never retried.
    Nacked(u8),
    /// The panel answered with a `CommandResponse`. The code is preserved
    /// whether or not it is `Success`.
    Response(ResponseCode),
}

/// Channel resolving an outbound initiation.
pub(crate) type Completion = oneshot::Sender<Result<SendOutcome>>;

/// Sequence capture and terminal-state bookkeeping shared by every pattern.
#[derive(Debug)]
pub(crate) struct TxnState {
    /// Last local sequence this transaction put on the wire.
    pub local_seq: u8,
    /// Timeout source; linked under the session shutdown token so firing
    /// shutdown cancels all transactions transitively.
    pub cancel: CancellationToken,
    done: bool,
    aborted: bool,
}

impl TxnState {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            local_seq: 0,
            cancel,
            done: false,
            aborted: false,
        }
    }

    /// A reply to a frame we sent correlates on our captured sequence.
    pub fn reply_correlates(&self, env: &Envelope) -> bool {
        env.receiver_seq == self.local_seq
    }

    pub fn complete(&mut self) {
        if !self.done {
            self.done = true;
            self.cancel.cancel();
        }
    }

    /// Idempotent: the second and later calls are no-ops.
    pub fn abort(&mut self) {
        if !self.done {
            self.done = true;
            self.aborted = true;
            self.cancel.cancel();
        }
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }
}

/// One active transaction pattern.
///
/// All methods run under the session's exclusive lock; sub-steps within one
/// transaction are strictly serial.
#[async_trait]
pub(crate) trait Transaction: Send {
    /// The remote sent the first message; typically replies immediately.
    async fn begin_inbound(&mut self, core: &mut SessionCore, env: &Envelope) -> Result<()>;

    /// The server sends the first message and waits for the remote.
    async fn begin_outbound(&mut self, core: &mut SessionCore, message: crate::protocol::Message)
        -> Result<()>;

    /// Offer a decoded inbound message. Returns `true` when the message
    /// correlated and advanced this state machine; `false` hands it to the
    /// next transaction (or the new-inbound path).
    async fn try_continue(&mut self, core: &mut SessionCore, env: &Envelope) -> Result<bool>;

    /// Terminate with an error, resolving any waiting initiator.
    fn fail(&mut self, error: Error);

    /// Cancel and discard; idempotent.
    fn abort(&mut self) {
        self.fail(Error::Cancelled);
    }

    /// False once terminal or cancelled.
    fn can_continue(&self) -> bool;

    /// Token armed against the transaction timeout.
    fn cancel_token(&self) -> CancellationToken;

    fn is_handshake(&self) -> bool {
        false
    }

    /// True only for a handshake that ran to completion.
    fn handshake_complete(&self) -> bool {
        false
    }
}

/// A transaction in the session's active list.
pub(crate) struct ActiveTransaction {
    pub id: u64,
    pub txn: Box<dyn Transaction>,
}

/// Construct the registered pattern for a message.
pub(crate) fn make_transaction(
    kind: TransactionKind,
    cancel: CancellationToken,
    completion: Option<Completion>,
    integration: Arc<IntegrationConfig>,
) -> Box<dyn Transaction> {
    match kind {
        TransactionKind::SimpleAck => Box::new(SimpleAckTransaction::new(cancel, completion)),
        TransactionKind::CommandResponse => {
            Box::new(CommandResponseTransaction::new(cancel, completion))
        }
        TransactionKind::Handshake => Box::new(HandshakeTransaction::new(cancel, integration)),
    }
}
