//! SimpleAck pattern: a data message answered by an empty-payload ack.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::protocol::{Envelope, Message, SimpleAck};

use super::transaction::{Completion, SendOutcome, Transaction, TxnState};
use super::SessionCore;

pub(crate) struct SimpleAckTransaction {
    state: TxnState,
    awaiting_ack: bool,
    completion: Option<Completion>,
}

impl SimpleAckTransaction {
    pub fn new(cancel: CancellationToken, completion: Option<Completion>) -> Self {
        Self {
            state: TxnState::new(cancel),
            awaiting_ack: false,
            completion,
        }
    }

    fn resolve(&mut self, outcome: SendOutcome) {
        if let Some(tx) = self.completion.take() {
            let _ = tx.send(Ok(outcome));
        }
    }
}

#[async_trait]
impl Transaction for SimpleAckTransaction {
    async fn begin_inbound(&mut self, core: &mut SessionCore, _env: &Envelope) -> Result<()> {
        // Receive data message, acknowledge, done.
        core.send_message(&Message::SimpleAck(SimpleAck)).await?;
        self.state.complete();
        Ok(())
    }

    async fn begin_outbound(&mut self, core: &mut SessionCore, message: Message) -> Result<()> {
        self.state.local_seq = core.send_message(&message).await?;
        self.awaiting_ack = true;
        Ok(())
    }

    async fn try_continue(&mut self, _core: &mut SessionCore, env: &Envelope) -> Result<bool> {
        if !self.can_continue() || !self.awaiting_ack || !self.state.reply_correlates(env) {
            return Ok(false);
        }
        match &env.message {
            Message::SimpleAck(_) => {
                self.state.complete();
                self.resolve(SendOutcome::Acked);
                Ok(true)
            }
            Message::CommandError(nack) => {
                // NACK: surfaced to the initiator, never retried.
                warn!(request = nack.request, code = nack.code, "panel rejected command");
                self.state.complete();
                self.resolve(SendOutcome::Nacked(nack.code));
                Ok(true)
            }
            other => {
                // Correlated but wrong type: abort; the caller routes the
                // message through the normal inbound path instead.
                debug!(got = other.name(), "unexpected reply to data message; aborting");
                self.fail(Error::UnexpectedResponse {
                    expected: "SimpleAck",
                    got: other.name(),
                });
                Err(Error::UnexpectedResponse {
                    expected: "SimpleAck",
                    got: other.name(),
                })
            }
        }
    }

    fn fail(&mut self, error: Error) {
        if self.state.is_done() {
            return;
        }
        if let Some(tx) = self.completion.take() {
            let _ = tx.send(Err(error));
        }
        self.state.abort();
    }

    fn can_continue(&self) -> bool {
        !self.state.is_done()
    }

    fn cancel_token(&self) -> CancellationToken {
        self.state.cancel.clone()
    }
}
