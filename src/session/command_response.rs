//! CommandResponse pattern: a command answered by a coded response, closed
//! by an ack.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::protocol::{CommandResponse, Envelope, Message, ResponseCode, SimpleAck};

use super::transaction::{Completion, SendOutcome, Transaction, TxnState};
use super::SessionCore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Inbound: we answered the panel's command, waiting for its ack.
    AwaitPanelAck,
    /// Outbound: we sent a command, waiting for the panel's response.
    AwaitResponse,
}

pub(crate) struct CommandResponseTransaction {
    state: TxnState,
    phase: Option<Phase>,
    completion: Option<Completion>,
}

impl CommandResponseTransaction {
    pub fn new(cancel: CancellationToken, completion: Option<Completion>) -> Self {
        Self {
            state: TxnState::new(cancel),
            phase: None,
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
impl Transaction for CommandResponseTransaction {
    async fn begin_inbound(&mut self, core: &mut SessionCore, env: &Envelope) -> Result<()> {
        let request = env.message.command_code().ok_or_else(|| {
            Error::NotSupported("command-response pattern requires a command word".into())
        })?;
        let response = CommandResponse {
            request,
            code: ResponseCode::Success,
        };
        self.state.local_seq = core.send_message(&response.into()).await?;
        self.phase = Some(Phase::AwaitPanelAck);
        Ok(())
    }

    async fn begin_outbound(&mut self, core: &mut SessionCore, message: Message) -> Result<()> {
        self.state.local_seq = core.send_message(&message).await?;
        self.phase = Some(Phase::AwaitResponse);
        Ok(())
    }

    async fn try_continue(&mut self, core: &mut SessionCore, env: &Envelope) -> Result<bool> {
        if !self.can_continue() || !self.state.reply_correlates(env) {
            return Ok(false);
        }
        match (self.phase, &env.message) {
            (Some(Phase::AwaitPanelAck), Message::SimpleAck(_)) => {
                self.state.complete();
                Ok(true)
            }
            (Some(Phase::AwaitResponse), Message::CommandResponse(response)) => {
                // The code is informational; the closing ack goes out either way.
                if !response.code.is_success() {
                    debug!(code = ?response.code, "panel response carries non-success code");
                }
                core.send_message(&Message::SimpleAck(SimpleAck)).await?;
                self.state.complete();
                self.resolve(SendOutcome::Response(response.code));
                Ok(true)
            }
            (Some(Phase::AwaitResponse), Message::CommandError(nack)) => {
                warn!(request = nack.request, code = nack.code, "panel rejected command");
                self.state.complete();
                self.resolve(SendOutcome::Nacked(nack.code));
                Ok(true)
            }
            (_, other) => {
                debug!(got = other.name(), "unexpected message in command-response window; aborting");
                self.fail(Error::UnexpectedResponse {
                    expected: "CommandResponse",
                    got: other.name(),
                });
                Err(Error::UnexpectedResponse {
                    expected: "CommandResponse",
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
