//! Handshake pattern: mutual capability exchange and directional keying.
//!
//! Four phases, each bracketed by a command/response/ack step:
//!
//! | Phase | Dir | Content         | Side effect                           |
//! |-------|-----|-----------------|---------------------------------------|
//! | A     | in  | `OpenSession`   | select scheme, instantiate crypto     |
//! | B     | out | `OpenSession`   | mirror capabilities (app_seq++)       |
//! | C     | in  | `RequestAccess` | derive + activate the outbound key    |
//! | D     | out | `RequestAccess` | derive + activate the inbound key     |
//!
//! Both activations are one-way; after D all traffic is encrypted. Any
//! abort disposes the crypto and tears the session down.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::IntegrationConfig;
use crate::crypto::{SchemeKeys, Type1Keys, Type2Keys, SCHEME_TYPE1, SCHEME_TYPE2};
use crate::error::{CryptoError, Error, Result};
use crate::protocol::{
    Command, CommandResponse, Envelope, Message, OpenSession, RequestAccess, ResponseCode,
    SimpleAck,
};

use super::transaction::{Transaction, TxnState};
use super::SessionCore;

/// Device type the gateway reports in its mirrored `OpenSession`.
const GATEWAY_DEVICE_TYPE: u8 = 0xF0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Panel must ack our response to its `OpenSession`.
    AwaitAckA,
    /// Panel must answer our mirrored `OpenSession`.
    AwaitResponseB,
    /// Panel must send its `RequestAccess` initializer.
    AwaitRequestAccess,
    /// Panel must ack our response to its `RequestAccess`.
    AwaitAckC,
    /// Panel must answer our own `RequestAccess`.
    AwaitResponseD,
}

pub(crate) struct HandshakeTransaction {
    state: TxnState,
    phase: Option<Phase>,
    integration: Arc<IntegrationConfig>,
    keys: Option<SchemeKeys>,
    panel_open: Option<OpenSession>,
    finished: bool,
}

impl HandshakeTransaction {
    pub fn new(cancel: CancellationToken, integration: Arc<IntegrationConfig>) -> Self {
        Self {
            state: TxnState::new(cancel),
            phase: None,
            integration,
            keys: None,
            panel_open: None,
            finished: false,
        }
    }

    fn keys_for_scheme(&self, scheme: u8) -> Result<SchemeKeys> {
        match scheme {
            SCHEME_TYPE1 => {
                let (Some(iac), Some(iin)) = (
                    self.integration.access_code_type1.as_deref(),
                    self.integration.identification_number.as_deref(),
                ) else {
                    return Err(Error::Config(
                        "panel requested Type 1 keying but no Type 1 secrets are configured"
                            .into(),
                    ));
                };
                Ok(SchemeKeys::Type1(Type1Keys::new(iac, iin)?))
            }
            SCHEME_TYPE2 => {
                let Some(iac) = self.integration.access_code_type2.as_deref() else {
                    return Err(Error::Config(
                        "panel requested Type 2 keying but no Type 2 secret is configured"
                            .into(),
                    ));
                };
                Ok(SchemeKeys::Type2(Type2Keys::new(iac)?))
            }
            other => Err(Error::Crypto(CryptoError::UnsupportedScheme(other))),
        }
    }

    fn keys(&self) -> Result<&SchemeKeys> {
        self.keys
            .as_ref()
            .ok_or_else(|| Error::NotSupported("handshake crypto not instantiated".into()))
    }
}

#[async_trait]
impl Transaction for HandshakeTransaction {
    async fn begin_inbound(&mut self, core: &mut SessionCore, env: &Envelope) -> Result<()> {
        let Message::OpenSession(open) = &env.message else {
            return Err(Error::NotSupported(
                "handshake pattern requires OpenSession".into(),
            ));
        };
        debug!(
            scheme = open.encryption,
            device_type = open.device_type,
            protocol = open.protocol_version,
            "panel opened session"
        );
        self.keys = Some(self.keys_for_scheme(open.encryption)?);
        self.panel_open = Some(*open);

        let response = CommandResponse {
            request: Command::OpenSession.as_u16(),
            code: ResponseCode::Success,
        };
        self.state.local_seq = core.send_message(&response.into()).await?;
        self.phase = Some(Phase::AwaitAckA);
        Ok(())
    }

    async fn begin_outbound(&mut self, _core: &mut SessionCore, _message: Message) -> Result<()> {
        Err(Error::NotSupported(
            "handshake is initiated by the panel".into(),
        ))
    }

    async fn try_continue(&mut self, core: &mut SessionCore, env: &Envelope) -> Result<bool> {
        if !self.can_continue() {
            return Ok(false);
        }

        // Phase C opens a fresh correlation window: the panel initiates with
        // a new frame, so the expected command refines the predicate.
        if self.phase == Some(Phase::AwaitRequestAccess) {
            let Message::RequestAccess(access) = &env.message else {
                return Ok(false);
            };
            let outbound = self.keys()?.outbound_from_initializer(&access.initializer)?;
            core.activate_send(outbound);
            debug!("outbound encryption active");

            let response = CommandResponse {
                request: Command::RequestAccess.as_u16(),
                code: ResponseCode::Success,
            };
            self.state.local_seq = core.send_message(&response.into()).await?;
            self.phase = Some(Phase::AwaitAckC);
            return Ok(true);
        }

        if !self.state.reply_correlates(env) {
            return Ok(false);
        }
        match (self.phase, &env.message) {
            (Some(Phase::AwaitAckA), Message::SimpleAck(_)) => {
                // Phase B: mirror capabilities back.
                let Some(panel) = self.panel_open else {
                    return Err(Error::NotSupported("handshake state lost".into()));
                };
                let mirror = OpenSession {
                    device_type: GATEWAY_DEVICE_TYPE,
                    encryption: panel.encryption,
                    protocol_version: panel.protocol_version,
                    software_version: crate::GATEWAY_SOFTWARE_VERSION,
                    device_id: panel.device_id,
                };
                self.state.local_seq = core.send_message(&mirror.into()).await?;
                self.phase = Some(Phase::AwaitResponseB);
                Ok(true)
            }
            (Some(Phase::AwaitResponseB), Message::CommandResponse(response)) => {
                if !response.code.is_success() {
                    warn!(code = ?response.code, "panel answered mirrored OpenSession with non-success");
                }
                core.send_message(&Message::SimpleAck(SimpleAck)).await?;
                self.phase = Some(Phase::AwaitRequestAccess);
                Ok(true)
            }
            (Some(Phase::AwaitAckC), Message::SimpleAck(_)) => {
                // Phase D: activate inbound before the panel learns the key,
                // then announce it.
                let inbound = self.keys()?.new_inbound()?;
                core.activate_recv(inbound.cipher);
                debug!("inbound encryption active");

                let access = RequestAccess {
                    initializer: inbound.wire,
                };
                self.state.local_seq = core.send_message(&access.into()).await?;
                self.phase = Some(Phase::AwaitResponseD);
                Ok(true)
            }
            (Some(Phase::AwaitResponseD), Message::CommandResponse(response)) => {
                if !response.code.is_success() {
                    warn!(code = ?response.code, "panel answered RequestAccess with non-success");
                }
                core.send_message(&Message::SimpleAck(SimpleAck)).await?;
                self.finished = true;
                self.state.complete();
                info!("handshake complete; session encrypted both ways");
                Ok(true)
            }
            (_, other) => Err(Error::UnexpectedResponse {
                expected: "handshake continuation",
                got: other.name(),
            }),
        }
    }

    fn fail(&mut self, _error: Error) {
        // No initiator to notify; key material in the session core is
        // disposed by the teardown that follows every handshake abort.
        self.keys = None;
        self.state.abort();
    }

    fn can_continue(&self) -> bool {
        !self.state.is_done()
    }

    fn cancel_token(&self) -> CancellationToken {
        self.state.cancel.clone()
    }

    fn is_handshake(&self) -> bool {
        true
    }

    fn handshake_complete(&self) -> bool {
        self.finished
    }
}
