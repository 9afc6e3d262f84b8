//! Static message registry: command code ↔ message type ↔ transaction
//! pattern ↔ app-sequence flag.
//!
//! Built once at first use; duplicate command codes are a programming error
//! and abort the process at startup. Lookups are read-only afterwards.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::codec::{PayloadCodec, PayloadReader};
use crate::error::CodecError;

use super::messages::{
    CommandError, CommandResponse, ConnectionPoll, Message, OpenSession,
    PartitionStatusNotification, RequestAccess, SoftwareVersionRequest, SoftwareVersionResponse,
    ZoneStatusNotification,
};
use super::Command;

/// Which transaction state machine governs a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionKind {
    SimpleAck,
    CommandResponse,
    Handshake,
}

/// Registry row for one message type.
pub struct MessageSpec {
    pub command: Command,
    pub name: &'static str,
    /// Whether frames of this command carry the application sequence byte.
    pub app_sequence: bool,
    pub pattern: TransactionKind,
    pub decode: fn(&mut PayloadReader<'_>) -> Result<Message, CodecError>,
}

fn decode_into<T>(r: &mut PayloadReader<'_>) -> Result<Message, CodecError>
where
    T: PayloadCodec + Into<Message>,
{
    Ok(T::decode_payload(r)?.into())
}

static SPECS: &[MessageSpec] = &[
    MessageSpec {
        command: Command::CommandResponse,
        name: "CommandResponse",
        app_sequence: false,
        pattern: TransactionKind::SimpleAck,
        decode: decode_into::<CommandResponse>,
    },
    MessageSpec {
        command: Command::CommandError,
        name: "CommandError",
        app_sequence: false,
        pattern: TransactionKind::SimpleAck,
        decode: decode_into::<CommandError>,
    },
    MessageSpec {
        command: Command::SoftwareVersionRequest,
        name: "SoftwareVersionRequest",
        app_sequence: false,
        pattern: TransactionKind::CommandResponse,
        decode: decode_into::<SoftwareVersionRequest>,
    },
    MessageSpec {
        command: Command::SoftwareVersionResponse,
        name: "SoftwareVersionResponse",
        app_sequence: false,
        pattern: TransactionKind::SimpleAck,
        decode: decode_into::<SoftwareVersionResponse>,
    },
    MessageSpec {
        command: Command::ConnectionPoll,
        name: "ConnectionPoll",
        app_sequence: false,
        pattern: TransactionKind::SimpleAck,
        decode: decode_into::<ConnectionPoll>,
    },
    MessageSpec {
        command: Command::OpenSession,
        name: "OpenSession",
        app_sequence: true,
        pattern: TransactionKind::Handshake,
        decode: decode_into::<OpenSession>,
    },
    MessageSpec {
        command: Command::RequestAccess,
        name: "RequestAccess",
        app_sequence: false,
        pattern: TransactionKind::CommandResponse,
        decode: decode_into::<RequestAccess>,
    },
    MessageSpec {
        command: Command::ZoneStatus,
        name: "ZoneStatus",
        app_sequence: true,
        pattern: TransactionKind::SimpleAck,
        decode: decode_into::<ZoneStatusNotification>,
    },
    MessageSpec {
        command: Command::PartitionStatus,
        name: "PartitionStatus",
        app_sequence: true,
        pattern: TransactionKind::SimpleAck,
        decode: decode_into::<PartitionStatusNotification>,
    },
];

/// Command-indexed view over [`MessageSpec`] rows.
pub struct MessageRegistry {
    by_command: HashMap<u16, &'static MessageSpec>,
}

impl MessageRegistry {
    fn build(specs: &'static [MessageSpec]) -> Self {
        let mut by_command = HashMap::with_capacity(specs.len());
        for spec in specs {
            let code = spec.command.as_u16();
            if by_command.insert(code, spec).is_some() {
                panic!("duplicate command code 0x{code:04x} in message registry");
            }
        }
        Self { by_command }
    }

    pub fn lookup(&self, command: u16) -> Option<&'static MessageSpec> {
        self.by_command.get(&command).copied()
    }

    pub fn has_app_sequence(&self, command: u16) -> bool {
        self.lookup(command).is_some_and(|s| s.app_sequence)
    }

    /// Decode a payload for a command code. Unknown codes never fail: they
    /// produce [`Message::Unknown`] with the raw payload attached.
    pub fn decode(&self, command: u16, payload: &[u8]) -> Result<Message, CodecError> {
        match self.lookup(command) {
            Some(spec) => {
                let mut reader = PayloadReader::new(payload);
                (spec.decode)(&mut reader)
            }
            None => Ok(Message::Unknown {
                command,
                bytes: payload.to_vec(),
            }),
        }
    }

    /// Transaction pattern governing a message when it starts a new inbound
    /// transaction. Unknown messages are acknowledged and passed upward.
    pub fn pattern_for(&self, message: &Message) -> TransactionKind {
        message
            .command_code()
            .and_then(|c| self.lookup(c))
            .map_or(TransactionKind::SimpleAck, |s| s.pattern)
    }
}

static REGISTRY: Lazy<MessageRegistry> = Lazy::new(|| MessageRegistry::build(SPECS));

/// The process-wide registry.
pub fn registry() -> &'static MessageRegistry {
    &REGISTRY
}
