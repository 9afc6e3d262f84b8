//! ITv2 wire protocol: framing, inner frames, typed messages, registry.

pub mod frame;
pub mod framing;
pub mod messages;
pub mod registry;

pub use frame::Frame;
pub use messages::{
    CommandError, CommandResponse, ConnectionPoll, Envelope, Message, OpenSession,
    PartitionStatus, PartitionStatusNotification, RequestAccess, ResponseCode, SimpleAck,
    SoftwareVersionRequest, SoftwareVersionResponse, ZoneStatus, ZoneStatusNotification,
};
pub use registry::{registry, MessageRegistry, MessageSpec, TransactionKind};

/// Escape byte protecting the reserved wire bytes.
pub const ESCAPE: u8 = 0x7D;

/// Delimiter separating the optional packet header from the body.
pub const HEADER_DELIMITER: u8 = 0x7E;

/// Terminator closing every packet on the stream.
pub const PACKET_TERMINATOR: u8 = 0x7F;

/// Command code carried big-endian after the sequence bytes.
///
/// The set is closed on the send side; unknown codes on the receive side
/// decode into [`Message::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Command {
    CommandResponse = 0x0002,
    CommandError = 0x0003,
    SoftwareVersionRequest = 0x0004,
    SoftwareVersionResponse = 0x0005,
    ConnectionPoll = 0x000A,
    OpenSession = 0x060A,
    RequestAccess = 0x060C,
    ZoneStatus = 0x0841,
    PartitionStatus = 0x0842,
}

impl Command {
    pub fn from_u16(v: u16) -> Option<Self> {
        match v {
            0x0002 => Some(Self::CommandResponse),
            0x0003 => Some(Self::CommandError),
            0x0004 => Some(Self::SoftwareVersionRequest),
            0x0005 => Some(Self::SoftwareVersionResponse),
            0x000A => Some(Self::ConnectionPoll),
            0x060A => Some(Self::OpenSession),
            0x060C => Some(Self::RequestAccess),
            0x0841 => Some(Self::ZoneStatus),
            0x0842 => Some(Self::PartitionStatus),
            _ => None,
        }
    }

    pub fn as_u16(self) -> u16 {
        self as u16
    }
}
