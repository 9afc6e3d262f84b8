//! Typed panel messages and the tagged union carried through the session.

use crate::codec::{PayloadCodec, PayloadReader, PayloadWriter, PrefixWidth};
use crate::error::CodecError;

use super::frame::Frame;
use super::registry;
use super::Command;

/// Panel reply code carried in [`CommandResponse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseCode {
    Success,
    InvalidCommand,
    SequenceError,
    NotAuthorized,
    Busy,
    Other(u8),
}

impl ResponseCode {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0x00 => Self::Success,
            0x01 => Self::InvalidCommand,
            0x02 => Self::SequenceError,
            0x21 => Self::NotAuthorized,
            0x22 => Self::Busy,
            other => Self::Other(other),
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Self::Success => 0x00,
            Self::InvalidCommand => 0x01,
            Self::SequenceError => 0x02,
            Self::NotAuthorized => 0x21,
            Self::Busy => 0x22,
            Self::Other(v) => v,
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Zone condition reported by [`ZoneStatusNotification`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneStatus {
    Secure,
    Open,
    Fault,
    Tamper,
    Bypassed,
    Other(u8),
}

impl ZoneStatus {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0x00 => Self::Secure,
            0x01 => Self::Open,
            0x02 => Self::Fault,
            0x03 => Self::Tamper,
            0x04 => Self::Bypassed,
            other => Self::Other(other),
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Self::Secure => 0x00,
            Self::Open => 0x01,
            Self::Fault => 0x02,
            Self::Tamper => 0x03,
            Self::Bypassed => 0x04,
            Self::Other(v) => v,
        }
    }
}

/// Partition condition reported by [`PartitionStatusNotification`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionStatus {
    Ready,
    NotReady,
    Armed,
    InAlarm,
    Disarmed,
    Other(u8),
}

impl PartitionStatus {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0x00 => Self::Ready,
            0x01 => Self::NotReady,
            0x02 => Self::Armed,
            0x03 => Self::InAlarm,
            0x04 => Self::Disarmed,
            other => Self::Other(other),
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Self::Ready => 0x00,
            Self::NotReady => 0x01,
            Self::Armed => 0x02,
            Self::InAlarm => 0x03,
            Self::Disarmed => 0x04,
            Self::Other(v) => v,
        }
    }
}

/// Empty-payload acknowledgment. Has no command word on the wire; it is
/// recognised by absence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimpleAck;

/// Positive or informational reply to a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandResponse {
    /// Command code being answered.
    pub request: u16,
    pub code: ResponseCode,
}

impl PayloadCodec for CommandResponse {
    fn encode_payload(&self, w: &mut PayloadWriter) -> Result<(), CodecError> {
        w.put_u16(self.request);
        w.put_u8(self.code.as_u8());
        Ok(())
    }

    fn decode_payload(r: &mut PayloadReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            request: r.read_u16("request")?,
            code: ResponseCode::from_u8(r.read_u8("code")?),
        })
    }
}

/// Hard rejection of a command (NACK).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandError {
    pub request: u16,
    pub code: u8,
}

impl PayloadCodec for CommandError {
    fn encode_payload(&self, w: &mut PayloadWriter) -> Result<(), CodecError> {
        w.put_u16(self.request);
        w.put_u8(self.code);
        Ok(())
    }

    fn decode_payload(r: &mut PayloadReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            request: r.read_u16("request")?,
            code: r.read_u8("code")?,
        })
    }
}

/// First handshake message. The panel announces itself and selects the
/// encryption scheme; the server mirrors its own capabilities back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenSession {
    pub device_type: u8,
    /// Key negotiation scheme selector (`0x01` or `0x02`).
    pub encryption: u8,
    pub protocol_version: u16,
    pub software_version: u16,
    pub device_id: [u8; 4],
}

impl PayloadCodec for OpenSession {
    fn encode_payload(&self, w: &mut PayloadWriter) -> Result<(), CodecError> {
        w.put_u8(self.device_type);
        w.put_u8(self.encryption);
        w.put_u16(self.protocol_version);
        w.put_u16(self.software_version);
        w.put_fixed(&self.device_id, 4);
        Ok(())
    }

    fn decode_payload(r: &mut PayloadReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            device_type: r.read_u8("device_type")?,
            encryption: r.read_u8("encryption")?,
            protocol_version: r.read_u16("protocol_version")?,
            software_version: r.read_u16("software_version")?,
            device_id: r.read_fixed("device_id")?,
        })
    }
}

/// Key-negotiation initializer, exchanged once per direction during the
/// handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestAccess {
    pub initializer: Vec<u8>,
}

impl PayloadCodec for RequestAccess {
    fn encode_payload(&self, w: &mut PayloadWriter) -> Result<(), CodecError> {
        w.put_prefixed("initializer", &self.initializer, PrefixWidth::One)
    }

    fn decode_payload(r: &mut PayloadReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            initializer: r.read_prefixed("initializer", PrefixWidth::One)?,
        })
    }
}

/// Heartbeat poll. Zero payload; answered with a SimpleAck.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionPoll;

impl PayloadCodec for ConnectionPoll {
    fn encode_payload(&self, _w: &mut PayloadWriter) -> Result<(), CodecError> {
        Ok(())
    }

    fn decode_payload(_r: &mut PayloadReader<'_>) -> Result<Self, CodecError> {
        Ok(Self)
    }
}

/// Software version probe sent once after the handshake settles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SoftwareVersionRequest;

impl PayloadCodec for SoftwareVersionRequest {
    fn encode_payload(&self, _w: &mut PayloadWriter) -> Result<(), CodecError> {
        Ok(())
    }

    fn decode_payload(_r: &mut PayloadReader<'_>) -> Result<Self, CodecError> {
        Ok(Self)
    }
}

/// Panel firmware identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoftwareVersionResponse {
    pub version: [u8; 8],
}

impl PayloadCodec for SoftwareVersionResponse {
    fn encode_payload(&self, w: &mut PayloadWriter) -> Result<(), CodecError> {
        w.put_fixed(&self.version, 8);
        Ok(())
    }

    fn decode_payload(r: &mut PayloadReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            version: r.read_fixed("version")?,
        })
    }
}

/// Zone state change pushed by the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoneStatusNotification {
    pub zone: u8,
    pub status: ZoneStatus,
}

impl PayloadCodec for ZoneStatusNotification {
    fn encode_payload(&self, w: &mut PayloadWriter) -> Result<(), CodecError> {
        w.put_compact_u8(self.zone);
        w.put_u8(self.status.as_u8());
        Ok(())
    }

    fn decode_payload(r: &mut PayloadReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            zone: r.read_compact_u8("zone")?,
            status: ZoneStatus::from_u8(r.read_u8("status")?),
        })
    }
}

/// Partition state change pushed by the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionStatusNotification {
    pub partition: u8,
    pub status: PartitionStatus,
}

impl PayloadCodec for PartitionStatusNotification {
    fn encode_payload(&self, w: &mut PayloadWriter) -> Result<(), CodecError> {
        w.put_compact_u8(self.partition);
        w.put_u8(self.status.as_u8());
        Ok(())
    }

    fn decode_payload(r: &mut PayloadReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            partition: r.read_compact_u8("partition")?,
            status: PartitionStatus::from_u8(r.read_u8("status")?),
        })
    }
}

/// Every message the session can carry, including the open-world fallback
/// for command codes the registry does not know.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    SimpleAck(SimpleAck),
    CommandResponse(CommandResponse),
    CommandError(CommandError),
    OpenSession(OpenSession),
    RequestAccess(RequestAccess),
    ConnectionPoll(ConnectionPoll),
    SoftwareVersionRequest(SoftwareVersionRequest),
    SoftwareVersionResponse(SoftwareVersionResponse),
    ZoneStatus(ZoneStatusNotification),
    PartitionStatus(PartitionStatusNotification),
    Unknown { command: u16, bytes: Vec<u8> },
}

impl Message {
    /// Command code on the wire. `None` for SimpleAck.
    pub fn command_code(&self) -> Option<u16> {
        match self {
            Self::SimpleAck(_) => None,
            Self::CommandResponse(_) => Some(Command::CommandResponse.as_u16()),
            Self::CommandError(_) => Some(Command::CommandError.as_u16()),
            Self::OpenSession(_) => Some(Command::OpenSession.as_u16()),
            Self::RequestAccess(_) => Some(Command::RequestAccess.as_u16()),
            Self::ConnectionPoll(_) => Some(Command::ConnectionPoll.as_u16()),
            Self::SoftwareVersionRequest(_) => Some(Command::SoftwareVersionRequest.as_u16()),
            Self::SoftwareVersionResponse(_) => Some(Command::SoftwareVersionResponse.as_u16()),
            Self::ZoneStatus(_) => Some(Command::ZoneStatus.as_u16()),
            Self::PartitionStatus(_) => Some(Command::PartitionStatus.as_u16()),
            Self::Unknown { command, .. } => Some(*command),
        }
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SimpleAck(_) => "SimpleAck",
            Self::CommandResponse(_) => "CommandResponse",
            Self::CommandError(_) => "CommandError",
            Self::OpenSession(_) => "OpenSession",
            Self::RequestAccess(_) => "RequestAccess",
            Self::ConnectionPoll(_) => "ConnectionPoll",
            Self::SoftwareVersionRequest(_) => "SoftwareVersionRequest",
            Self::SoftwareVersionResponse(_) => "SoftwareVersionResponse",
            Self::ZoneStatus(_) => "ZoneStatus",
            Self::PartitionStatus(_) => "PartitionStatus",
            Self::Unknown { .. } => "Unknown",
        }
    }

    /// True for replies that never open a transaction of their own.
    pub fn is_reply(&self) -> bool {
        matches!(
            self,
            Self::SimpleAck(_) | Self::CommandResponse(_) | Self::CommandError(_)
        )
    }

    pub fn encode_payload(&self, w: &mut PayloadWriter) -> Result<(), CodecError> {
        match self {
            Self::SimpleAck(_) => Ok(()),
            Self::CommandResponse(m) => m.encode_payload(w),
            Self::CommandError(m) => m.encode_payload(w),
            Self::OpenSession(m) => m.encode_payload(w),
            Self::RequestAccess(m) => m.encode_payload(w),
            Self::ConnectionPoll(m) => m.encode_payload(w),
            Self::SoftwareVersionRequest(m) => m.encode_payload(w),
            Self::SoftwareVersionResponse(m) => m.encode_payload(w),
            Self::ZoneStatus(m) => m.encode_payload(w),
            Self::PartitionStatus(m) => m.encode_payload(w),
            Self::Unknown { bytes, .. } => {
                w.put_fixed(bytes, bytes.len());
                Ok(())
            }
        }
    }
}

impl From<SimpleAck> for Message {
    fn from(m: SimpleAck) -> Self {
        Self::SimpleAck(m)
    }
}

impl From<CommandResponse> for Message {
    fn from(m: CommandResponse) -> Self {
        Self::CommandResponse(m)
    }
}

impl From<CommandError> for Message {
    fn from(m: CommandError) -> Self {
        Self::CommandError(m)
    }
}

impl From<OpenSession> for Message {
    fn from(m: OpenSession) -> Self {
        Self::OpenSession(m)
    }
}

impl From<RequestAccess> for Message {
    fn from(m: RequestAccess) -> Self {
        Self::RequestAccess(m)
    }
}

impl From<ConnectionPoll> for Message {
    fn from(m: ConnectionPoll) -> Self {
        Self::ConnectionPoll(m)
    }
}

impl From<SoftwareVersionRequest> for Message {
    fn from(m: SoftwareVersionRequest) -> Self {
        Self::SoftwareVersionRequest(m)
    }
}

impl From<SoftwareVersionResponse> for Message {
    fn from(m: SoftwareVersionResponse) -> Self {
        Self::SoftwareVersionResponse(m)
    }
}

impl From<ZoneStatusNotification> for Message {
    fn from(m: ZoneStatusNotification) -> Self {
        Self::ZoneStatus(m)
    }
}

impl From<PartitionStatusNotification> for Message {
    fn from(m: PartitionStatusNotification) -> Self {
        Self::PartitionStatus(m)
    }
}

/// One decoded inbound frame: transport sequences plus the typed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub sender_seq: u8,
    pub receiver_seq: u8,
    pub app_seq: Option<u8>,
    pub message: Message,
}

impl Envelope {
    /// Decode the payload of a parsed frame through the registry.
    pub fn from_frame(frame: Frame) -> Result<Self, CodecError> {
        let message = match frame.command {
            None => Message::SimpleAck(SimpleAck),
            Some(command) => registry::registry().decode(command, &frame.payload)?,
        };
        Ok(Self {
            sender_seq: frame.sender_seq,
            receiver_seq: frame.receiver_seq,
            app_seq: frame.app_seq,
            message,
        })
    }
}
