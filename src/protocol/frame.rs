//! Inner frame layout: length, sequence bytes, command, app sequence,
//! payload, CRC.
//!
//! ```text
//! [length:1-2 BE][sender_seq:1][receiver_seq:1]
//! [command:2 BE | absent for SimpleAck][app_seq:1?][payload][crc:2 BE]
//! ```
//!
//! The length prefix counts everything after itself. One byte below 0x80,
//! otherwise two bytes with the high bit of the first set as a continuation
//! marker. The CRC covers the region between length and CRC.

use crate::error::FramingError;

use super::framing::crc16;

/// Largest body representable by the two-byte length prefix.
const MAX_FRAME_LEN: usize = 0x7FFF;

/// One decoded inner frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub sender_seq: u8,
    pub receiver_seq: u8,
    /// Absent on the wire for SimpleAck; the ack is recognised by absence.
    pub command: Option<u16>,
    pub app_seq: Option<u8>,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Serialize to the plaintext inner-frame bytes (pre-encryption).
    pub fn encode(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(self.payload.len() + 6);
        body.push(self.sender_seq);
        body.push(self.receiver_seq);
        if let Some(command) = self.command {
            body.extend_from_slice(&command.to_be_bytes());
            if let Some(app) = self.app_seq {
                body.push(app);
            }
        }
        body.extend_from_slice(&self.payload);
        let crc = crc16(&body);

        let total = body.len() + 2;
        let mut out = Vec::with_capacity(total + 2);
        if total < 0x80 {
            out.push(total as u8);
        } else {
            out.push(0x80 | ((total >> 8) as u8));
            out.push((total & 0xFF) as u8);
        }
        out.extend_from_slice(&body);
        out.extend_from_slice(&crc.to_be_bytes());
        out
    }

    /// Parse the plaintext inner-frame bytes.
    ///
    /// `has_app_seq` reports whether a command code carries the application
    /// sequence byte (a registry lookup at the call site). Trailing bytes
    /// beyond the declared length are tolerated: block-cipher zero padding
    /// lands there once encryption is active.
    pub fn decode(
        data: &[u8],
        has_app_seq: impl Fn(u16) -> bool,
    ) -> Result<Self, FramingError> {
        let (len, mut pos) = decode_length(data)?;
        if len < 4 || data.len() - pos < len {
            return Err(FramingError::BadLength(len));
        }
        let body = &data[pos..pos + len - 2];
        let carried = u16::from_be_bytes([data[pos + len - 2], data[pos + len - 1]]);
        let computed = crc16(body);
        if carried != computed {
            return Err(FramingError::CrcMismatch { carried, computed });
        }

        pos = 0;
        let sender_seq = body[pos];
        let receiver_seq = body[pos + 1];
        pos += 2;

        if pos == body.len() {
            // No command word: SimpleAck.
            return Ok(Self {
                sender_seq,
                receiver_seq,
                command: None,
                app_seq: None,
                payload: Vec::new(),
            });
        }
        if body.len() - pos < 2 {
            return Err(FramingError::BadLength(len));
        }
        let command = u16::from_be_bytes([body[pos], body[pos + 1]]);
        pos += 2;

        let app_seq = if has_app_seq(command) {
            if pos == body.len() {
                return Err(FramingError::BadLength(len));
            }
            let app = body[pos];
            pos += 1;
            Some(app)
        } else {
            None
        };

        Ok(Self {
            sender_seq,
            receiver_seq,
            command: Some(command),
            app_seq,
            payload: body[pos..].to_vec(),
        })
    }
}

fn decode_length(data: &[u8]) -> Result<(usize, usize), FramingError> {
    let first = *data.first().ok_or(FramingError::BadLength(0))?;
    if first & 0x80 == 0 {
        Ok((first as usize, 1))
    } else {
        let second = *data.get(1).ok_or(FramingError::BadLength(first as usize))?;
        let len = (usize::from(first & 0x7F) << 8) | usize::from(second);
        if len > MAX_FRAME_LEN {
            return Err(FramingError::BadLength(len));
        }
        Ok((len, 2))
    }
}
