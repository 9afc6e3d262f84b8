//! Byte stuffing and the outer packet envelope.
//!
//! On the wire a packet is `[header?] 0x7E [body] 0x7F`. Everything except
//! the two delimiters is stuffed: `0x7D 0x7E 0x7F` never appear raw inside
//! either region.

use crate::error::FramingError;

use super::{ESCAPE, HEADER_DELIMITER, PACKET_TERMINATOR};

/// Replace each reserved byte with its two-byte escape sequence.
pub fn stuff(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len() / 8);
    for &b in data {
        match b {
            ESCAPE => out.extend_from_slice(&[ESCAPE, 0x00]),
            HEADER_DELIMITER => out.extend_from_slice(&[ESCAPE, 0x01]),
            PACKET_TERMINATOR => out.extend_from_slice(&[ESCAPE, 0x02]),
            _ => out.push(b),
        }
    }
    out
}

/// Reverse [`stuff`]. Rejects unknown escape sequences and reserved bytes
/// that leaked through unescaped.
pub fn unstuff(data: &[u8]) -> Result<Vec<u8>, FramingError> {
    let mut out = Vec::with_capacity(data.len());
    let mut iter = data.iter();
    while let Some(&b) = iter.next() {
        match b {
            ESCAPE => {
                let &code = iter.next().ok_or(FramingError::InvalidEscape(0x00))?;
                match code {
                    0x00 => out.push(ESCAPE),
                    0x01 => out.push(HEADER_DELIMITER),
                    0x02 => out.push(PACKET_TERMINATOR),
                    other => return Err(FramingError::InvalidEscape(other)),
                }
            }
            HEADER_DELIMITER | PACKET_TERMINATOR => return Err(FramingError::ReservedByte(b)),
            _ => out.push(b),
        }
    }
    Ok(out)
}

/// CRC-16/ARC over the inner frame body (poly 0xA001 reflected, init 0).
///
/// The polynomial is pinned here so a capture-derived correction stays a
/// one-line change.
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0x0000;
    for &b in data {
        crc ^= u16::from(b);
        for _ in 0..8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ 0xA001
            } else {
                crc >> 1
            };
        }
    }
    crc
}

/// Wrap a header region and an (already encrypted, if applicable) inner
/// frame into one wire packet.
pub fn envelope(header: &[u8], body: &[u8]) -> Vec<u8> {
    let stuffed_header = stuff(header);
    let stuffed_body = stuff(body);
    let mut out = Vec::with_capacity(stuffed_header.len() + stuffed_body.len() + 2);
    out.extend_from_slice(&stuffed_header);
    out.push(HEADER_DELIMITER);
    out.extend_from_slice(&stuffed_body);
    out.push(PACKET_TERMINATOR);
    out
}

/// Split one wire packet back into its unstuffed header and body regions.
///
/// `packet` is the raw slice the transport produced: everything up to and
/// including the terminator.
pub fn split_packet(packet: &[u8]) -> Result<(Vec<u8>, Vec<u8>), FramingError> {
    let end = match packet.last() {
        Some(&PACKET_TERMINATOR) => packet.len() - 1,
        _ => return Err(FramingError::MissingDelimiter),
    };
    let inner = &packet[..end];
    let split = inner
        .iter()
        .position(|&b| b == HEADER_DELIMITER)
        .ok_or(FramingError::MissingDelimiter)?;
    let header = unstuff(&inner[..split])?;
    let body = unstuff(&inner[split + 1..])?;
    Ok((header, body))
}
