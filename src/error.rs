//! Error types for the gateway core.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for gateway operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the gateway.
#[derive(Error, Debug)]
pub enum Error {
    // Session-fatal conditions
    #[error("peer disconnected")]
    Disconnected,

    #[error("operation cancelled")]
    Cancelled,

    #[error("session lock not acquired within {0:?}")]
    Deadlock(Duration),

    // Per-transaction conditions
    #[error("transaction timed out")]
    Timeout,

    #[error("unexpected response: expected {expected}, got {got}")]
    UnexpectedResponse {
        expected: &'static str,
        got: &'static str,
    },

    #[error("not supported: {0}")]
    NotSupported(String),

    // Wire-layer errors
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("framing error: {0}")]
    Framing(#[from] FramingError),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    // Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Payload serialization errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("short buffer reading {field}: need {needed} more bytes at offset {offset}")]
    ShortBuffer {
        field: &'static str,
        offset: usize,
        needed: usize,
    },

    #[error("{field}: {len} bytes exceeds {max}-byte prefix")]
    LengthOverflow {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("unsupported field type: {0}")]
    UnsupportedType(&'static str),
}

/// Packet framing and stuffing errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FramingError {
    #[error("missing packet delimiter")]
    MissingDelimiter,

    #[error("illegal escape sequence 0x7d 0x{0:02x}")]
    InvalidEscape(u8),

    #[error("reserved byte 0x{0:02x} inside packet body")]
    ReservedByte(u8),

    #[error("CRC mismatch: frame carries 0x{carried:04x}, computed 0x{computed:04x}")]
    CrcMismatch { carried: u16, computed: u16 },

    #[error("frame length {0} out of range")]
    BadLength(usize),
}

/// Key negotiation and frame encryption errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("key check bytes do not match")]
    CheckMismatch,

    #[error("initializer must be {expected} bytes, got {got}")]
    InvalidInitializer { expected: usize, got: usize },

    #[error("unknown encryption scheme 0x{0:02x}")]
    UnsupportedScheme(u8),

    #[error("ciphertext length {0} is not a whole number of blocks")]
    PartialBlock(usize),

    #[error("invalid key material: {0}")]
    InvalidKey(String),
}

impl Error {
    /// Check if the error terminates the session outright.
    ///
    /// Everything else is logged, the offending packet or transaction is
    /// dropped, and the session continues.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Disconnected | Error::Cancelled | Error::Deadlock(_) | Error::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_classification() {
        assert!(Error::Disconnected.is_fatal());
        assert!(Error::Deadlock(Duration::from_secs(30)).is_fatal());
        assert!(!Error::Timeout.is_fatal());
        assert!(!Error::Framing(FramingError::MissingDelimiter).is_fatal());
    }

    #[test]
    fn codec_error_names_field() {
        let err = CodecError::ShortBuffer {
            field: "initializer",
            offset: 3,
            needed: 16,
        };
        let text = err.to_string();
        assert!(text.contains("initializer"));
        assert!(text.contains("offset 3"));
    }
}
