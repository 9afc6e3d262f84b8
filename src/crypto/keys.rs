//! Key derivation for the two ITv2 negotiation schemes.
//!
//! Type 1 mixes an 8-digit Integration Access Code and an 8-digit
//! Integration Identification Number; Type 2 uses a single 32-hex-digit
//! access code. Both produce one AES-128 key per direction from an
//! initializer exchanged during the handshake.

use crate::error::CryptoError;

use super::cipher::FrameCipher;
use super::random_bytes;

/// Scheme selector byte carried in `OpenSession`.
pub const SCHEME_TYPE1: u8 = 0x01;
pub const SCHEME_TYPE2: u8 = 0x02;

/// Expand an 8-digit decimal code into a 16-byte AES key: the digits are
/// repeated four times to form 32 hex characters, parsed as raw bytes.
pub fn digit_key(code: &str, what: &'static str) -> Result<[u8; 16], CryptoError> {
    let digits = code.trim();
    if digits.len() < 8 || !digits.bytes().take(8).all(|b| b.is_ascii_digit()) {
        return Err(CryptoError::InvalidKey(format!(
            "{what} must be at least 8 decimal digits"
        )));
    }
    let expanded = digits[..8].repeat(4);
    let raw = hex::decode(&expanded)
        .map_err(|e| CryptoError::InvalidKey(format!("{what}: {e}")))?;
    let mut key = [0u8; 16];
    key.copy_from_slice(&raw);
    Ok(key)
}

/// Parse a 32-hex-character access code into a 16-byte AES key.
pub fn hex_key(code: &str, what: &'static str) -> Result<[u8; 16], CryptoError> {
    let raw = hex::decode(code.trim())
        .map_err(|e| CryptoError::InvalidKey(format!("{what}: {e}")))?;
    if raw.len() != 16 {
        return Err(CryptoError::InvalidKey(format!(
            "{what} must be 32 hex characters"
        )));
    }
    let mut key = [0u8; 16];
    key.copy_from_slice(&raw);
    Ok(key)
}

/// Type 1 keying material: one cipher per shared secret.
pub struct Type1Keys {
    iac: FrameCipher,
    iin: FrameCipher,
}

impl Type1Keys {
    pub fn new(access_code: &str, identification_number: &str) -> Result<Self, CryptoError> {
        Ok(Self {
            iac: FrameCipher::new(digit_key(access_code, "integration access code")?),
            iin: FrameCipher::new(digit_key(
                identification_number,
                "integration identification number",
            )?),
        })
    }
}

/// Type 2 keying material.
pub struct Type2Keys {
    iac: FrameCipher,
}

impl Type2Keys {
    pub fn new(access_code: &str) -> Result<Self, CryptoError> {
        Ok(Self {
            iac: FrameCipher::new(hex_key(access_code, "integration access code")?),
        })
    }
}

/// A freshly generated inbound key: the cipher to activate locally and the
/// initializer bytes to put on the wire.
pub struct InboundKey {
    pub cipher: FrameCipher,
    pub wire: Vec<u8>,
}

/// Keying scheme negotiated by the handshake.
pub enum SchemeKeys {
    Type1(Type1Keys),
    Type2(Type2Keys),
}

impl SchemeKeys {
    /// Derive the outbound (server → panel) cipher from the initializer the
    /// panel sent in its `RequestAccess`.
    pub fn outbound_from_initializer(
        &self,
        initializer: &[u8],
    ) -> Result<FrameCipher, CryptoError> {
        match self {
            Self::Type1(keys) => {
                if initializer.len() != 48 {
                    return Err(CryptoError::InvalidInitializer {
                        expected: 48,
                        got: initializer.len(),
                    });
                }
                let check = &initializer[..16];
                let plain = keys.iin.decrypt(&initializer[16..])?;
                let mut key = [0u8; 16];
                for i in 0..16 {
                    if plain[2 * i] != check[i] {
                        return Err(CryptoError::CheckMismatch);
                    }
                    key[i] = plain[2 * i + 1];
                }
                Ok(FrameCipher::new(key))
            }
            Self::Type2(keys) => {
                if initializer.len() != 16 {
                    return Err(CryptoError::InvalidInitializer {
                        expected: 16,
                        got: initializer.len(),
                    });
                }
                let derived = keys.iac.encrypt(initializer);
                let mut key = [0u8; 16];
                key.copy_from_slice(&derived);
                Ok(FrameCipher::new(key))
            }
        }
    }

    /// Generate the inbound (panel → server) key and the initializer to
    /// announce it. The cipher is activated before the wire bytes leave.
    pub fn new_inbound(&self) -> Result<InboundKey, CryptoError> {
        match self {
            Self::Type1(keys) => {
                let material: [u8; 32] = random_bytes();
                let mut key = [0u8; 16];
                let mut check = [0u8; 16];
                for i in 0..16 {
                    check[i] = material[2 * i];
                    key[i] = material[2 * i + 1];
                }
                let ciphertext = keys.iac.encrypt(&material);
                let mut wire = Vec::with_capacity(48);
                wire.extend_from_slice(&check);
                wire.extend_from_slice(&ciphertext);
                Ok(InboundKey {
                    cipher: FrameCipher::new(key),
                    wire,
                })
            }
            Self::Type2(keys) => {
                let material: [u8; 16] = random_bytes();
                let derived = keys.iac.encrypt(&material);
                let mut key = [0u8; 16];
                key.copy_from_slice(&derived);
                Ok(InboundKey {
                    cipher: FrameCipher::new(key),
                    wire: material.to_vec(),
                })
            }
        }
    }
}
