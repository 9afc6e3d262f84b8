//! Session cryptography.
//!
//! The protocol is its own cryptographic envelope: whole inner frames are
//! AES-128-ECB encrypted with zero padding once a direction is keyed. ECB
//! and the key-mixing schemes are dictated by the panel firmware; the
//! gateway adds no IVs or MACs beyond the frame CRC.

mod cipher;
mod keys;

pub use cipher::FrameCipher;
pub use keys::{
    digit_key, hex_key, InboundKey, SchemeKeys, Type1Keys, Type2Keys, SCHEME_TYPE1, SCHEME_TYPE2,
};

/// Generate cryptographically secure random bytes.
pub fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut bytes);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_bytes_vary() {
        let a: [u8; 16] = random_bytes();
        let b: [u8; 16] = random_bytes();
        assert_ne!(a, b);
    }
}
