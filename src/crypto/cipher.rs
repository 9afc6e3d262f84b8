//! Whole-frame AES-128-ECB with zero padding.

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::Aes128;

use crate::error::CryptoError;

const BLOCK: usize = 16;

/// One direction's frame cipher. Encrypts and decrypts entire inner frames
/// block by block.
pub struct FrameCipher {
    cipher: Aes128,
}

impl FrameCipher {
    pub fn new(key: [u8; 16]) -> Self {
        Self {
            cipher: Aes128::new(&key.into()),
        }
    }

    /// Encrypt, zero-padding up to the next block boundary. Input that is
    /// already block-aligned gains no extra block.
    pub fn encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
        let padded = plaintext.len().div_ceil(BLOCK).max(1) * BLOCK;
        let mut out = vec![0u8; padded];
        out[..plaintext.len()].copy_from_slice(plaintext);
        for chunk in out.chunks_mut(BLOCK) {
            self.cipher
                .encrypt_block(GenericArray::from_mut_slice(chunk));
        }
        out
    }

    /// Decrypt a block-aligned ciphertext. Padding is left in place; the
    /// frame length prefix tells the parser where the frame ends.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if ciphertext.is_empty() || ciphertext.len() % BLOCK != 0 {
            return Err(CryptoError::PartialBlock(ciphertext.len()));
        }
        let mut out = ciphertext.to_vec();
        for chunk in out.chunks_mut(BLOCK) {
            self.cipher
                .decrypt_block(GenericArray::from_mut_slice(chunk));
        }
        Ok(out)
    }
}

impl std::fmt::Debug for FrameCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Key material stays out of logs.
        f.write_str("FrameCipher")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_with_padding() {
        let cipher = FrameCipher::new(*b"0123456789abcdef");
        let frame = [0x06, 0x01, 0x00, 0x00, 0x0A, 0xBE, 0xEF];

        let ct = cipher.encrypt(&frame);
        assert_eq!(ct.len(), 16);

        let pt = cipher.decrypt(&ct).unwrap();
        assert_eq!(&pt[..frame.len()], &frame);
        assert!(pt[frame.len()..].iter().all(|&b| b == 0));
    }

    #[test]
    fn aligned_input_gains_no_block() {
        let cipher = FrameCipher::new([0x42; 16]);
        let ct = cipher.encrypt(&[0xAB; 32]);
        assert_eq!(ct.len(), 32);
        assert_eq!(cipher.decrypt(&ct).unwrap(), vec![0xAB; 32]);
    }

    #[test]
    fn partial_block_rejected() {
        let cipher = FrameCipher::new([0x42; 16]);
        assert_eq!(
            cipher.decrypt(&[0u8; 15]).unwrap_err(),
            CryptoError::PartialBlock(15)
        );
        assert_eq!(
            cipher.decrypt(&[]).unwrap_err(),
            CryptoError::PartialBlock(0)
        );
    }

    #[test]
    fn different_keys_disagree() {
        let a = FrameCipher::new([0x01; 16]);
        let b = FrameCipher::new([0x02; 16]);
        let ct = a.encrypt(b"hello panel");
        assert_ne!(b.decrypt(&ct).unwrap(), a.decrypt(&ct).unwrap());
    }
}
