//! Ciphers named by string: the box AEAD and the admin
//! challenge-response block ciphers.

use crate::error::PivError;
use aes::cipher::{BlockEncrypt, KeyInit};
use cbc::cipher::{BlockEncryptMut, KeyIvInit};
use chacha20poly1305::{aead::Aead, ChaCha20Poly1305, KeyInit as AeadKeyInit, Nonce};

/// The box's only supported AEAD cipher; non-authenticated ciphers are
/// out of scope.
pub struct AeadCipher;

impl AeadCipher {
    pub const KEY_LEN: usize = 32;
    pub const IV_LEN: usize = 12;
    pub const TAG_LEN: usize = 16;
    pub const NAME: &'static str = "chacha20-poly1305";

    pub fn encrypt(key: &[u8], iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, PivError> {
        let cipher = Self::build(key)?;
        let nonce = Nonce::from_slice(iv);
        cipher.encrypt(nonce, plaintext).map_err(|_| PivError::BoxDataError {
            message: "AEAD encryption failed".into(),
        })
    }

    /// Decrypts and verifies the trailing AEAD tag in one step; any
    /// tampering with `ciphertext_and_tag` surfaces as `BoxDataError`.
    pub fn decrypt(key: &[u8], iv: &[u8], ciphertext_and_tag: &[u8]) -> Result<Vec<u8>, PivError> {
        let cipher = Self::build(key)?;
        let nonce = Nonce::from_slice(iv);
        cipher
            .decrypt(nonce, ciphertext_and_tag)
            .map_err(|_| PivError::BoxDataError {
                message: "AEAD tag verification failed".into(),
            })
    }

    fn build(key: &[u8]) -> Result<ChaCha20Poly1305, PivError> {
        if key.len() != Self::KEY_LEN {
            return Err(PivError::LengthError {
                message: format!("chacha20-poly1305 key must be {} bytes", Self::KEY_LEN),
            });
        }
        Ok(ChaCha20Poly1305::new(key.into()))
    }
}

/// Single-block, zero-IV block ciphers used only by the admin 9B
/// challenge-response step: AES-128/192/256-CBC and 3DES-CBC,
/// encrypting exactly one block with no padding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockCipher {
    Aes128,
    Aes192,
    Aes256,
    TripleDes,
}

impl BlockCipher {
    pub fn block_size(self) -> usize {
        match self {
            BlockCipher::TripleDes => 8,
            _ => 16,
        }
    }

    pub fn key_len(self) -> usize {
        match self {
            BlockCipher::Aes128 => 16,
            BlockCipher::Aes192 => 24,
            BlockCipher::Aes256 => 32,
            BlockCipher::TripleDes => 24,
        }
    }

    /// Encrypts exactly one block under a zero IV, per the admin
    /// challenge-response protocol ("a single block; challenge length
    /// must equal the cipher block size").
    pub fn encrypt_block(self, key: &[u8], block: &[u8]) -> Result<Vec<u8>, PivError> {
        if key.len() != self.key_len() {
            return Err(PivError::LengthError {
                message: format!("{self:?} key must be {} bytes", self.key_len()),
            });
        }
        if block.len() != self.block_size() {
            return Err(PivError::LengthError {
                message: format!("{self:?} challenge must be {} bytes", self.block_size()),
            });
        }
        match self {
            BlockCipher::Aes128 => {
                let iv = [0u8; 16];
                let enc = cbc::Encryptor::<aes::Aes128>::new(key.into(), (&iv).into());
                Ok(encrypt_no_padding(enc, block))
            }
            BlockCipher::Aes192 => {
                let iv = [0u8; 16];
                let enc = cbc::Encryptor::<aes::Aes192>::new(key.into(), (&iv).into());
                Ok(encrypt_no_padding(enc, block))
            }
            BlockCipher::Aes256 => {
                let iv = [0u8; 16];
                let enc = cbc::Encryptor::<aes::Aes256>::new(key.into(), (&iv).into());
                Ok(encrypt_no_padding(enc, block))
            }
            BlockCipher::TripleDes => {
                let iv = [0u8; 8];
                let enc = cbc::Encryptor::<des::TdesEde3>::new(key.into(), (&iv).into());
                Ok(encrypt_no_padding(enc, block))
            }
        }
    }
}

/// Encrypts one already-block-sized buffer with a CBC encryptor and no
/// padding scheme (the caller guarantees the length is exact).
fn encrypt_no_padding<C>(mut enc: cbc::Encryptor<C>, block: &[u8]) -> Vec<u8>
where
    C: BlockEncrypt + KeyInit,
    cbc::Encryptor<C>: BlockEncryptMut,
{
    let mut buf = block.to_vec();
    enc.encrypt_block_mut((&mut buf[..]).into());
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aead_roundtrips() {
        let key = [0x42u8; AeadCipher::KEY_LEN];
        let iv = [0x01u8; AeadCipher::IV_LEN];
        let ct = AeadCipher::encrypt(&key, &iv, b"hello world").unwrap();
        let pt = AeadCipher::decrypt(&key, &iv, &ct).unwrap();
        assert_eq!(pt, b"hello world");
    }

    #[test]
    fn aead_rejects_tampered_ciphertext() {
        let key = [0x42u8; AeadCipher::KEY_LEN];
        let iv = [0x01u8; AeadCipher::IV_LEN];
        let mut ct = AeadCipher::encrypt(&key, &iv, b"hello world").unwrap();
        ct[0] ^= 0x01;
        assert!(AeadCipher::decrypt(&key, &iv, &ct).is_err());
    }

    #[test]
    fn aes128_encrypts_one_block() {
        let key = [0u8; 16];
        let block = [0u8; 16];
        let out = BlockCipher::Aes128.encrypt_block(&key, &block).unwrap();
        assert_eq!(out.len(), 16);
    }

    #[test]
    fn rejects_wrong_block_length() {
        let key = [0u8; 16];
        let block = [0u8; 8];
        assert!(BlockCipher::Aes128.encrypt_block(&key, &block).is_err());
    }
}
