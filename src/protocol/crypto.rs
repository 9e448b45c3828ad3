//! AES-256-CFB8 stream contexts.
//!
//! CFB8 works one byte at a time, so a context can be fed arbitrary chunks
//! of a stream and keeps its state between calls.

use std::fmt::Debug;

use aes::Aes256;
use cfb8::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, generic_array::GenericArray};
use thiserror::Error;

pub const KEY_LENGTH: usize = 32;
pub const IV_LENGTH: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SecretError {
    #[error("expected {expected} hex digits, got {got}")]
    Length { expected: usize, got: usize },
    #[error("invalid hex digit {0:?}")]
    Digit(char),
}

/// Shared key and initialisation vector
#[derive(Clone, PartialEq, Eq)]
pub struct Secret {
    key: [u8; KEY_LENGTH],
    iv: [u8; IV_LENGTH],
}

impl Secret {
    pub const fn new(key: [u8; KEY_LENGTH], iv: [u8; IV_LENGTH]) -> Self {
        Self { key, iv }
    }

    /// Parses the hex form: key digits followed by IV digits
    pub fn from_hex(text: &str) -> Result<Self, SecretError> {
        let expected = 2 * (KEY_LENGTH + IV_LENGTH);
        let digits: Vec<char> = text.trim().chars().collect();
        if digits.len() != expected {
            return Err(SecretError::Length {
                expected,
                got: digits.len(),
            });
        }

        let mut bytes = [0u8; KEY_LENGTH + IV_LENGTH];
        for (byte, pair) in bytes.iter_mut().zip(digits.chunks(2)) {
            let high = pair[0].to_digit(16).ok_or(SecretError::Digit(pair[0]))?;
            let low = pair[1].to_digit(16).ok_or(SecretError::Digit(pair[1]))?;
            *byte = (high * 16 + low) as u8;
        }

        let mut key = [0u8; KEY_LENGTH];
        let mut iv = [0u8; IV_LENGTH];
        key.copy_from_slice(&bytes[..KEY_LENGTH]);
        iv.copy_from_slice(&bytes[KEY_LENGTH..]);
        Ok(Self { key, iv })
    }

    pub fn encryptor(&self) -> StreamEncryptor {
        StreamEncryptor(cfb8::Encryptor::new(
            GenericArray::from_slice(&self.key),
            GenericArray::from_slice(&self.iv),
        ))
    }

    pub fn decryptor(&self) -> StreamDecryptor {
        StreamDecryptor(cfb8::Decryptor::new(
            GenericArray::from_slice(&self.key),
            GenericArray::from_slice(&self.iv),
        ))
    }
}

/// Key material stays out of the logs
impl Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret(..)")
    }
}

/// Encrypting half of a stream
pub struct StreamEncryptor(cfb8::Encryptor<Aes256>);

impl StreamEncryptor {
    /// Encrypts `bytes` in place, continuing the stream
    pub fn apply(&mut self, bytes: &mut [u8]) {
        for byte in bytes.chunks_mut(1) {
            self.0.encrypt_block_mut(GenericArray::from_mut_slice(byte));
        }
    }
}

impl Debug for StreamEncryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StreamEncryptor")
    }
}

/// Decrypting half of a stream
pub struct StreamDecryptor(cfb8::Decryptor<Aes256>);

impl StreamDecryptor {
    /// Decrypts `bytes` in place, continuing the stream
    pub fn apply(&mut self, bytes: &mut [u8]) {
        for byte in bytes.chunks_mut(1) {
            self.0.decrypt_block_mut(GenericArray::from_mut_slice(byte));
        }
    }
}

impl Debug for StreamDecryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StreamDecryptor")
    }
}
