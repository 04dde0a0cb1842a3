//! Inner random stream for protected values
//!
//! Salsa20 keyed with SHA-256 of the header's protected stream key and a
//! fixed nonce. The keystream is shared by every protected value of a
//! document and consumed in document order.

use crate::crypto::hash::sha256_unchecked;
use crate::crypto::{Direction, SymmetricAlgorithm, SymmetricCipher, SymmetricMode};
use crate::error::Result;

/// Fixed Salsa20 nonce of the inner stream
pub const INNER_STREAM_NONCE: [u8; 8] = [0xE8, 0x30, 0x09, 0x4B, 0x97, 0x20, 0x5D, 0x2A];

/// Keystream used to hide protected values inside the document
pub struct ProtectedStream {
    cipher: SymmetricCipher,
}

impl ProtectedStream {
    pub fn new(protected_stream_key: &[u8]) -> Result<Self> {
        let mut cipher = SymmetricCipher::new(
            SymmetricAlgorithm::Salsa20,
            SymmetricMode::Stream,
            Direction::Encrypt,
        );
        cipher.init(&sha256_unchecked(protected_stream_key), &INNER_STREAM_NONCE)?;
        Ok(Self { cipher })
    }

    /// XOR `data` with the next `data.len()` keystream bytes
    pub fn process(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        self.cipher.process(data)
    }
}
