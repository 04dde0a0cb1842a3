//! Symmetric cipher adapter
//!
//! Wraps AES-256 and Twofish (CBC or ECB, no padding) and the Salsa20
//! stream cipher behind one stateful type. Padding is handled by the
//! stream layer in `format::streams`, never here: block-mode buffers must be
//! a multiple of [`SymmetricCipher::block_size`].
//!
//! CBC contexts keep their chaining state across calls, so a buffer can be
//! processed in several pieces. [`SymmetricCipher::reset`] re-applies the
//! original IV.

use aes::Aes256;
use cipher::generic_array::GenericArray;
use cipher::{
    BlockDecrypt, BlockDecryptMut, BlockEncrypt, BlockEncryptMut, KeyInit, KeyIvInit,
    StreamCipher,
};
use salsa20::Salsa20;
use twofish::Twofish;
use zeroize::Zeroize;

use super::is_initialized;
use crate::error::{KdbxError, Result};

/// Block size shared by AES and Twofish
pub const BLOCK_SIZE: usize = 16;

/// Cipher algorithms known to the adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymmetricAlgorithm {
    Aes256,
    Twofish,
    Salsa20,
}

/// Chaining mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymmetricMode {
    Cbc,
    Ecb,
    Stream,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Encrypt,
    Decrypt,
}

enum Backend {
    AesEcb(Box<Aes256>),
    AesCbcEncrypt(Box<cbc::Encryptor<Aes256>>),
    AesCbcDecrypt(Box<cbc::Decryptor<Aes256>>),
    TwofishEcb(Box<Twofish>),
    TwofishCbcEncrypt(Box<cbc::Encryptor<Twofish>>),
    TwofishCbcDecrypt(Box<cbc::Decryptor<Twofish>>),
    Salsa20(Box<Salsa20>),
}

/// Stateful cipher context
pub struct SymmetricCipher {
    algorithm: SymmetricAlgorithm,
    mode: SymmetricMode,
    direction: Direction,
    key: Vec<u8>,
    iv: Vec<u8>,
    backend: Option<Backend>,
}

impl SymmetricCipher {
    pub fn new(algorithm: SymmetricAlgorithm, mode: SymmetricMode, direction: Direction) -> Self {
        Self {
            algorithm,
            mode,
            direction,
            key: Vec::new(),
            iv: Vec::new(),
            backend: None,
        }
    }

    pub fn algorithm(&self) -> SymmetricAlgorithm {
        self.algorithm
    }

    pub fn mode(&self) -> SymmetricMode {
        self.mode
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Granularity that block-mode buffers must respect
    pub fn block_size(&self) -> usize {
        match self.mode {
            SymmetricMode::Stream => 1,
            SymmetricMode::Cbc | SymmetricMode::Ecb => BLOCK_SIZE,
        }
    }

    /// Key the context. `iv` is ignored in ECB mode.
    pub fn init(&mut self, key: &[u8], iv: &[u8]) -> Result<()> {
        if !is_initialized() {
            return Err(KdbxError::CryptoNotInitialized);
        }
        self.init_unchecked(key, iv)
    }

    pub(crate) fn init_unchecked(&mut self, key: &[u8], iv: &[u8]) -> Result<()> {
        self.key.zeroize();
        self.iv.zeroize();
        self.key = key.to_vec();
        self.iv = iv.to_vec();
        self.backend = Some(self.build_backend()?);
        Ok(())
    }

    /// Re-apply the original IV without re-keying from scratch
    pub fn reset(&mut self) -> Result<()> {
        if self.backend.is_none() {
            return Err(KdbxError::Cipher("Cipher not initialized".to_string()));
        }
        self.backend = Some(self.build_backend()?);
        Ok(())
    }

    /// Process a copy of `data`
    pub fn process(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        let mut buffer = data.to_vec();
        self.process_in_place(&mut buffer)?;
        Ok(buffer)
    }

    pub fn process_in_place(&mut self, data: &mut [u8]) -> Result<()> {
        self.process_in_place_rounds(data, 1)
    }

    /// Apply the transform `rounds` times to the same buffer
    pub fn process_in_place_rounds(&mut self, data: &mut [u8], rounds: u64) -> Result<()> {
        if data.len() % self.block_size() != 0 {
            return Err(KdbxError::Cipher(format!(
                "Data size {} is not a multiple of the block size",
                data.len()
            )));
        }
        let direction = self.direction;
        let backend = self
            .backend
            .as_mut()
            .ok_or_else(|| KdbxError::Cipher("Cipher not initialized".to_string()))?;

        for _ in 0..rounds {
            match &mut *backend {
                Backend::AesEcb(c) => ecb_process(&**c, direction, data),
                Backend::AesCbcEncrypt(c) => cbc_encrypt(&mut **c, data),
                Backend::AesCbcDecrypt(c) => cbc_decrypt(&mut **c, data),
                Backend::TwofishEcb(c) => ecb_process(&**c, direction, data),
                Backend::TwofishCbcEncrypt(c) => cbc_encrypt(&mut **c, data),
                Backend::TwofishCbcDecrypt(c) => cbc_decrypt(&mut **c, data),
                Backend::Salsa20(c) => c
                    .try_apply_keystream(data)
                    .map_err(|_| KdbxError::Cipher("Keystream exhausted".to_string()))?,
            }
        }
        Ok(())
    }

    fn build_backend(&self) -> Result<Backend> {
        let bad_key = |_: cipher::InvalidLength| {
            KdbxError::Cipher(format!(
                "Invalid key or IV length for {:?}/{:?}",
                self.algorithm, self.mode
            ))
        };
        let backend = match (self.algorithm, self.mode, self.direction) {
            (SymmetricAlgorithm::Aes256, SymmetricMode::Ecb, _) => {
                Backend::AesEcb(Box::new(Aes256::new_from_slice(&self.key).map_err(bad_key)?))
            }
            (SymmetricAlgorithm::Aes256, SymmetricMode::Cbc, Direction::Encrypt) => {
                Backend::AesCbcEncrypt(Box::new(
                    cbc::Encryptor::<Aes256>::new_from_slices(&self.key, &self.iv)
                        .map_err(bad_key)?,
                ))
            }
            (SymmetricAlgorithm::Aes256, SymmetricMode::Cbc, Direction::Decrypt) => {
                Backend::AesCbcDecrypt(Box::new(
                    cbc::Decryptor::<Aes256>::new_from_slices(&self.key, &self.iv)
                        .map_err(bad_key)?,
                ))
            }
            (SymmetricAlgorithm::Twofish, SymmetricMode::Ecb, _) => {
                Backend::TwofishEcb(Box::new(Twofish::new_from_slice(&self.key).map_err(bad_key)?))
            }
            (SymmetricAlgorithm::Twofish, SymmetricMode::Cbc, Direction::Encrypt) => {
                Backend::TwofishCbcEncrypt(Box::new(
                    cbc::Encryptor::<Twofish>::new_from_slices(&self.key, &self.iv)
                        .map_err(bad_key)?,
                ))
            }
            (SymmetricAlgorithm::Twofish, SymmetricMode::Cbc, Direction::Decrypt) => {
                Backend::TwofishCbcDecrypt(Box::new(
                    cbc::Decryptor::<Twofish>::new_from_slices(&self.key, &self.iv)
                        .map_err(bad_key)?,
                ))
            }
            (SymmetricAlgorithm::Salsa20, SymmetricMode::Stream, _) => Backend::Salsa20(Box::new(
                Salsa20::new_from_slices(&self.key, &self.iv).map_err(bad_key)?,
            )),
            (algorithm, mode, _) => {
                return Err(KdbxError::Cipher(format!(
                    "Unsupported cipher combination {:?}/{:?}",
                    algorithm, mode
                )));
            }
        };
        Ok(backend)
    }
}

impl Drop for SymmetricCipher {
    fn drop(&mut self) {
        self.key.zeroize();
        self.iv.zeroize();
    }
}

fn ecb_process<C: BlockEncrypt + BlockDecrypt>(cipher: &C, direction: Direction, data: &mut [u8]) {
    for chunk in data.chunks_exact_mut(BLOCK_SIZE) {
        let block = GenericArray::from_mut_slice(chunk);
        match direction {
            Direction::Encrypt => cipher.encrypt_block(block),
            Direction::Decrypt => cipher.decrypt_block(block),
        }
    }
}

fn cbc_encrypt<C: BlockEncryptMut>(cipher: &mut C, data: &mut [u8]) {
    for chunk in data.chunks_exact_mut(BLOCK_SIZE) {
        cipher.encrypt_block_mut(GenericArray::from_mut_slice(chunk));
    }
}

fn cbc_decrypt<C: BlockDecryptMut>(cipher: &mut C, data: &mut [u8]) {
    for chunk in data.chunks_exact_mut(BLOCK_SIZE) {
        cipher.decrypt_block_mut(GenericArray::from_mut_slice(chunk));
    }
}
