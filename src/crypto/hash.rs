//! SHA-256 hashing, one-shot and incremental

use sha2::{Digest, Sha256};

use super::is_initialized;

/// Supported digest algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha256,
}

impl HashAlgorithm {
    /// Digest length in bytes
    pub fn output_size(self) -> usize {
        match self {
            HashAlgorithm::Sha256 => 32,
        }
    }
}

/// Incremental hasher
///
/// Feed bytes with [`CryptoHash::add_data`], read the digest with
/// [`CryptoHash::result`]. Reading the result does not consume the hasher;
/// call [`CryptoHash::reset`] to start over.
#[derive(Clone)]
pub struct CryptoHash {
    algorithm: HashAlgorithm,
    state: Sha256,
}

impl CryptoHash {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Self {
            algorithm,
            state: Sha256::new(),
        }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    pub fn add_data(&mut self, data: &[u8]) {
        self.state.update(data);
    }

    /// Digest of everything fed so far, empty if the crypto backend
    /// has not been initialized.
    pub fn result(&self) -> Vec<u8> {
        if !is_initialized() {
            return Vec::new();
        }
        self.state.clone().finalize().to_vec()
    }

    pub fn reset(&mut self) {
        self.state = Sha256::new();
    }

    /// One-shot digest of `data`
    pub fn hash(data: &[u8], algorithm: HashAlgorithm) -> Vec<u8> {
        let mut hasher = Self::new(algorithm);
        hasher.add_data(data);
        hasher.result()
    }
}

/// Digest used by the self-test before the initialized flag is set
pub(crate) fn sha256_unchecked(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}
