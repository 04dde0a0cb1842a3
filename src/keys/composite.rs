//! Composite key: an ordered list of key sources

use std::fmt;

use super::{Key, benchmark_rounds, transform_key};
use crate::crypto::hash::sha256_unchecked;
use crate::error::Result;

/// All key sources a user supplies to unlock a database
///
/// The raw key is SHA-256 over the concatenated raw keys of every source, in
/// the order they were added.
#[derive(Clone, Default)]
pub struct CompositeKey {
    keys: Vec<Box<dyn Key>>,
}

impl CompositeKey {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a copy of `key`
    pub fn add_key(&mut self, key: &dyn Key) {
        self.keys.push(key.clone_key());
    }

    /// Builder form of [`CompositeKey::add_key`]
    pub fn with_key(mut self, key: &dyn Key) -> Self {
        self.add_key(key);
        self
    }

    pub fn clear(&mut self) {
        self.keys.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Run the raw key through `rounds` of the AES-ECB transform
    ///
    /// # Arguments
    /// * `seed` - 32-byte transform seed from the container header
    /// * `rounds` - number of encryption rounds, at least 1
    pub fn transform(&self, seed: &[u8], rounds: u64) -> Result<Vec<u8>> {
        transform_key(&self.raw_key(), seed, rounds)
    }

    /// Rounds achievable in roughly `duration_ms` milliseconds
    pub fn benchmark_rounds(duration_ms: u64) -> u64 {
        benchmark_rounds(duration_ms)
    }
}

impl Key for CompositeKey {
    fn raw_key(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(self.keys.len() * super::RAW_KEY_LENGTH);
        for key in &self.keys {
            data.extend_from_slice(&key.raw_key());
        }
        let raw = sha256_unchecked(&data).to_vec();
        zeroize::Zeroize::zeroize(&mut data);
        raw
    }

    fn clone_key(&self) -> Box<dyn Key> {
        Box::new(self.clone())
    }
}

impl fmt::Debug for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeKey")
            .field("sources", &self.keys.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::PasswordKey;

    #[test]
    fn test_single_password_raw_key() {
        let key = CompositeKey::new().with_key(&PasswordKey::new("test"));
        assert_eq!(
            hex::encode(key.raw_key()),
            "954d5a49fd70d9b8bcdb35d252267829957f7ef7fa6c74f88419bdc5e82209f4"
        );
    }

    #[test]
    fn test_order_matters() {
        let a = PasswordKey::new("a");
        let b = PasswordKey::new("b");
        let ab = CompositeKey::new().with_key(&a).with_key(&b);
        let ba = CompositeKey::new().with_key(&b).with_key(&a);
        assert_ne!(ab.raw_key(), ba.raw_key());
        assert_eq!(ab.len(), 2);
    }

    #[test]
    fn test_clone_is_independent() {
        let mut key = CompositeKey::new().with_key(&PasswordKey::new("a"));
        let copy = key.clone();
        key.add_key(&PasswordKey::new("b"));
        assert_eq!(copy.len(), 1);
        assert_ne!(copy.raw_key(), key.raw_key());
    }

    #[test]
    fn test_transform_pinned() {
        assert!(crate::crypto::initialize());
        let key = CompositeKey::new().with_key(&PasswordKey::new("test"));
        let seed: Vec<u8> = (0u8..32).collect();
        let transformed = key.transform(&seed, 1000).unwrap();
        assert_eq!(
            hex::encode(transformed),
            "57d32c29ab1c4575969efe5ca0660e363a4730671908984cf9d2a1eed35c8954"
        );
    }

    #[test]
    fn test_nested_composite() {
        let inner = CompositeKey::new().with_key(&PasswordKey::new("x"));
        let outer = CompositeKey::new().with_key(&inner);
        assert_eq!(outer.len(), 1);
        assert_eq!(outer.raw_key().len(), 32);
    }
}
