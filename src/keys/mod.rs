//! Master key sources and key derivation
//!
//! A [`CompositeKey`] combines any number of key sources (passwords, key
//! files) into one raw key, which [`transform`] then stretches through the
//! AES-ECB rounds of the container header.

pub mod composite;
pub mod file;
pub mod password;
pub mod transform;

pub use composite::CompositeKey;
pub use file::FileKey;
pub use password::PasswordKey;
pub use transform::{benchmark_rounds, transform_key, transform_key_raw};

/// Length of every raw key in bytes
pub const RAW_KEY_LENGTH: usize = 32;

/// A source of raw key material
pub trait Key: Send + Sync {
    /// The 32-byte raw key this source contributes
    fn raw_key(&self) -> Vec<u8>;

    /// Boxed copy of this source
    fn clone_key(&self) -> Box<dyn Key>;
}

impl Clone for Box<dyn Key> {
    fn clone(&self) -> Self {
        self.clone_key()
    }
}
