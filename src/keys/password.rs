//! Password key source

use std::fmt;

use zeroize::Zeroize;

use super::{Key, RAW_KEY_LENGTH};
use crate::crypto::hash::sha256_unchecked;

/// Key source derived from a password: SHA-256 of its UTF-8 bytes
#[derive(Clone)]
pub struct PasswordKey {
    raw: [u8; RAW_KEY_LENGTH],
}

impl PasswordKey {
    pub fn new(password: &str) -> Self {
        Self {
            raw: sha256_unchecked(password.as_bytes()),
        }
    }

    pub fn set_password(&mut self, password: &str) {
        self.raw.zeroize();
        self.raw = sha256_unchecked(password.as_bytes());
    }
}

impl Key for PasswordKey {
    fn raw_key(&self) -> Vec<u8> {
        self.raw.to_vec()
    }

    fn clone_key(&self) -> Box<dyn Key> {
        Box::new(self.clone())
    }
}

impl fmt::Debug for PasswordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PasswordKey(..)")
    }
}

impl Drop for PasswordKey {
    fn drop(&mut self) {
        self.raw.zeroize();
    }
}
