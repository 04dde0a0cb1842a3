//! Cryptographic primitives adapter
//!
//! SHA-256, AES-256 / Twofish (CBC, ECB) and Salsa20 over the RustCrypto
//! crates, plus a secure random source. Nothing here may be used before
//! [`initialize`] has returned `true`: it runs known-answer tests for every
//! algorithm the codec depends on and refuses to flip the initialized flag
//! if any of them fails.

pub mod cipher;
pub mod hash;
pub mod random;
mod selftest;

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, warn};

pub use cipher::{Direction, SymmetricAlgorithm, SymmetricCipher, SymmetricMode};
pub use hash::{CryptoHash, HashAlgorithm};
pub use random::{random_bytes, random_uint, random_uint_range};

static INITIALIZED: AtomicBool = AtomicBool::new(false);
static LAST_ERROR: Mutex<String> = Mutex::new(String::new());

/// Run the self-tests once and enable the adapter
///
/// Returns `true` when the adapter is usable. After a success further calls
/// return immediately without re-running the tests; after a failure the
/// reason is available from [`error_string`] and the next call retries.
pub fn initialize() -> bool {
    if INITIALIZED.load(Ordering::Acquire) {
        return true;
    }

    let mut last_error = match LAST_ERROR.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    if INITIALIZED.load(Ordering::Acquire) {
        return true;
    }

    match selftest::run_all() {
        Ok(()) => {
            last_error.clear();
            INITIALIZED.store(true, Ordering::Release);
            debug!("crypto self-test passed");
            true
        }
        Err(err) => {
            warn!("crypto self-test failed: {}", err);
            *last_error = err.to_string();
            false
        }
    }
}

/// Whether [`initialize`] has succeeded
pub fn is_initialized() -> bool {
    INITIALIZED.load(Ordering::Acquire)
}

/// Reason for the last failed [`initialize`] call, empty otherwise
pub fn error_string() -> String {
    match LAST_ERROR.lock() {
        Ok(guard) => guard.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

#[cfg(test)]
mod tests;
