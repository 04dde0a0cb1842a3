//! Cryptographically secure random source
//!
//! Backed by the thread-local CSPRNG of `rand`. Every function returns an
//! empty or zero result until the crypto backend has been initialized.

use rand::RngCore;

use super::is_initialized;

/// Fill a fresh buffer of `len` random bytes
pub fn random_bytes(len: usize) -> Vec<u8> {
    if !is_initialized() {
        return Vec::new();
    }
    let mut buffer = vec![0u8; len];
    rand::rng().fill_bytes(&mut buffer);
    buffer
}

/// Uniform value in `[0, limit)`
///
/// Rejection sampling: 32-bit draws above the largest multiple of `limit`
/// are discarded so the modulo carries no bias.
pub fn random_uint(limit: u32) -> u32 {
    if !is_initialized() || limit == 0 {
        return 0;
    }
    let ceiling = u32::MAX - (u32::MAX % limit) - 1;
    let mut rng = rand::rng();
    loop {
        let value = rng.next_u32();
        if value <= ceiling {
            return value % limit;
        }
    }
}

/// Uniform value in `[min, max)`
pub fn random_uint_range(min: u32, max: u32) -> u32 {
    if max <= min {
        return min;
    }
    min + random_uint(max - min)
}
