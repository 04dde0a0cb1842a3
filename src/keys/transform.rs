//! AES-ECB key transformation (the KDBX 3.1 KDF) and its calibration
//!
//! The 32-byte raw key is split into two 16-byte halves that are encrypted
//! independently, so the halves run on two scoped threads. The result is
//! always assembled first half, second half.

use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::crypto::hash::sha256_unchecked;
use crate::crypto::{Direction, SymmetricAlgorithm, SymmetricCipher, SymmetricMode};
use crate::error::{KdbxError, Result};

/// Required transform seed length
pub const TRANSFORM_SEED_LENGTH: usize = 32;

const HALF_LENGTH: usize = 16;
const BENCHMARK_BATCH: u64 = 10_000;

/// Encrypt `key` in place `rounds` times with AES-256-ECB keyed by `seed`
///
/// # Arguments
/// * `key` - data to transform, a multiple of 16 bytes
/// * `seed` - 32-byte AES key
/// * `rounds` - how many times the block encryption is repeated
pub fn transform_key_raw(key: &[u8], seed: &[u8], rounds: u64) -> Result<Vec<u8>> {
    let mut cipher = SymmetricCipher::new(
        SymmetricAlgorithm::Aes256,
        SymmetricMode::Ecb,
        Direction::Encrypt,
    );
    cipher
        .init(seed, &[])
        .map_err(|err| KdbxError::KeyTransform(err.to_string()))?;

    let mut result = key.to_vec();
    cipher
        .process_in_place_rounds(&mut result, rounds)
        .map_err(|err| KdbxError::KeyTransform(err.to_string()))?;
    Ok(result)
}

/// Full transform of a 32-byte raw key
///
/// Returns SHA-256 of the two transformed halves. Fails when `rounds` is 0,
/// the seed is not 32 bytes, or the cipher cannot be set up.
pub fn transform_key(raw_key: &[u8], seed: &[u8], rounds: u64) -> Result<Vec<u8>> {
    if rounds == 0 {
        return Err(KdbxError::KeyTransform(
            "Transform rounds must be greater than 0".to_string(),
        ));
    }
    if seed.len() != TRANSFORM_SEED_LENGTH {
        return Err(KdbxError::KeyTransform(format!(
            "Transform seed must be {} bytes, got {}",
            TRANSFORM_SEED_LENGTH,
            seed.len()
        )));
    }
    if raw_key.len() != 2 * HALF_LENGTH {
        return Err(KdbxError::KeyTransform(format!(
            "Raw key must be {} bytes, got {}",
            2 * HALF_LENGTH,
            raw_key.len()
        )));
    }

    let (left, right) = raw_key.split_at(HALF_LENGTH);
    let (first, second) = thread::scope(|scope| {
        let worker = scope.spawn(|| transform_key_raw(left, seed, rounds));
        let second = transform_key_raw(right, seed, rounds);
        let first = worker.join().unwrap_or_else(|_| {
            Err(KdbxError::KeyTransform("Transform worker panicked".to_string()))
        });
        (first, second)
    });

    let mut combined = first?;
    combined.extend_from_slice(&second?);
    let transformed = sha256_unchecked(&combined).to_vec();
    zeroize::Zeroize::zeroize(&mut combined);
    Ok(transformed)
}

/// Rounds one worker completes before `deadline`
fn benchmark_worker(deadline: Instant) -> u64 {
    let key = [0x7Eu8; HALF_LENGTH];
    let seed = [0x4Bu8; TRANSFORM_SEED_LENGTH];

    let mut cipher = SymmetricCipher::new(
        SymmetricAlgorithm::Aes256,
        SymmetricMode::Ecb,
        Direction::Encrypt,
    );
    if cipher.init(&seed, &[]).is_err() {
        return 0;
    }

    let mut block = key;
    let mut rounds: u64 = 0;
    loop {
        if cipher
            .process_in_place_rounds(&mut block, BENCHMARK_BATCH)
            .is_err()
        {
            break;
        }
        rounds += BENCHMARK_BATCH;
        if Instant::now() >= deadline {
            break;
        }
    }
    rounds
}

/// Measure how many transform rounds fit in `duration_ms`
///
/// Two workers run concurrently, like the real transform; the smaller of
/// their counts is returned.
pub fn benchmark_rounds(duration_ms: u64) -> u64 {
    let deadline = Instant::now() + Duration::from_millis(duration_ms);
    let (a, b) = thread::scope(|scope| {
        let worker = scope.spawn(|| benchmark_worker(deadline));
        let b = benchmark_worker(deadline);
        (worker.join().unwrap_or(0), b)
    });
    let rounds = a.min(b);
    debug!(duration_ms, rounds, "transform benchmark finished");
    rounds
}
