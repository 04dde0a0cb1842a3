//! Comprehensive tests for the crypto module

use super::cipher::{Direction, SymmetricAlgorithm, SymmetricCipher, SymmetricMode};
use super::hash::{CryptoHash, HashAlgorithm};
use super::random::random_bytes;

fn round_trip(algorithm: SymmetricAlgorithm, mode: SymmetricMode, key: &[u8], iv: &[u8], data: &[u8]) {
    let mut encryptor = SymmetricCipher::new(algorithm, mode, Direction::Encrypt);
    encryptor.init(key, iv).unwrap();
    let encrypted = encryptor.process(data).unwrap();
    assert_eq!(encrypted.len(), data.len());

    let mut decryptor = SymmetricCipher::new(algorithm, mode, Direction::Decrypt);
    decryptor.init(key, iv).unwrap();
    let decrypted = decryptor.process(&encrypted).unwrap();
    assert_eq!(decrypted, data);
}

/// Random keys and block-aligned payloads through every block cipher mode
#[test]
fn test_stress_block_ciphers() {
    use rand::Rng;
    assert!(super::initialize());
    let mut rng = rand::rng();

    for i in 0..100 {
        let blocks: usize = rng.random_range(1..64);
        let data = random_bytes(blocks * 16);
        let key = random_bytes(32);
        let iv = random_bytes(16);

        for (algorithm, mode) in [
            (SymmetricAlgorithm::Aes256, SymmetricMode::Cbc),
            (SymmetricAlgorithm::Aes256, SymmetricMode::Ecb),
            (SymmetricAlgorithm::Twofish, SymmetricMode::Cbc),
            (SymmetricAlgorithm::Twofish, SymmetricMode::Ecb),
        ] {
            round_trip(algorithm, mode, &key, &iv, &data);
        }
        assert_eq!(data.len(), blocks * 16, "iteration {}", i);
    }
}

/// Unaligned payloads through the stream cipher
#[test]
fn test_stress_salsa20() {
    use rand::Rng;
    assert!(super::initialize());
    let mut rng = rand::rng();

    for _ in 0..100 {
        let len: usize = rng.random_range(0..1000);
        let data = random_bytes(len);
        round_trip(
            SymmetricAlgorithm::Salsa20,
            SymmetricMode::Stream,
            &random_bytes(32),
            &random_bytes(8),
            &data,
        );
    }
}

/// Stream cipher state carries across calls: two halves equal one whole
#[test]
fn test_salsa20_keystream_is_continuous() {
    assert!(super::initialize());
    let key = [3u8; 32];
    let iv = [4u8; 8];

    let mut whole = SymmetricCipher::new(SymmetricAlgorithm::Salsa20, SymmetricMode::Stream, Direction::Encrypt);
    whole.init(&key, &iv).unwrap();
    let expected = whole.process(&[0u8; 100]).unwrap();

    let mut pieces = SymmetricCipher::new(SymmetricAlgorithm::Salsa20, SymmetricMode::Stream, Direction::Encrypt);
    pieces.init(&key, &iv).unwrap();
    let mut actual = pieces.process(&[0u8; 37]).unwrap();
    actual.extend(pieces.process(&[0u8; 63]).unwrap());

    assert_eq!(actual, expected);
}

/// Hashing a large buffer in uneven chunks
#[test]
fn test_hash_large_input() {
    assert!(super::initialize());
    let data = random_bytes(60000);

    let mut hasher = CryptoHash::new(HashAlgorithm::Sha256);
    let mut offset = 0;
    let mut step = 1;
    while offset < data.len() {
        let end = (offset + step).min(data.len());
        hasher.add_data(&data[offset..end]);
        offset = end;
        step = step * 3 + 1;
    }
    assert_eq!(hasher.result(), CryptoHash::hash(&data, HashAlgorithm::Sha256));
}

/// Initialize is idempotent once it has succeeded
#[test]
fn test_initialize_twice() {
    assert!(super::initialize());
    assert!(super::initialize());
    assert!(super::is_initialized());
    assert!(super::error_string().is_empty());
}
