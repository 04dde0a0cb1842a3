//! Known-answer tests run once by [`super::initialize`]

use super::cipher::{Direction, SymmetricAlgorithm, SymmetricCipher, SymmetricMode};
use super::hash::sha256_unchecked;
use crate::error::{KdbxError, Result};

// NIST SP 800-38A F.2.5 / F.1.5
const AES_KEY: &str = "603deb1015ca71be2b73aef0857d77811f352c073b6108d72d9810a30914dff4";
const AES_IV: &str = "000102030405060708090a0b0c0d0e0f";
const AES_PLAIN: &str = "6bc1bee22e409f96e93d7e117393172aae2d8a571e03ac9c9eb76fac45af8e51";
const AES_CBC_CIPHER: &str = "f58c4c04d6e5f1ba779eabfb5f7bfbd69cfc4e967edb808d679f777bc6702c7d";
const AES_ECB_CIPHER: &str = "f3eed1bdb5d2a03c064b5a7e3db181f8591ccb10d410ed26dc5ba74a31362870";

// Twofish ecb_tbl.txt, KEYSIZE=256 I=1; CBC with a zero IV over one block
const TWOFISH_CIPHER: &str = "57ff739d4dc92c1bd7fc01700cc8216f";

// eSTREAM Salsa20/20 256-bit set 1, vector 0
const SALSA20_KEY: &str = "8000000000000000000000000000000000000000000000000000000000000000";
const SALSA20_STREAM: &str = "e3be8fdd8beca2e3ea8ef9475b29a6e7003951e1097a5c38d23b7a5fad9f6844\
                              b22c97559e2723c7cbbd3fe4fc8d9a0744652a83e72a9c461876af4d7ef1a117";

const SHA256_INPUT: &[u8] = b"abcdbcdecdefdefgefghfghighijhijkijkljklmklmnlmnomnopnopq";
const SHA256_DIGEST: &str = "248d6a61d20638b8e5c026930c3e6039a33ce45964ff2167f6ecedd419db06c1";

/// Run every known-answer test, stopping at the first failure
pub(crate) fn run_all() -> Result<()> {
    test_sha256()?;
    test_aes256_cbc()?;
    test_aes256_ecb()?;
    test_twofish_cbc()?;
    test_salsa20()?;
    Ok(())
}

fn decode(hex_text: &str) -> Result<Vec<u8>> {
    hex::decode(hex_text).map_err(|e| KdbxError::SelfTest(format!("bad test vector: {}", e)))
}

fn test_sha256() -> Result<()> {
    if sha256_unchecked(SHA256_INPUT).as_slice() != decode(SHA256_DIGEST)?.as_slice() {
        return Err(KdbxError::SelfTest("SHA-256 mismatch".to_string()));
    }
    Ok(())
}

fn check_block_cipher(
    name: &str,
    algorithm: SymmetricAlgorithm,
    mode: SymmetricMode,
    key: &[u8],
    iv: &[u8],
    plain: &[u8],
    expected: &[u8],
) -> Result<()> {
    let mut encryptor = SymmetricCipher::new(algorithm, mode, Direction::Encrypt);
    encryptor.init_unchecked(key, iv)?;
    if encryptor.process(plain)? != expected {
        return Err(KdbxError::SelfTest(format!("{} encryption mismatch", name)));
    }

    let mut decryptor = SymmetricCipher::new(algorithm, mode, Direction::Decrypt);
    decryptor.init_unchecked(key, iv)?;
    if decryptor.process(expected)? != plain {
        return Err(KdbxError::SelfTest(format!("{} decryption mismatch", name)));
    }
    Ok(())
}

fn test_aes256_cbc() -> Result<()> {
    check_block_cipher(
        "AES-256-CBC",
        SymmetricAlgorithm::Aes256,
        SymmetricMode::Cbc,
        &decode(AES_KEY)?,
        &decode(AES_IV)?,
        &decode(AES_PLAIN)?,
        &decode(AES_CBC_CIPHER)?,
    )
}

fn test_aes256_ecb() -> Result<()> {
    check_block_cipher(
        "AES-256-ECB",
        SymmetricAlgorithm::Aes256,
        SymmetricMode::Ecb,
        &decode(AES_KEY)?,
        &[],
        &decode(AES_PLAIN)?,
        &decode(AES_ECB_CIPHER)?,
    )
}

fn test_twofish_cbc() -> Result<()> {
    check_block_cipher(
        "Twofish-CBC",
        SymmetricAlgorithm::Twofish,
        SymmetricMode::Cbc,
        &[0u8; 32],
        &[0u8; 16],
        &[0u8; 16],
        &decode(TWOFISH_CIPHER)?,
    )
}

fn test_salsa20() -> Result<()> {
    let mut cipher =
        SymmetricCipher::new(SymmetricAlgorithm::Salsa20, SymmetricMode::Stream, Direction::Encrypt);
    cipher.init_unchecked(&decode(SALSA20_KEY)?, &[0u8; 8])?;
    let keystream = cipher.process(&[0u8; 64])?;
    if keystream != decode(SALSA20_STREAM)? {
        return Err(KdbxError::SelfTest("Salsa20 keystream mismatch".to_string()));
    }
    Ok(())
}
