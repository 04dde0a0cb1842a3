//! Layered body streams: AES-CBC with PKCS#7 padding and hashed blocks
//!
//! Every layer reports its own failures as `io::Error` carrying a
//! [`StreamError`], which the container reader maps back to a specific
//! [`KdbxError`](crate::error::KdbxError).

use std::io::{self, Read, Write};

use block_padding::{Padding, Pkcs7};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use cipher::consts::U16;
use cipher::generic_array::GenericArray;
use thiserror::Error;

use crate::crypto::cipher::BLOCK_SIZE;
use crate::crypto::hash::sha256_unchecked;
use crate::crypto::SymmetricCipher;

const READ_CHUNK: usize = 64 * 1024;

/// Failure inside one of the body layers
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("{0}")]
    BlockVerification(String),
    #[error("{0}")]
    Cipher(String),
}

impl StreamError {
    fn into_io(self) -> io::Error {
        io::Error::new(io::ErrorKind::InvalidData, self)
    }

    /// Typed layer error carried by `err`, if any
    pub fn from_io(err: &io::Error) -> Option<&StreamError> {
        err.get_ref().and_then(|inner| inner.downcast_ref::<StreamError>())
    }
}

fn block_error(message: &str) -> io::Error {
    StreamError::BlockVerification(message.to_string()).into_io()
}

fn cipher_error(message: String) -> io::Error {
    StreamError::Cipher(message).into_io()
}

/// Decrypting reader for a CBC ciphertext with PKCS#7 padding
///
/// The last ciphertext block is held back until the source is exhausted so
/// that its padding can be removed.
pub struct CipherReader<R: Read> {
    inner: R,
    cipher: SymmetricCipher,
    pending: Vec<u8>,
    plain: Vec<u8>,
    pos: usize,
    finished: bool,
}

impl<R: Read> CipherReader<R> {
    /// `cipher` must be initialized for CBC decryption
    pub fn new(inner: R, cipher: SymmetricCipher) -> Self {
        Self {
            inner,
            cipher,
            pending: Vec::new(),
            plain: Vec::new(),
            pos: 0,
            finished: false,
        }
    }

    fn fill(&mut self) -> io::Result<()> {
        let start = self.pending.len();
        self.pending.resize(start + READ_CHUNK, 0);
        let n = loop {
            match self.inner.read(&mut self.pending[start..]) {
                Ok(n) => break n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    self.pending.truncate(start);
                    return Err(err);
                }
            }
        };
        self.pending.truncate(start + n);

        if n == 0 {
            self.finished = true;
            if self.pending.is_empty() || self.pending.len() % BLOCK_SIZE != 0 {
                return Err(cipher_error(format!(
                    "Invalid ciphertext length {}",
                    self.pending.len()
                )));
            }
            let mut data = std::mem::take(&mut self.pending);
            self.cipher
                .process_in_place(&mut data)
                .map_err(|err| cipher_error(err.to_string()))?;
            let last = data.len() - BLOCK_SIZE;
            let block = GenericArray::<u8, U16>::from_slice(&data[last..]);
            let unpadded = <Pkcs7 as Padding<U16>>::unpad(block)
                .map_err(|_| cipher_error("Invalid padding".to_string()))?
                .len();
            data.truncate(last + unpadded);
            self.plain = data;
            self.pos = 0;
            return Ok(());
        }

        let mut keep = self.pending.len() % BLOCK_SIZE;
        if keep == 0 {
            keep = BLOCK_SIZE;
        }
        if self.pending.len() > keep {
            let usable = self.pending.len() - keep;
            let mut data: Vec<u8> = self.pending.drain(..usable).collect();
            self.cipher
                .process_in_place(&mut data)
                .map_err(|err| cipher_error(err.to_string()))?;
            self.plain = data;
            self.pos = 0;
        }
        Ok(())
    }
}

impl<R: Read> Read for CipherReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.pos >= self.plain.len() {
            if self.finished {
                return Ok(0);
            }
            self.fill()?;
        }
        let n = buf.len().min(self.plain.len() - self.pos);
        buf[..n].copy_from_slice(&self.plain[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

/// Encrypting writer producing a CBC ciphertext with PKCS#7 padding
///
/// [`CipherWriter::finish`] must be called to emit the padding block.
pub struct CipherWriter<W: Write> {
    inner: W,
    cipher: SymmetricCipher,
    pending: Vec<u8>,
}

impl<W: Write> CipherWriter<W> {
    /// `cipher` must be initialized for CBC encryption
    pub fn new(inner: W, cipher: SymmetricCipher) -> Self {
        Self {
            inner,
            cipher,
            pending: Vec::new(),
        }
    }

    /// Pad, encrypt the final block and flush
    pub fn finish(mut self) -> io::Result<W> {
        let mut block = GenericArray::<u8, U16>::default();
        let pos = self.pending.len();
        block[..pos].copy_from_slice(&self.pending);
        <Pkcs7 as Padding<U16>>::pad(&mut block, pos);
        self.cipher
            .process_in_place(&mut block)
            .map_err(|err| cipher_error(err.to_string()))?;
        self.inner.write_all(&block)?;
        self.inner.flush()?;
        Ok(self.inner)
    }
}

impl<W: Write> Write for CipherWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);
        let usable = self.pending.len() / BLOCK_SIZE * BLOCK_SIZE;
        if usable > 0 {
            let mut data: Vec<u8> = self.pending.drain(..usable).collect();
            self.cipher
                .process_in_place(&mut data)
                .map_err(|err| cipher_error(err.to_string()))?;
            self.inner.write_all(&data)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Reader verifying the `index | sha256 | size | data` block framing
pub struct HashedBlockReader<R: Read> {
    inner: R,
    buffer: Vec<u8>,
    pos: usize,
    block_index: u32,
    eof: bool,
}

impl<R: Read> HashedBlockReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buffer: Vec::new(),
            pos: 0,
            block_index: 0,
            eof: false,
        }
    }

    fn read_block(&mut self) -> io::Result<()> {
        let eof_error = |err: io::Error| {
            if err.kind() == io::ErrorKind::UnexpectedEof {
                block_error("Unexpected end of hashed block stream")
            } else {
                err
            }
        };

        let index = self.inner.read_u32::<LittleEndian>().map_err(eof_error)?;
        if index != self.block_index {
            return Err(block_error("Invalid block index"));
        }
        let mut hash = [0u8; 32];
        self.inner.read_exact(&mut hash).map_err(eof_error)?;
        let size = self.inner.read_u32::<LittleEndian>().map_err(eof_error)?;

        if size == 0 {
            if hash.iter().any(|&b| b != 0) {
                return Err(block_error("Invalid hash of final block"));
            }
            self.eof = true;
            self.buffer.clear();
            self.pos = 0;
            return Ok(());
        }

        self.buffer.clear();
        (&mut self.inner)
            .take(u64::from(size))
            .read_to_end(&mut self.buffer)?;
        if self.buffer.len() != size as usize {
            return Err(block_error("Block too short"));
        }
        if sha256_unchecked(&self.buffer) != hash {
            return Err(block_error("Mismatch between hash and data"));
        }
        self.pos = 0;
        self.block_index = self.block_index.wrapping_add(1);
        Ok(())
    }
}

impl<R: Read> Read for HashedBlockReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.pos >= self.buffer.len() {
            if self.eof {
                return Ok(0);
            }
            self.read_block()?;
        }
        let n = buf.len().min(self.buffer.len() - self.pos);
        buf[..n].copy_from_slice(&self.buffer[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

/// Writer producing the hashed block framing
///
/// [`HashedBlockWriter::finish`] writes the last data block and the
/// zero-size terminator.
pub struct HashedBlockWriter<W: Write> {
    inner: W,
    block_size: usize,
    buffer: Vec<u8>,
    block_index: u32,
}

impl<W: Write> HashedBlockWriter<W> {
    pub fn new(inner: W, block_size: usize) -> Self {
        let block_size = block_size.max(1);
        Self {
            inner,
            block_size,
            buffer: Vec::with_capacity(block_size),
            block_index: 0,
        }
    }

    fn write_block(&mut self) -> io::Result<()> {
        let size = u32::try_from(self.buffer.len())
            .map_err(|_| block_error("Block too large"))?;
        let hash = if self.buffer.is_empty() {
            [0u8; 32]
        } else {
            sha256_unchecked(&self.buffer)
        };
        self.inner.write_u32::<LittleEndian>(self.block_index)?;
        self.inner.write_all(&hash)?;
        self.inner.write_u32::<LittleEndian>(size)?;
        self.inner.write_all(&self.buffer)?;
        self.buffer.clear();
        self.block_index = self.block_index.wrapping_add(1);
        Ok(())
    }

    pub fn finish(mut self) -> io::Result<W> {
        if !self.buffer.is_empty() {
            self.write_block()?;
        }
        self.write_block()?;
        self.inner.flush()?;
        Ok(self.inner)
    }
}

impl<W: Write> Write for HashedBlockWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut written = 0;
        while written < buf.len() {
            let room = self.block_size - self.buffer.len();
            let n = room.min(buf.len() - written);
            self.buffer.extend_from_slice(&buf[written..written + n]);
            written += n;
            if self.buffer.len() == self.block_size {
                self.write_block()?;
            }
        }
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{Direction, SymmetricAlgorithm, SymmetricMode};

    fn cbc(direction: Direction) -> SymmetricCipher {
        assert!(crate::crypto::initialize());
        let mut cipher = SymmetricCipher::new(SymmetricAlgorithm::Aes256, SymmetricMode::Cbc, direction);
        cipher.init(&[0x21; 32], &[0x42; 16]).unwrap();
        cipher
    }

    fn encrypt(data: &[u8]) -> Vec<u8> {
        let mut writer = CipherWriter::new(Vec::new(), cbc(Direction::Encrypt));
        for chunk in data.chunks(7) {
            writer.write_all(chunk).unwrap();
        }
        writer.finish().unwrap()
    }

    fn decrypt(data: &[u8]) -> io::Result<Vec<u8>> {
        let mut reader = CipherReader::new(data, cbc(Direction::Decrypt));
        let mut out = Vec::new();
        reader.read_to_end(&mut out)?;
        Ok(out)
    }

    #[test]
    fn test_cipher_stream_padding_lengths() {
        for len in [0usize, 1, 15, 16, 17, 31, 32, 1000] {
            let data: Vec<u8> = (0..len).map(|i| i as u8).collect();
            let encrypted = encrypt(&data);
            assert_eq!(encrypted.len(), (len / 16 + 1) * 16);
            assert_eq!(decrypt(&encrypted).unwrap(), data);
        }
    }

    #[test]
    fn test_cipher_stream_large() {
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        assert_eq!(decrypt(&encrypt(&data)).unwrap(), data);
    }

    #[test]
    fn test_cipher_stream_truncated() {
        let encrypted = encrypt(b"some plaintext");
        let err = decrypt(&encrypted[..encrypted.len() - 3]).unwrap_err();
        assert!(matches!(StreamError::from_io(&err), Some(StreamError::Cipher(_))));

        let err = decrypt(&[]).unwrap_err();
        assert!(matches!(StreamError::from_io(&err), Some(StreamError::Cipher(_))));
    }

    fn hashed(data: &[u8], block_size: usize) -> Vec<u8> {
        let mut writer = HashedBlockWriter::new(Vec::new(), block_size);
        writer.write_all(data).unwrap();
        writer.finish().unwrap()
    }

    fn unhashed(data: &[u8]) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        HashedBlockReader::new(data).read_to_end(&mut out)?;
        Ok(out)
    }

    #[test]
    fn test_hashed_blocks_framing() {
        let framed = hashed(b"hello", 1024);
        // one data block plus terminator
        assert_eq!(framed.len(), 40 + 5 + 40);
        assert_eq!(&framed[..4], &[0, 0, 0, 0]);
        assert_eq!(&framed[36..40], &[5, 0, 0, 0]);
        assert_eq!(&framed[45..49], &[1, 0, 0, 0]);
        assert!(framed[49..81].iter().all(|&b| b == 0));
        assert_eq!(unhashed(&framed).unwrap(), b"hello".to_vec());
    }

    #[test]
    fn test_hashed_blocks_multiple() {
        let data: Vec<u8> = (0..1000u32).map(|i| i as u8).collect();
        let framed = hashed(&data, 64);
        assert_eq!(unhashed(&framed).unwrap(), data);
        assert_eq!(hashed(b"", 64).len(), 40);
        assert!(unhashed(&hashed(b"", 64)).unwrap().is_empty());
    }

    #[test]
    fn test_hashed_blocks_detect_corruption() {
        let mut framed = hashed(b"important data", 1024);
        framed[42] ^= 0x01;
        let err = unhashed(&framed).unwrap_err();
        match StreamError::from_io(&err) {
            Some(StreamError::BlockVerification(message)) => {
                assert_eq!(message, "Mismatch between hash and data")
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_hashed_blocks_detect_truncation_and_reorder() {
        let framed = hashed(b"important data", 1024);
        let err = unhashed(&framed[..framed.len() - 10]).unwrap_err();
        assert!(matches!(StreamError::from_io(&err), Some(StreamError::BlockVerification(_))));

        let mut bad_index = framed.clone();
        bad_index[0] = 7;
        let err = unhashed(&bad_index).unwrap_err();
        assert!(matches!(StreamError::from_io(&err), Some(StreamError::BlockVerification(_))));
    }

    #[test]
    fn test_layers_compose() {
        let data = b"layered payload ".repeat(500);
        let cipher_writer = CipherWriter::new(Vec::new(), cbc(Direction::Encrypt));
        let mut block_writer = HashedBlockWriter::new(cipher_writer, 256);
        block_writer.write_all(&data).unwrap();
        let encrypted = block_writer.finish().unwrap().finish().unwrap();

        let cipher_reader = CipherReader::new(&encrypted[..], cbc(Direction::Decrypt));
        let mut out = Vec::new();
        HashedBlockReader::new(cipher_reader).read_to_end(&mut out).unwrap();
        assert_eq!(out, data);
    }
}
