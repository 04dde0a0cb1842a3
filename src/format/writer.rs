//! Container writer
//!
//! Every save draws a fresh master seed, IV, inner stream key and start
//! bytes. The transform seed and rounds come from the database's key data.

use std::io::Write;

use flate2::Compression;
use flate2::write::GzEncoder;
use tracing::debug;

use super::header::{self, CompleteHeader};
use super::random_stream::ProtectedStream;
use super::streams::{CipherWriter, HashedBlockWriter};
use super::CIPHER_AES;
use crate::config::WriterOptions;
use crate::crypto::{
    self, CryptoHash, Direction, HashAlgorithm, SymmetricAlgorithm, SymmetricCipher,
    SymmetricMode, random_bytes,
};
use crate::error::{KdbxError, Result};
use crate::model::{CompressionAlgorithm, Database};
use crate::xml::XmlWriter;

/// Writes databases as KDBX 3.1
#[derive(Debug, Clone, Default)]
pub struct KdbxWriter {
    options: WriterOptions,
}

impl KdbxWriter {
    pub fn new(options: WriterOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &WriterOptions {
        &self.options
    }

    /// Serialize and encrypt `database` with its current key
    ///
    /// # Errors
    /// Fails when the database has no key, names an unsupported cipher, or
    /// any layer fails to write or flush.
    pub fn write_database<W: Write>(&self, writer: &mut W, database: &Database) -> Result<()> {
        let header = self.prepare(database)?;
        let header_bytes = header::write_header(&header, &CIPHER_AES)?;
        let header_hash = CryptoHash::hash(&header_bytes, HashAlgorithm::Sha256);

        let mut stream = ProtectedStream::new(&header.protected_stream_key)?;
        let document = XmlWriter::new(self.options.indent).write_database(
            database,
            Some(&header_hash),
            Some(&mut stream),
        )?;

        self.write_container(writer, database, &header, &header_bytes, &document)
    }

    /// Frame an already serialized document
    ///
    /// The document is written as is, so protected values in it must not
    /// depend on an inner stream key; `ProtectInMemory` values are fine.
    pub fn write_raw_document<W: Write>(
        &self,
        writer: &mut W,
        database: &Database,
        document: &[u8],
    ) -> Result<()> {
        let header = self.prepare(database)?;
        let header_bytes = header::write_header(&header, &CIPHER_AES)?;
        self.write_container(writer, database, &header, &header_bytes, document)
    }

    fn prepare(&self, database: &Database) -> Result<CompleteHeader> {
        if !crypto::is_initialized() {
            return Err(KdbxError::CryptoNotInitialized);
        }
        if !database.has_key() {
            return Err(KdbxError::InvalidOperation("database has no key".to_string()));
        }
        if database.cipher() != CIPHER_AES {
            return Err(KdbxError::InvalidHeader("Unsupported cipher".to_string()));
        }

        Ok(CompleteHeader {
            compression: database.compression(),
            master_seed: random_bytes(32),
            transform_seed: database.transform_seed().to_vec(),
            transform_rounds: database.transform_rounds(),
            encryption_iv: random_bytes(16),
            protected_stream_key: random_bytes(32),
            stream_start_bytes: random_bytes(32),
        })
    }

    fn write_container<W: Write>(
        &self,
        writer: &mut W,
        database: &Database,
        header: &CompleteHeader,
        header_bytes: &[u8],
        document: &[u8],
    ) -> Result<()> {
        let mut hash = CryptoHash::new(HashAlgorithm::Sha256);
        hash.add_data(&header.master_seed);
        hash.add_data(database.transformed_master_key());
        let final_key = hash.result();

        let mut cipher = SymmetricCipher::new(
            SymmetricAlgorithm::Aes256,
            SymmetricMode::Cbc,
            Direction::Encrypt,
        );
        cipher.init(&final_key, &header.encryption_iv)?;

        writer.write_all(header_bytes)?;

        let mut encrypted = CipherWriter::new(&mut *writer, cipher);
        encrypted.write_all(&header.stream_start_bytes)?;

        let mut hashed = HashedBlockWriter::new(encrypted, self.options.hashed_block_size);
        match header.compression {
            CompressionAlgorithm::Gzip => {
                let mut gz = GzEncoder::new(&mut hashed, Compression::default());
                gz.write_all(document)?;
                gz.finish()?;
            }
            CompressionAlgorithm::None => hashed.write_all(document)?,
        }

        let encrypted = hashed.finish()?;
        encrypted.finish()?;
        writer.flush()?;

        debug!(
            bytes = document.len(),
            compression = ?header.compression,
            "database written"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{CompositeKey, PasswordKey};

    fn keyed_database() -> Database {
        assert!(crypto::initialize());
        let mut database = Database::new();
        database.set_transform_rounds(10).unwrap();
        database
            .set_key(&CompositeKey::new().with_key(&PasswordKey::new("pw")))
            .unwrap();
        database
    }

    #[test]
    fn test_refuses_database_without_key() {
        assert!(crypto::initialize());
        let database = Database::new();
        let mut out = Vec::new();
        let err = KdbxWriter::default().write_database(&mut out, &database).unwrap_err();
        assert!(matches!(err, KdbxError::InvalidOperation(_)));
        assert!(out.is_empty());
    }

    #[test]
    fn test_fresh_random_fields_per_save() {
        let database = keyed_database();
        let writer = KdbxWriter::default();
        let mut first = Vec::new();
        let mut second = Vec::new();
        writer.write_database(&mut first, &database).unwrap();
        writer.write_database(&mut second, &database).unwrap();

        assert_eq!(&first[..12], &second[..12]);
        assert_ne!(first, second);
    }

    #[test]
    fn test_small_blocks() {
        let database = keyed_database();
        let writer = KdbxWriter::new(WriterOptions {
            hashed_block_size: 64,
            indent: false,
        });
        let mut out = Vec::new();
        writer.write_database(&mut out, &database).unwrap();

        let key = CompositeKey::new().with_key(&PasswordKey::new("pw"));
        let reopened = super::super::open(&mut out.as_slice(), &key).unwrap();
        assert_eq!(reopened.root_group().name(), database.root_group().name());
    }

    struct FailingWriter;

    impl Write for FailingWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::other("device failure"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_device_error_propagates() {
        let database = keyed_database();
        let err = KdbxWriter::default()
            .write_database(&mut FailingWriter, &database)
            .unwrap_err();
        match err {
            KdbxError::Io(inner) => assert!(inner.to_string().contains("device failure")),
            other => panic!("Expected Io, got {:?}", other),
        }
    }
}
