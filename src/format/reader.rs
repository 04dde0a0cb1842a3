//! Container reader
//!
//! Header, key derivation, then the body layers from the outside in:
//! AES-256-CBC, start bytes, hashed blocks, optional gzip, XML document.

use std::fmt;
use std::io::{self, Read};

use flate2::read::GzDecoder;
use tracing::{debug, warn};

use super::header::{self, CaptureReader, CompleteHeader, Header};
use super::random_stream::ProtectedStream;
use super::streams::{CipherReader, HashedBlockReader, StreamError};
use super::CIPHER_AES;
use crate::config::ReaderOptions;
use crate::crypto::{
    self, CryptoHash, Direction, HashAlgorithm, SymmetricAlgorithm, SymmetricCipher,
    SymmetricMode,
};
use crate::error::{KdbxError, Result};
use crate::keys::CompositeKey;
use crate::model::{CompressionAlgorithm, Database};
use crate::xml::{ParsedDocument, XmlReader};

/// Position of a [`KdbxReader`] in the read sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadState {
    Start,
    MagicVerified,
    VersionVerified,
    ReadingHeaderFields,
    HeaderComplete,
    KeyDerived,
    BodyDecrypted,
    BodyVerified,
    BodyDecompressed,
    DocumentParsed,
    Done,
    Error,
}

impl fmt::Display for ReadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Reads one database from a KDBX 3.1 stream
#[derive(Debug)]
pub struct KdbxReader {
    options: ReaderOptions,
    state: ReadState,
    warnings: Vec<String>,
    xml_data: Option<Vec<u8>>,
    header: Option<(CompleteHeader, Vec<u8>)>,
}

impl Default for KdbxReader {
    fn default() -> Self {
        Self::new(ReaderOptions::default())
    }
}

impl KdbxReader {
    pub fn new(options: ReaderOptions) -> Self {
        Self {
            options,
            state: ReadState::Start,
            warnings: Vec::new(),
            xml_data: None,
            header: None,
        }
    }

    pub fn options(&self) -> &ReaderOptions {
        &self.options
    }

    /// Where the last read got to; `Error` if it failed
    pub fn state(&self) -> ReadState {
        self.state
    }

    /// Problems the last read repaired or tolerated
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Decompressed document of the last read, kept when `save_xml` is set
    ///
    /// Available even if parsing the document failed.
    pub fn xml_data(&self) -> Option<&[u8]> {
        self.xml_data.as_deref()
    }

    /// Inner stream key from the header of the last read
    pub fn protected_stream_key(&self) -> Option<&[u8]> {
        self.header
            .as_ref()
            .map(|(header, _)| header.protected_stream_key.as_slice())
    }

    /// Read and decrypt a whole database
    ///
    /// # Errors
    /// Fails on any structural, authentication or document error; no
    /// partial database is returned.
    pub fn read_database<R: Read>(&mut self, reader: &mut R, key: &CompositeKey) -> Result<Database> {
        self.state = ReadState::Start;
        self.warnings.clear();
        self.xml_data = None;
        self.header = None;

        let result = self.read_stages(reader, key);
        match &result {
            Ok(_) => self.state = ReadState::Done,
            Err(err) => {
                debug!(state = %self.state, "read failed: {}", err);
                self.state = ReadState::Error;
            }
        }
        result
    }

    fn read_stages<R: Read>(&mut self, reader: &mut R, key: &CompositeKey) -> Result<Database> {
        if !crypto::is_initialized() {
            return Err(KdbxError::CryptoNotInitialized);
        }

        let (header, header_bytes) = self.read_header(reader)?;
        self.header = Some((header.clone(), header_bytes.clone()));

        let transformed = key.transform(&header.transform_seed, header.transform_rounds)?;
        let mut hash = CryptoHash::new(HashAlgorithm::Sha256);
        hash.add_data(&header.master_seed);
        hash.add_data(&transformed);
        let final_key = hash.result();
        self.state = ReadState::KeyDerived;

        let mut cipher = SymmetricCipher::new(
            SymmetricAlgorithm::Aes256,
            SymmetricMode::Cbc,
            Direction::Decrypt,
        );
        cipher.init(&final_key, &header.encryption_iv)?;
        let mut body = CipherReader::new(reader, cipher);

        let mut start_bytes = [0u8; 32];
        match body.read_exact(&mut start_bytes) {
            Ok(()) if start_bytes[..] == header.stream_start_bytes[..] => {}
            _ => return Err(KdbxError::WrongKey),
        }
        self.state = ReadState::BodyDecrypted;

        let mut payload = Vec::new();
        HashedBlockReader::new(body)
            .read_to_end(&mut payload)
            .map_err(body_error)?;
        self.state = ReadState::BodyVerified;

        let xml = match header.compression {
            CompressionAlgorithm::Gzip => {
                let mut xml = Vec::new();
                GzDecoder::new(payload.as_slice())
                    .read_to_end(&mut xml)
                    .map_err(|err| KdbxError::Decompression(err.to_string()))?;
                xml
            }
            CompressionAlgorithm::None => payload,
        };
        self.state = ReadState::BodyDecompressed;

        if self.options.save_xml {
            self.xml_data = Some(xml.clone());
        }

        let parsed = self.parse_document(&xml, &header.protected_stream_key)?;
        let mut database = self.verify_header_hash(parsed, &header_bytes)?;
        self.state = ReadState::DocumentParsed;

        install_header(&mut database, key, &header, transformed);
        Ok(database)
    }

    fn read_header<R: Read>(&mut self, reader: &mut R) -> Result<(CompleteHeader, Vec<u8>)> {
        let mut capture = CaptureReader::new(reader);

        header::read_signatures(&mut capture)?;
        self.state = ReadState::MagicVerified;

        let version = header::read_version(&mut capture)?;
        debug!("file version {:#010x}", version);
        self.state = ReadState::VersionVerified;

        self.state = ReadState::ReadingHeaderFields;
        let mut fields = Header::default();
        while header::read_header_field(&mut capture, &mut fields)? {}

        let complete = fields.complete()?;
        self.state = ReadState::HeaderComplete;
        Ok((complete, capture.into_captured()))
    }

    fn parse_document(&mut self, xml: &[u8], stream_key: &[u8]) -> Result<ParsedDocument> {
        let mut stream = ProtectedStream::new(stream_key)?;
        let parsed = XmlReader::new(self.options.strict).read_database(xml, Some(&mut stream))?;
        self.warnings.extend(parsed.warnings.iter().cloned());
        Ok(parsed)
    }

    fn verify_header_hash(&mut self, parsed: ParsedDocument, header_bytes: &[u8]) -> Result<Database> {
        if let Some(stored) = &parsed.header_hash {
            let actual = CryptoHash::hash(header_bytes, HashAlgorithm::Sha256);
            if *stored != actual {
                if self.options.strict {
                    return Err(KdbxError::HeaderHashMismatch);
                }
                let message = KdbxError::HeaderHashMismatch.to_string();
                warn!("{}", message);
                self.warnings.push(message);
            }
        }
        Ok(parsed.database)
    }

    /// Parse an edited copy of the last document under the header of the
    /// last read
    pub(crate) fn reparse(&mut self, xml: &[u8], key: &CompositeKey) -> Result<Database> {
        let (header, header_bytes) = self
            .header
            .clone()
            .ok_or_else(|| KdbxError::InvalidOperation("no previous read to repair".to_string()))?;
        self.warnings.clear();

        let result = self.parse_document(xml, &header.protected_stream_key).and_then(|parsed| {
            let mut database = self.verify_header_hash(parsed, &header_bytes)?;
            let transformed = key.transform(&header.transform_seed, header.transform_rounds)?;
            install_header(&mut database, key, &header, transformed);
            Ok(database)
        });
        self.state = if result.is_ok() { ReadState::Done } else { ReadState::Error };
        result
    }
}

fn install_header(database: &mut Database, key: &CompositeKey, header: &CompleteHeader, transformed: Vec<u8>) {
    database.install_key_data(
        key,
        header.transform_seed.clone(),
        header.transform_rounds,
        transformed,
    );
    database.set_compression(header.compression);
    database.set_cipher(CIPHER_AES);
}

/// Map an error from the hashed block or cipher layer to its error class
fn body_error(err: io::Error) -> KdbxError {
    match StreamError::from_io(&err) {
        Some(StreamError::BlockVerification(message)) => KdbxError::BlockVerification(message.clone()),
        Some(StreamError::Cipher(message)) => KdbxError::Cipher(message.clone()),
        None => KdbxError::Io(err),
    }
}
