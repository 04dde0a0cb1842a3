//! Container header: signatures, version and typed header fields
//!
//! Each field is `id: u8`, `length: u16 LE`, then `length` bytes. Reading
//! stops at the end-of-header field; unknown ids are skipped.

use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use tracing::{debug, warn};

use super::{
    CIPHER_AES, FILE_VERSION, FILE_VERSION_CRITICAL_MASK, FILE_VERSION_MIN, HEADER_END_DATA,
    INNER_STREAM_SALSA20, SIGNATURE_1, SIGNATURE_2,
};
use crate::error::{KdbxError, Result};
use crate::model::{CompressionAlgorithm, Identifier};

/// Header field ids
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HeaderFieldId {
    EndOfHeader = 0,
    Comment = 1,
    CipherId = 2,
    CompressionFlags = 3,
    MasterSeed = 4,
    TransformSeed = 5,
    TransformRounds = 6,
    EncryptionIv = 7,
    ProtectedStreamKey = 8,
    StreamStartBytes = 9,
    InnerRandomStreamId = 10,
}

impl HeaderFieldId {
    pub fn from_u8(value: u8) -> Option<Self> {
        use HeaderFieldId::*;
        Some(match value {
            0 => EndOfHeader,
            1 => Comment,
            2 => CipherId,
            3 => CompressionFlags,
            4 => MasterSeed,
            5 => TransformSeed,
            6 => TransformRounds,
            7 => EncryptionIv,
            8 => ProtectedStreamKey,
            9 => StreamStartBytes,
            10 => InnerRandomStreamId,
            _ => return None,
        })
    }
}

/// Parsed header fields
#[derive(Debug, Clone, Default)]
pub struct Header {
    pub cipher: Option<Identifier>,
    pub compression: CompressionAlgorithm,
    pub master_seed: Option<Vec<u8>>,
    pub transform_seed: Option<Vec<u8>>,
    pub transform_rounds: Option<u64>,
    pub encryption_iv: Option<Vec<u8>>,
    pub protected_stream_key: Option<Vec<u8>>,
    pub stream_start_bytes: Option<Vec<u8>>,
    pub inner_random_stream: u32,
}

/// Header with every required field present
#[derive(Debug, Clone)]
pub(crate) struct CompleteHeader {
    pub compression: CompressionAlgorithm,
    pub master_seed: Vec<u8>,
    pub transform_seed: Vec<u8>,
    pub transform_rounds: u64,
    pub encryption_iv: Vec<u8>,
    pub protected_stream_key: Vec<u8>,
    pub stream_start_bytes: Vec<u8>,
}

impl Header {
    /// Check that everything needed to decrypt the body was present
    pub(crate) fn complete(&self) -> Result<CompleteHeader> {
        match (
            &self.cipher,
            &self.master_seed,
            &self.transform_seed,
            &self.encryption_iv,
            &self.stream_start_bytes,
            &self.protected_stream_key,
        ) {
            (Some(_), Some(master), Some(transform), Some(iv), Some(start), Some(stream_key)) => {
                Ok(CompleteHeader {
                    compression: self.compression,
                    master_seed: master.clone(),
                    transform_seed: transform.clone(),
                    transform_rounds: self.transform_rounds.unwrap_or(crate::DEFAULT_TRANSFORM_ROUNDS),
                    encryption_iv: iv.clone(),
                    protected_stream_key: stream_key.clone(),
                    stream_start_bytes: start.clone(),
                })
            }
            _ => Err(KdbxError::MissingHeaders),
        }
    }
}

/// Reader that keeps a copy of every byte read, for the header hash
pub(crate) struct CaptureReader<'a, R: Read> {
    inner: &'a mut R,
    captured: Vec<u8>,
}

impl<'a, R: Read> CaptureReader<'a, R> {
    pub fn new(inner: &'a mut R) -> Self {
        Self {
            inner,
            captured: Vec::new(),
        }
    }

    pub fn into_captured(self) -> Vec<u8> {
        self.captured
    }
}

impl<R: Read> Read for CaptureReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.captured.extend_from_slice(&buf[..n]);
        Ok(n)
    }
}

fn map_eof(err: io::Error) -> KdbxError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        KdbxError::InvalidHeader("Invalid header data length".to_string())
    } else {
        KdbxError::Io(err)
    }
}

/// Read and check both signatures
pub fn read_signatures<R: Read>(reader: &mut R) -> Result<()> {
    let sig1 = reader.read_u32::<LittleEndian>();
    let sig2 = reader.read_u32::<LittleEndian>();
    match (sig1, sig2) {
        (Ok(SIGNATURE_1), Ok(SIGNATURE_2)) => Ok(()),
        (Err(err), _) | (_, Err(err)) if err.kind() != io::ErrorKind::UnexpectedEof => {
            Err(KdbxError::Io(err))
        }
        _ => Err(KdbxError::BadSignature),
    }
}

/// Read the version and check its major part against the supported range
pub fn read_version<R: Read>(reader: &mut R) -> Result<u32> {
    let version = reader.read_u32::<LittleEndian>().map_err(|err| match err.kind() {
        io::ErrorKind::UnexpectedEof => KdbxError::UnsupportedVersion,
        _ => KdbxError::Io(err),
    })?;
    let major = version & FILE_VERSION_CRITICAL_MASK;
    if major < (FILE_VERSION_MIN & FILE_VERSION_CRITICAL_MASK)
        || major > (FILE_VERSION & FILE_VERSION_CRITICAL_MASK)
    {
        return Err(KdbxError::UnsupportedVersion);
    }
    Ok(version)
}

fn invalid(message: &str) -> KdbxError {
    KdbxError::InvalidHeader(message.to_string())
}

fn expect_length(data: &[u8], length: usize, message: &str) -> Result<()> {
    if data.len() == length {
        Ok(())
    } else {
        Err(invalid(message))
    }
}

/// Read one field into `header`; returns `false` at the end-of-header field
pub fn read_header_field<R: Read>(reader: &mut R, header: &mut Header) -> Result<bool> {
    let id = reader.read_u8().map_err(map_eof)?;
    let length = reader.read_u16::<LittleEndian>().map_err(map_eof)? as usize;
    let mut data = vec![0u8; length];
    reader.read_exact(&mut data).map_err(map_eof)?;

    let Some(field) = HeaderFieldId::from_u8(id) else {
        warn!(field_id = id, length, "skipping unknown header field");
        return Ok(true);
    };

    match field {
        HeaderFieldId::EndOfHeader => return Ok(false),
        HeaderFieldId::Comment => {}
        HeaderFieldId::CipherId => {
            expect_length(&data, 16, "Invalid cipher uuid length")?;
            let cipher = Identifier::from_slice(&data).ok_or_else(|| invalid("Invalid cipher uuid length"))?;
            if cipher != CIPHER_AES {
                return Err(invalid("Unsupported cipher"));
            }
            header.cipher = Some(cipher);
        }
        HeaderFieldId::CompressionFlags => {
            expect_length(&data, 4, "Invalid compression flags length")?;
            let value = (&data[..]).read_u32::<LittleEndian>()?;
            header.compression = CompressionAlgorithm::from_u32(value)
                .ok_or_else(|| invalid("Unsupported compression algorithm"))?;
        }
        HeaderFieldId::MasterSeed => {
            expect_length(&data, 32, "Invalid master seed size")?;
            header.master_seed = Some(data);
        }
        HeaderFieldId::TransformSeed => {
            expect_length(&data, 32, "Invalid transform seed size")?;
            header.transform_seed = Some(data);
        }
        HeaderFieldId::TransformRounds => {
            expect_length(&data, 8, "Invalid transform rounds size")?;
            header.transform_rounds = Some((&data[..]).read_u64::<LittleEndian>()?);
        }
        HeaderFieldId::EncryptionIv => {
            expect_length(&data, 16, "Invalid encryption iv size")?;
            header.encryption_iv = Some(data);
        }
        HeaderFieldId::ProtectedStreamKey => {
            expect_length(&data, 32, "Invalid stream key size")?;
            header.protected_stream_key = Some(data);
        }
        HeaderFieldId::StreamStartBytes => {
            expect_length(&data, 32, "Invalid start bytes size")?;
            header.stream_start_bytes = Some(data);
        }
        HeaderFieldId::InnerRandomStreamId => {
            expect_length(&data, 4, "Invalid inner random stream cipher")?;
            let value = (&data[..]).read_u32::<LittleEndian>()?;
            if value != INNER_STREAM_SALSA20 {
                return Err(invalid("Unsupported random stream algorithm"));
            }
            header.inner_random_stream = value;
        }
    }
    debug!(?field, length, "read header field");
    Ok(true)
}

/// Write one field
pub fn write_header_field<W: Write>(writer: &mut W, id: HeaderFieldId, data: &[u8]) -> Result<()> {
    let length = u16::try_from(data.len())
        .map_err(|_| invalid("Header field too long"))?;
    writer.write_u8(id as u8)?;
    writer.write_u16::<LittleEndian>(length)?;
    writer.write_all(data)?;
    Ok(())
}

/// Serialize signatures, version and every field of a complete header
pub(crate) fn write_header(header: &CompleteHeader, cipher: &Identifier) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    out.write_u32::<LittleEndian>(SIGNATURE_1)?;
    out.write_u32::<LittleEndian>(SIGNATURE_2)?;
    out.write_u32::<LittleEndian>(FILE_VERSION)?;

    write_header_field(&mut out, HeaderFieldId::CipherId, cipher.as_bytes())?;
    write_header_field(
        &mut out,
        HeaderFieldId::CompressionFlags,
        &header.compression.as_u32().to_le_bytes(),
    )?;
    write_header_field(&mut out, HeaderFieldId::MasterSeed, &header.master_seed)?;
    write_header_field(&mut out, HeaderFieldId::TransformSeed, &header.transform_seed)?;
    write_header_field(
        &mut out,
        HeaderFieldId::TransformRounds,
        &header.transform_rounds.to_le_bytes(),
    )?;
    write_header_field(&mut out, HeaderFieldId::EncryptionIv, &header.encryption_iv)?;
    write_header_field(
        &mut out,
        HeaderFieldId::ProtectedStreamKey,
        &header.protected_stream_key,
    )?;
    write_header_field(
        &mut out,
        HeaderFieldId::StreamStartBytes,
        &header.stream_start_bytes,
    )?;
    write_header_field(
        &mut out,
        HeaderFieldId::InnerRandomStreamId,
        &INNER_STREAM_SALSA20.to_le_bytes(),
    )?;
    write_header_field(&mut out, HeaderFieldId::EndOfHeader, &HEADER_END_DATA)?;
    Ok(out)
}
