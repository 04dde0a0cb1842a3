//! Key file key source
//!
//! Accepted formats, tried in order:
//! 1. KeePass XML key file (`KeyFile/Meta/Version` 1.0, `KeyFile/Key/Data`
//!    holding base64 of the 32-byte key)
//! 2. exactly 32 bytes, used verbatim
//! 3. exactly 64 hex characters, decoded
//! 4. anything else: SHA-256 of the whole file

use std::fmt;
use std::fs;
use std::io::Write;
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tracing::debug;
use xml::reader::{EventReader, XmlEvent};
use xml::writer::{EmitterConfig, XmlEvent as WriterEvent};
use zeroize::Zeroize;

use super::{Key, RAW_KEY_LENGTH};
use crate::crypto::hash::sha256_unchecked;
use crate::crypto::random_bytes;
use crate::error::{KdbxError, Result};

/// Key source loaded from a key file
#[derive(Clone)]
pub struct FileKey {
    raw: Vec<u8>,
}

impl FileKey {
    /// Derive the key from key file contents
    pub fn load(data: &[u8]) -> Result<Self> {
        if data.is_empty() {
            return Err(KdbxError::KeyFile("Key file is empty".to_string()));
        }

        if let Some(raw) = parse_xml_key(data) {
            debug!("loaded XML key file");
            return Ok(Self { raw });
        }
        if data.len() == RAW_KEY_LENGTH {
            return Ok(Self { raw: data.to_vec() });
        }
        if data.len() == 2 * RAW_KEY_LENGTH {
            if let Ok(raw) = hex::decode(data) {
                return Ok(Self { raw });
            }
        }
        Ok(Self {
            raw: sha256_unchecked(data).to_vec(),
        })
    }

    /// Load a key file from disk
    pub fn load_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = fs::read(path.as_ref()).map_err(|err| {
            KdbxError::KeyFile(format!("{}: {}", path.as_ref().display(), err))
        })?;
        Self::load(&data)
    }

    /// Write a fresh XML key file with 32 random bytes and return its key
    pub fn create<W: Write>(writer: W) -> Result<Self> {
        let raw = random_bytes(RAW_KEY_LENGTH);
        if raw.len() != RAW_KEY_LENGTH {
            return Err(KdbxError::CryptoNotInitialized);
        }

        let mut xml = EmitterConfig::new()
            .perform_indent(true)
            .create_writer(writer);
        let data = STANDARD.encode(&raw);
        xml.write(WriterEvent::start_element("KeyFile"))?;
        xml.write(WriterEvent::start_element("Meta"))?;
        xml.write(WriterEvent::start_element("Version"))?;
        xml.write(WriterEvent::characters("1.00"))?;
        xml.write(WriterEvent::end_element())?;
        xml.write(WriterEvent::end_element())?;
        xml.write(WriterEvent::start_element("Key"))?;
        xml.write(WriterEvent::start_element("Data"))?;
        xml.write(WriterEvent::characters(&data))?;
        xml.write(WriterEvent::end_element())?;
        xml.write(WriterEvent::end_element())?;
        xml.write(WriterEvent::end_element())?;

        Ok(Self { raw })
    }

    /// Create a key file at `path`
    pub fn create_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = fs::File::create(path.as_ref()).map_err(|err| {
            KdbxError::KeyFile(format!("{}: {}", path.as_ref().display(), err))
        })?;
        Self::create(file)
    }
}

/// Key from a KeePass XML key file, `None` when `data` is not one
fn parse_xml_key(data: &[u8]) -> Option<Vec<u8>> {
    let mut path: Vec<String> = Vec::new();
    let mut version_ok = false;
    let mut key_data: Option<Vec<u8>> = None;

    for event in EventReader::new(data) {
        match event.ok()? {
            XmlEvent::StartElement { name, .. } => {
                if path.is_empty() && name.local_name != "KeyFile" {
                    return None;
                }
                path.push(name.local_name);
            }
            XmlEvent::EndElement { .. } => {
                path.pop();
            }
            XmlEvent::Characters(text) => {
                let location: Vec<&str> = path.iter().map(String::as_str).collect();
                match location.as_slice() {
                    ["KeyFile", "Meta", "Version"] => {
                        let version = text.trim();
                        version_ok = version == "1.0" || version == "1.00";
                    }
                    ["KeyFile", "Key", "Data"] => {
                        key_data = STANDARD.decode(text.trim()).ok();
                    }
                    _ => {}
                }
            }
            _ => {}
        }
    }

    match key_data {
        Some(raw) if version_ok && raw.len() == RAW_KEY_LENGTH => Some(raw),
        _ => None,
    }
}

impl Key for FileKey {
    fn raw_key(&self) -> Vec<u8> {
        self.raw.clone()
    }

    fn clone_key(&self) -> Box<dyn Key> {
        Box::new(self.clone())
    }
}

impl fmt::Debug for FileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FileKey(..)")
    }
}

impl Drop for FileKey {
    fn drop(&mut self) {
        self.raw.zeroize();
    }
}
