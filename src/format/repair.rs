//! Best-effort recovery of documents broken by invalid control characters
//!
//! The container must decrypt and verify; only the XML stage is repaired.
//! Bytes are removed from the raw document without decoding it, so a
//! multi-byte UTF-8 sequence is never inspected as a whole.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use tracing::{info, warn};

use super::reader::KdbxReader;
use crate::config::ReaderOptions;
use crate::error::KdbxError;
use crate::keys::CompositeKey;
use crate::model::Database;
use crate::xml::sanitize::is_invalid_control_byte;

/// Result of [`repair`]
#[derive(Debug)]
pub enum RepairOutcome {
    /// The database opened normally
    NothingToDo,
    /// The failure happened before the document stage
    UnableToOpen(KdbxError),
    /// The repaired database; verify it before saving it over the original
    Success(Database),
    /// The document could not be repaired
    Failed(KdbxError),
}

impl RepairOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RepairOutcome::Success(_))
    }
}

/// Try to open `reader`, stripping invalid control bytes from the document
/// if a normal open fails
pub fn repair<R: Read>(reader: &mut R, key: &CompositeKey) -> RepairOutcome {
    let mut kdbx = KdbxReader::new(ReaderOptions {
        strict: false,
        save_xml: true,
    });

    let error = match kdbx.read_database(reader, key) {
        Ok(_) => return RepairOutcome::NothingToDo,
        Err(err) => err,
    };

    let Some(document) = kdbx.xml_data() else {
        return RepairOutcome::UnableToOpen(error);
    };
    let mut document = document.to_vec();

    if let Some(encoding) = declared_encoding(&document).filter(|e| !is_utf8_name(e)) {
        warn!("not repairing document with encoding {}", encoding);
        return RepairOutcome::Failed(KdbxError::Document(format!(
            "Unsupported document encoding {}",
            encoding
        )));
    }

    let removed = strip_control_bytes(&mut document);
    if removed == 0 {
        return RepairOutcome::Failed(error);
    }
    info!(removed, "removed invalid control bytes from document");

    match kdbx.reparse(&document, key) {
        Ok(database) => RepairOutcome::Success(database),
        Err(err) => RepairOutcome::Failed(err),
    }
}

/// [`repair`] on a file; the file itself is never modified
pub fn repair_path<P: AsRef<Path>>(path: P, key: &CompositeKey) -> RepairOutcome {
    match File::open(path) {
        Ok(file) => repair(&mut BufReader::new(file), key),
        Err(err) => RepairOutcome::UnableToOpen(err.into()),
    }
}

/// Encoding named in the XML declaration, if any
fn declared_encoding(document: &[u8]) -> Option<String> {
    let end = document
        .windows(2)
        .position(|w| w == b"?>")
        .filter(|_| document.starts_with(b"<?xml"))?;
    let declaration = String::from_utf8_lossy(&document[..end]);

    let rest = &declaration[declaration.find("encoding")? + "encoding".len()..];
    let rest = rest.trim_start().strip_prefix('=')?.trim_start();
    let quote = rest.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let value = &rest[1..];
    let close = value.find(quote)?;
    Some(value[..close].to_string())
}

fn is_utf8_name(encoding: &str) -> bool {
    matches!(encoding.to_ascii_lowercase().as_str(), "utf-8" | "utf8")
}

/// Remove invalid control bytes; returns how many went
fn strip_control_bytes(document: &mut Vec<u8>) -> usize {
    let before = document.len();
    document.retain(|b| !is_invalid_control_byte(*b));
    before - document.len()
}
