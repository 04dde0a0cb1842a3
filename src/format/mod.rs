//! KDBX 3.1 container codec
//!
//! ```text
//! signature1 | signature2 | version | header fields ... | end field
//! AES-256-CBC( start bytes | hashed blocks( [gzip]( XML document ) ) )
//! ```
//!
//! [`open`] and [`save`] are the entry points for hosts; [`KdbxReader`] and
//! [`KdbxWriter`] expose the state and options behind them.

pub mod header;
pub mod random_stream;
pub mod reader;
pub mod repair;
pub mod streams;
pub mod writer;

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::config::{ReaderOptions, WriterOptions};
use crate::error::Result;
use crate::keys::CompositeKey;
use crate::model::{Database, Identifier};

pub use reader::{KdbxReader, ReadState};
pub use repair::{RepairOutcome, repair, repair_path};
pub use writer::KdbxWriter;

/// First file signature
pub const SIGNATURE_1: u32 = 0x9AA2_D903;
/// Second file signature (KeePass 2.x)
pub const SIGNATURE_2: u32 = 0xB54B_FB67;
/// Version written to new files (3.1)
pub const FILE_VERSION: u32 = 0x0003_0001;
/// Oldest readable version
pub const FILE_VERSION_MIN: u32 = 0x0002_0000;
/// Only the major part of the version decides compatibility
pub const FILE_VERSION_CRITICAL_MASK: u32 = 0xFFFF_0000;

/// AES-256 cipher id
pub const CIPHER_AES: Identifier = Identifier::from_bytes([
    0x31, 0xc1, 0xf2, 0xe6, 0xbf, 0x71, 0x43, 0x50, 0xbe, 0x58, 0x05, 0x21, 0x6a, 0xfc, 0x5a, 0xff,
]);

/// Salsa20 inner random stream id
pub const INNER_STREAM_SALSA20: u32 = 2;

/// Data of the end-of-header field
pub const HEADER_END_DATA: [u8; 4] = [0x0D, 0x0A, 0x0D, 0x0A];

/// Open a database with default (lenient) options
pub fn open<R: Read>(reader: &mut R, key: &CompositeKey) -> Result<Database> {
    open_with_options(reader, key, ReaderOptions::default())
}

pub fn open_with_options<R: Read>(
    reader: &mut R,
    key: &CompositeKey,
    options: ReaderOptions,
) -> Result<Database> {
    KdbxReader::new(options).read_database(reader, key)
}

/// Open a database file
pub fn open_path<P: AsRef<Path>>(path: P, key: &CompositeKey) -> Result<Database> {
    let mut file = BufReader::new(File::open(path)?);
    open(&mut file, key)
}

/// Save `database` with its current key and default options
pub fn save<W: Write>(writer: &mut W, database: &Database) -> Result<()> {
    KdbxWriter::new(WriterOptions::default()).write_database(writer, database)
}

/// Save `database` to a file, creating or truncating it
pub fn save_path<P: AsRef<Path>>(path: P, database: &Database) -> Result<()> {
    let mut file = BufWriter::new(File::create(path)?);
    save(&mut file, database)?;
    file.flush()?;
    Ok(())
}
