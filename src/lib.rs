//! # kdbxcore
//!
//! Core of a KeePass 2.x password database: the KDBX 3.1 container, key
//! derivation, the XML document and the in-memory entity model.
//!
//! ## Features
//!
//! - AES-256-CBC container with hashed block verification and gzip
//! - AES-KDF key transformation on two worker threads
//! - Password and key file sources combined into a composite key
//! - Salsa20 protection of sensitive values inside the document
//! - Entry history with count and size limits, recycle bin, deletion log
//! - Strict and lenient document parsing, repair of broken documents
//!
//! ## Example
//!
//! ```no_run
//! use kdbxcore::{CompositeKey, PasswordKey};
//! use std::fs::File;
//!
//! kdbxcore::crypto::initialize();
//! let key = CompositeKey::new().with_key(&PasswordKey::new("my_password"));
//! let mut file = File::open("/path/to/database.kdbx").unwrap();
//! let db = kdbxcore::open(&mut file, &key).unwrap();
//!
//! for entry in db.entries_of(&db.root_group_id()) {
//!     println!("{}: {}", entry.uuid(), entry.title());
//! }
//! ```

pub mod config;
pub mod crypto;
pub mod error;
pub mod format;
pub mod keys;
pub mod model;
pub mod utils;
pub mod xml;

// Re-export main types
pub use config::{ReaderOptions, WriterOptions};
pub use error::{KdbxError, Result};
pub use format::{
    KdbxReader, KdbxWriter, ReadState, RepairOutcome, open, open_path, open_with_options, repair,
    repair_path, save, save_path,
};
pub use keys::{CompositeKey, FileKey, Key, PasswordKey};
pub use model::{
    CompressionAlgorithm, Database, DatabaseEvent, DatabaseRegistry, DeletedObject, Entry, Group,
    GroupTree, Identifier, Metadata, SharedDatabase, TriState,
};

/// Default AES-KDF rounds for new databases and headers without the field
pub const DEFAULT_TRANSFORM_ROUNDS: u64 = 100_000;

/// Generator name written into `Meta/Generator`
pub const GENERATOR_NAME: &str = "kdbxcore";

/// Builtin icon of new groups (folder)
pub const DEFAULT_GROUP_ICON: i32 = 48;

/// Name of the root group of a new database
pub const DEFAULT_ROOT_NAME: &str = "Root";
