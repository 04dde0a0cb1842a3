//! KeePass XML document codec
//!
//! The decrypted body of a KDBX 3.1 file is one XML document holding the
//! metadata, the group tree and the deletion log.

pub mod reader;
pub mod sanitize;
pub mod writer;

pub use reader::{ParsedDocument, XmlReader};
pub use sanitize::{is_valid_xml_char, strip_invalid_xml_chars};
pub use writer::XmlWriter;
