//! Reader and writer options
//!
//! Plain serde structs so a host application can persist them in its own
//! settings; nothing here reads files or the environment.

use serde::{Deserialize, Serialize};

/// Default size of one hashed block (1 MiB)
pub const DEFAULT_HASHED_BLOCK_SIZE: usize = 1024 * 1024;

/// Options for opening a database
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderOptions {
    /// Fail on document problems that lenient mode repairs or skips, and
    /// treat a header hash mismatch as an error instead of a warning
    pub strict: bool,
    /// Keep the decompressed document bytes for inspection or repair
    pub save_xml: bool,
}

impl ReaderOptions {
    pub fn strict() -> Self {
        Self {
            strict: true,
            ..Self::default()
        }
    }
}

/// Options for saving a database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterOptions {
    /// Payload bytes per hashed block
    pub hashed_block_size: usize,
    /// Indent the XML document
    pub indent: bool,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            hashed_block_size: DEFAULT_HASHED_BLOCK_SIZE,
            indent: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let reader = ReaderOptions::default();
        assert!(!reader.strict);
        assert!(!reader.save_xml);
        assert!(ReaderOptions::strict().strict);

        let writer = WriterOptions::default();
        assert_eq!(writer.hashed_block_size, 1024 * 1024);
        assert!(writer.indent);
    }

    #[test]
    fn test_serde_fills_missing_fields() {
        let reader: ReaderOptions = serde_json::from_str(r#"{"strict": true}"#).unwrap();
        assert_eq!(reader, ReaderOptions::strict());

        let writer: WriterOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(writer, WriterOptions::default());

        let text = serde_json::to_string(&WriterOptions::default()).unwrap();
        assert!(text.contains("hashed_block_size"));
    }
}
