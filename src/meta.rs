//! Summary: Metadata file tying the record file and index together.
//! Copyright (c) Meridian. All rights reserved.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use crate::error::{Error, Result};
use crate::record::sync_file;

/// The two integers published with every generation: the record file's byte
/// length and the last issued point id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Meta {
    pub file_len: i64,
    pub last_id: i64,
}

impl Meta {
    /// State of an empty database: no bytes written, no ids issued.
    pub const EMPTY: Meta = Meta {
        file_len: 0,
        last_id: -1,
    };

    /// Encodes the metadata line, trailing space before the newline
    /// included. The format is fixed: `"<file_len> <last_id> \n"`.
    pub fn encode(&self) -> String {
        format!("{} {} \n", self.file_len, self.last_id)
    }

    /// Parses a metadata line into its two signed 64-bit integers.
    pub fn decode(line: &str) -> Result<Meta> {
        let mut fields = line.split_whitespace();
        let file_len = parse_field(fields.next(), "file length")?;
        let last_id = parse_field(fields.next(), "last id")?;
        Ok(Meta { file_len, last_id })
    }
}

fn parse_field(field: Option<&str>, what: &str) -> Result<i64> {
    let field = field.ok_or_else(|| {
        Error::Corrupted(format!("metadata line is missing the {what} field"))
    })?;
    field.parse().map_err(|_| {
        Error::Corrupted(format!("metadata {what} field {field:?} is not an integer"))
    })
}

/// Reads and parses the single metadata line.
pub fn load(path: &Path) -> Result<Meta> {
    let contents = fs::read_to_string(path)?;
    let line = contents.lines().next().unwrap_or("");
    Meta::decode(line)
}

/// Writes the metadata line, truncating any previous contents, and fsyncs.
pub fn save(path: &Path, meta: Meta) -> Result<()> {
    let mut file = File::create(path)?;
    file.write_all(meta.encode().as_bytes())?;
    sync_file(&file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_encode_exact_format() {
        let meta = Meta {
            file_len: 123,
            last_id: 7,
        };
        assert_eq!(meta.encode(), "123 7 \n");
        assert_eq!(Meta::EMPTY.encode(), "0 -1 \n");
    }

    #[test]
    fn test_decode_roundtrip() {
        let meta = Meta {
            file_len: 9_876_543_210,
            last_id: -1,
        };
        assert_eq!(Meta::decode(&meta.encode()).expect("decode"), meta);
    }

    #[test]
    fn test_decode_rejects_malformed_lines() {
        assert!(matches!(Meta::decode(""), Err(Error::Corrupted(_))));
        assert!(matches!(Meta::decode("123"), Err(Error::Corrupted(_))));
        assert!(matches!(Meta::decode("abc def"), Err(Error::Corrupted(_))));
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("meta.db");
        let meta = Meta {
            file_len: 42,
            last_id: 3,
        };
        save(&path, meta).expect("save");
        assert_eq!(std::fs::read_to_string(&path).expect("read"), "42 3 \n");
        assert_eq!(load(&path).expect("load"), meta);
    }
}
