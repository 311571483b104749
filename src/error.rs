//! Summary: Error types for the meridian spatial engine.
//! Copyright (c) Meridian. All rights reserved.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Result type alias for meridian operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for meridian database operations.
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// I/O error from filesystem operations.
    Io(io::Error),
    /// JSON encoding or decoding of on-disk data failed.
    Codec(serde_json::Error),
    /// Malformed or out-of-range argument supplied by the caller.
    BadArgument(String),
    /// No record starts at the given byte offset.
    NotFound { offset: i64 },
    /// Index or metadata disagree with the record file.
    Corrupted(String),
    /// An engine is already open over this data directory.
    DatabaseAlreadyOpen(PathBuf),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "I/O error: {err}"),
            Error::Codec(err) => write!(f, "codec error: {err}"),
            Error::BadArgument(msg) => write!(f, "bad argument: {msg}"),
            Error::NotFound { offset } => write!(f, "no record at offset {offset}"),
            Error::Corrupted(msg) => write!(f, "database corrupted: {msg}"),
            Error::DatabaseAlreadyOpen(dir) => {
                write!(f, "database at '{}' is already open", dir.display())
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Codec(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Codec(err)
    }
}
