//! Summary: Append-only record file operations.
//! Copyright (c) Meridian. All rights reserved.
//!
//! The record file is a newline-delimited sequence of JSON-encoded points in
//! insertion order. Byte offsets are stable between mutations; the rewriter
//! renumbers them. Every operation takes an explicit path so the mutation
//! pipeline can target sibling files.

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::Path;

use crate::error::{Error, Result};
use crate::point::Point;

/// Persists file contents with fdatasync on Unix, falling back to sync_all
/// elsewhere. fdatasync skips the metadata flush that fsync pays for.
#[inline]
pub(crate) fn sync_file(file: &File) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::io::AsRawFd;

        // SAFETY: fdatasync is a standard POSIX call, safe with a valid fd.
        let ret = unsafe { libc::fdatasync(file.as_raw_fd()) };
        if ret != 0 {
            return Err(Error::Io(io::Error::last_os_error()));
        }
        Ok(())
    }

    #[cfg(not(unix))]
    {
        file.sync_all().map_err(Error::Io)
    }
}

/// Appends `json(point) + "\n"` to the file, fsyncs, and returns the
/// post-write size by stat.
pub fn append_record(path: &Path, point: &Point) -> Result<i64> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut line = serde_json::to_vec(point)?;
    line.push(b'\n');
    file.write_all(&line)?;
    sync_file(&file)?;
    Ok(file.metadata()?.len() as i64)
}

/// Reads the records starting at the given offsets, in input order.
///
/// Offsets must be strictly increasing: the reader only seeks forward, by
/// discarding `offset - cursor` bytes before each record. Duplicate offsets
/// are rejected along with any other backward seek.
pub fn read_records(path: &Path, offsets: &[i64]) -> Result<Vec<Point>> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut points = Vec::with_capacity(offsets.len());
    let mut cursor: i64 = 0;
    for &offset in offsets {
        if offset < cursor {
            return Err(Error::BadArgument(format!(
                "record offsets must be strictly increasing ({offset} after cursor {cursor})"
            )));
        }
        skip_forward(&mut reader, (offset - cursor) as u64)?;
        let mut line = String::new();
        let consumed = reader.read_line(&mut line)?;
        if consumed == 0 {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("record file ended before offset {offset}"),
            )));
        }
        points.push(serde_json::from_str(line.trim_end_matches('\n'))?);
        cursor = offset + consumed as i64;
    }
    Ok(points)
}

fn skip_forward<R: Read>(reader: &mut R, count: u64) -> Result<()> {
    if count == 0 {
        return Ok(());
    }
    let skipped = io::copy(&mut reader.take(count), &mut io::sink())?;
    if skipped < count {
        return Err(Error::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "record file ended inside a forward seek",
        )));
    }
    Ok(())
}

/// One raw line of the record file, positioned at `offset`.
#[derive(Debug, Clone)]
pub struct RawRecord {
    /// Byte position of the record's first byte.
    pub offset: i64,
    stored_len: i64,
    line: Vec<u8>,
}

impl RawRecord {
    /// The record's JSON bytes, without the terminating newline.
    pub fn bytes(&self) -> &[u8] {
        &self.line
    }

    /// On-disk length including the terminator.
    pub fn stored_len(&self) -> i64 {
        self.stored_len
    }

    pub fn decode(&self) -> Result<Point> {
        Ok(serde_json::from_slice(&self.line)?)
    }
}

/// Lazy full-file traversal yielding raw records with their offsets. Used by
/// the rewriter's copy phase and the index rebuild.
pub fn scan(path: &Path) -> Result<RecordScan> {
    Ok(RecordScan {
        reader: BufReader::new(File::open(path)?),
        offset: 0,
    })
}

pub struct RecordScan {
    reader: BufReader<File>,
    offset: i64,
}

impl Iterator for RecordScan {
    type Item = Result<RawRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut line = Vec::new();
        match self.reader.read_until(b'\n', &mut line) {
            Ok(0) => None,
            Ok(consumed) => {
                let offset = self.offset;
                self.offset += consumed as i64;
                if line.last() == Some(&b'\n') {
                    line.pop();
                }
                Some(Ok(RawRecord {
                    offset,
                    stored_len: consumed as i64,
                    line,
                }))
            }
            Err(err) => Some(Err(err.into())),
        }
    }
}
