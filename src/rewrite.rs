//! Summary: Copy-on-write rewriter backing update and delete.
//! Copyright (c) Meridian. All rights reserved.
//!
//! Offsets in the record file are load-bearing: the tree and every cached
//! query reference records by byte position. Editing in place would need a
//! gap list and free-space management, so a mutation instead streams the
//! record file into a sibling, elides or replaces one record, rebases every
//! offset after the gap, rebuilds the index from the copy, and renames the
//! sibling generation over the live one.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use log::debug;

use crate::engine::{self, Engine, EngineState, FieldChanges};
use crate::error::{Error, Result};
use crate::meta::{self, Meta};
use crate::point::{Location, Point};
use crate::record;
use crate::rtree::RTree;

/// The two mutations sharing the pipeline.
pub(crate) enum Rewrite<'a> {
    Delete,
    Update(&'a FieldChanges),
}

/// Sibling paths for one rewrite generation, tagged with a random hex
/// suffix. A rewrite that fails before publish leaves them on disk; nothing
/// references them and they are safe to remove manually.
struct Generation {
    records: PathBuf,
    index: PathBuf,
    meta: PathBuf,
}

impl Generation {
    fn new(dir: &Path) -> Self {
        let suffix: u32 = rand::random();
        Self {
            records: dir.join(format!("records-{suffix:08x}.db")),
            index: dir.join(format!("index-{suffix:08x}.db")),
            meta: dir.join(format!("meta-{suffix:08x}.db")),
        }
    }
}

/// Runs the pipeline against the record at `target_offset`.
pub(crate) fn run(engine: &Engine, target_offset: i64, op: Rewrite<'_>) -> Result<Point> {
    let sibling = Generation::new(engine.dir());

    // Held for the whole operation: appends and other rewrites queue here,
    // so nothing can modify records.db between the copy and the publish.
    let _priority = engine.priority_lock.lock();

    let (victim, mut new_file_len) = {
        let _shared = engine.state.read();
        copy_and_elide(&engine.records_path(), &sibling.records, target_offset)?
    };
    let victim = victim.ok_or(Error::NotFound {
        offset: target_offset,
    })?;
    let mut point: Point = serde_json::from_slice(&victim)?;

    let result = match op {
        Rewrite::Delete => point.clone(),
        Rewrite::Update(changes) => {
            changes.apply(&mut point);
            // The rewritten record moves to the tail of the copy.
            point.location.offset = new_file_len;
            new_file_len = record::append_record(&sibling.records, &point)?;
            point.clone()
        }
    };

    let (tree, last_id) = rebuild_index(&sibling.records)?;
    engine::write_index_file(&sibling.index, &tree)?;
    meta::save(
        &sibling.meta,
        Meta {
            file_len: new_file_len,
            last_id,
        },
    )?;

    {
        let mut state = engine.state.write();
        fs::rename(&sibling.records, engine.records_path())?;
        fs::rename(&sibling.index, engine.index_path())?;
        fs::rename(&sibling.meta, engine.meta_path())?;
        *state = EngineState {
            tree,
            file_len: new_file_len,
            last_id,
        };
    }
    debug!(
        "published rewrite of offset {target_offset}: file_len={new_file_len} last_id={last_id}"
    );
    Ok(result)
}

/// Streams `source` into `dest`, eliding the record at `target_offset`.
///
/// Records before the target copy verbatim. The target's bytes are captured
/// and not written. Records after the target are decoded, their offset set
/// to the exact byte position they land at in the copy, re-encoded, and
/// written. Returns the captured bytes (if the target was found) and the
/// copy's size by stat.
fn copy_and_elide(
    source: &Path,
    dest: &Path,
    target_offset: i64,
) -> Result<(Option<Vec<u8>>, i64)> {
    let mut writer = BufWriter::new(File::create(dest)?);
    let mut victim: Option<Vec<u8>> = None;
    let mut byte_pointer: i64 = 0;

    for raw in record::scan(source)? {
        let raw = raw?;
        if raw.offset < target_offset {
            writer.write_all(raw.bytes())?;
            writer.write_all(b"\n")?;
            byte_pointer += raw.bytes().len() as i64 + 1;
        } else if raw.offset == target_offset {
            victim = Some(raw.bytes().to_vec());
        } else {
            let mut point = raw.decode()?;
            point.location.offset = byte_pointer;
            let encoded = serde_json::to_vec(&point)?;
            writer.write_all(&encoded)?;
            writer.write_all(b"\n")?;
            byte_pointer += encoded.len() as i64 + 1;
        }
    }

    writer.flush()?;
    let file = writer
        .into_inner()
        .map_err(|err| Error::Io(err.into_error()))?;
    record::sync_file(&file)?;
    let copied_len = file.metadata()?.len() as i64;
    Ok((victim, copied_len))
}

/// Scans the copy and builds a fresh tree whose leaf offsets are the true
/// byte positions, tracking the maximum id as the copy's last id (-1 when
/// the copy is empty).
fn rebuild_index(path: &Path) -> Result<(RTree, i64)> {
    let mut tree = RTree::new();
    let mut last_id: i64 = -1;
    for raw in record::scan(path)? {
        let raw = raw?;
        let point = raw.decode()?;
        tree.insert(Location::new(
            point.location.latitude,
            point.location.longitude,
            raw.offset,
        ));
        last_id = last_id.max(point.id);
    }
    Ok((tree, last_id))
}
