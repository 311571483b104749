//! Summary: Engine state and the reader/writer concurrency controller.
//! Copyright (c) Meridian. All rights reserved.
//!
//! One engine owns one database directory: the append-only record file, the
//! one-line index dump, and the metadata line, plus the cached in-memory
//! state. All access goes through two primitives, always acquired in this
//! order when both are needed:
//!
//! 1. `priority_lock` - taken by every operation that will hold the file
//!    lock exclusively. A waiting writer holds it while new writers queue
//!    behind it; the rewriter additionally keeps it across its whole run so
//!    no append can land between its copy and publish phases.
//! 2. `state` - a writer-preferring reader/writer lock guarding the three
//!    files and the cached state as one unit. New readers queue behind a
//!    waiting writer, so a writer never waits indefinitely behind
//!    continuous reader arrivals.

use std::collections::BTreeSet;
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{debug, info};
use parking_lot::{Mutex, RwLock};

use crate::error::{Error, Result};
use crate::meta::{self, Meta};
use crate::point::{Location, Point};
use crate::record;
use crate::rect::Rect;
use crate::rewrite;
use crate::rtree::RTree;

/// Append-only point log.
pub const RECORDS_FILE: &str = "records.db";
/// One-line JSON dump of the R-tree.
pub const INDEX_FILE: &str = "index.db";
/// One line holding the record file length and the last issued id.
pub const META_FILE: &str = "meta.db";

/// Data directories with a live engine. A second engine over the same
/// directory would race the generation swap, so construction is refused.
static OPEN_DIRS: Mutex<BTreeSet<PathBuf>> = Mutex::new(BTreeSet::new());

/// The cached view of the current generation. Valid whenever no mutation is
/// in flight: `file_len` equals the record file's real size, the tree holds
/// exactly one leaf per record, and `last_id` is at least every stored id.
pub(crate) struct EngineState {
    pub tree: RTree,
    pub file_len: i64,
    pub last_id: i64,
}

impl EngineState {
    fn empty() -> Self {
        Self {
            tree: RTree::new(),
            file_len: 0,
            last_id: -1,
        }
    }
}

/// A point-in-time copy of the engine's counters, for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineStats {
    pub file_len: i64,
    pub last_id: i64,
    /// Number of locations in the in-memory tree.
    pub indexed: usize,
}

/// Field changes accepted by `update`. Parsed from case-insensitive
/// key/value pairs; unknown keys are ignored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldChanges {
    pub name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl FieldChanges {
    /// Builds changes from key/value pairs. Keys `name`, `lat`, `lng` are
    /// recognized case-insensitively; anything else is ignored. A value for
    /// `lat`/`lng` that does not parse as a finite double is `BadArgument`.
    pub fn parse<'a, I>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut changes = FieldChanges::default();
        for (key, value) in pairs {
            match key.to_ascii_lowercase().as_str() {
                "name" => changes.name = Some(value.to_string()),
                "lat" => changes.latitude = Some(parse_coordinate(key, value)?),
                "lng" => changes.longitude = Some(parse_coordinate(key, value)?),
                _ => {}
            }
        }
        Ok(changes)
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.latitude.is_none() && self.longitude.is_none()
    }

    pub(crate) fn apply(&self, point: &mut Point) {
        if let Some(name) = &self.name {
            point.name = name.clone();
        }
        if let Some(latitude) = self.latitude {
            point.location.latitude = latitude;
        }
        if let Some(longitude) = self.longitude {
            point.location.longitude = longitude;
        }
    }
}

fn parse_coordinate(key: &str, value: &str) -> Result<f64> {
    let parsed: f64 = value
        .parse()
        .map_err(|_| Error::BadArgument(format!("{key} expects a number, got {value:?}")))?;
    if !parsed.is_finite() {
        return Err(Error::BadArgument(format!(
            "{key} must be finite, got {value:?}"
        )));
    }
    Ok(parsed)
}

fn ensure_finite(what: &str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(Error::BadArgument(format!("{what} must be finite")))
    }
}

/// The spatial database engine.
pub struct Engine {
    dir: PathBuf,
    pub(crate) priority_lock: Mutex<()>,
    pub(crate) state: RwLock<EngineState>,
}

impl Engine {
    /// Opens the database in `dir`, creating the directory and any missing
    /// files, and loads the persisted state.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseAlreadyOpen` if another engine in this process
    /// already owns the directory, or any error `load` can produce.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Engine> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        let dir = dir.canonicalize()?;
        {
            let mut open_dirs = OPEN_DIRS.lock();
            if !open_dirs.insert(dir.clone()) {
                return Err(Error::DatabaseAlreadyOpen(dir));
            }
        }

        // From here on, dropping the engine unregisters the directory, so
        // initialization failures do not leak a registry entry.
        let engine = Engine {
            dir,
            priority_lock: Mutex::new(()),
            state: RwLock::new(EngineState::empty()),
        };
        engine.init_files()?;
        engine.load()?;
        info!("opened database at '{}'", engine.dir.display());
        Ok(engine)
    }

    /// Creates any of the three files that do not exist yet, so a fresh
    /// directory starts as a valid empty generation.
    fn init_files(&self) -> Result<()> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.records_path())?;
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.index_path())?;
        if !self.meta_path().exists() {
            meta::save(&self.meta_path(), Meta::EMPTY)?;
        }
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub(crate) fn records_path(&self) -> PathBuf {
        self.dir.join(RECORDS_FILE)
    }

    pub(crate) fn index_path(&self) -> PathBuf {
        self.dir.join(INDEX_FILE)
    }

    pub(crate) fn meta_path(&self) -> PathBuf {
        self.dir.join(META_FILE)
    }

    /// Inserts a new point and returns its assigned location.
    ///
    /// The record is appended and fsynced, the tree gains one leaf, and the
    /// index and metadata files are rewritten so the on-disk generation
    /// stays complete.
    pub fn add(&self, name: &str, latitude: f64, longitude: f64) -> Result<Location> {
        ensure_finite("latitude", latitude)?;
        ensure_finite("longitude", longitude)?;

        let priority = self.priority_lock.lock();
        let mut state = self.state.write();
        // Held only through acquisition: the next writer queues behind the
        // lock we now hold, not behind this whole operation.
        drop(priority);

        let point = Point {
            id: state.last_id + 1,
            name: name.to_string(),
            location: Location::new(latitude, longitude, state.file_len),
        };
        let new_len = record::append_record(&self.records_path(), &point)?;
        state.file_len = new_len;
        state.last_id = point.id;
        state.tree.insert(point.location);
        self.persist_state(&state)?;
        debug!(
            "added id={} offset={} file_len={}",
            point.id, point.location.offset, state.file_len
        );
        Ok(point.location)
    }

    /// Returns every point inside the rectangle spanned by the corner
    /// `(latitude, longitude)` and the given extents, ordered by offset.
    pub fn intersect(
        &self,
        latitude: f64,
        longitude: f64,
        width: f64,
        height: f64,
    ) -> Result<Vec<Point>> {
        ensure_finite("latitude", latitude)?;
        ensure_finite("longitude", longitude)?;
        ensure_finite("width", width)?;
        ensure_finite("height", height)?;
        if width < 0.0 || height < 0.0 {
            return Err(Error::BadArgument(
                "rectangle extents must be non-negative".to_string(),
            ));
        }

        let state = self.state.read();
        let query = Rect::new(latitude, longitude, width, height);
        let mut offsets: Vec<i64> = state
            .tree
            .search_intersect(&query)
            .into_iter()
            .map(|location| location.offset)
            .collect();
        if offsets.is_empty() {
            return Ok(Vec::new());
        }
        offsets.sort_unstable();
        record::read_records(&self.records_path(), &offsets)
    }

    /// Rewrites the record named by `offset` through the copy-on-write
    /// pipeline, applying the given field changes. Returns the updated
    /// point.
    pub fn update(&self, offset: i64, changes: &FieldChanges) -> Result<Point> {
        if let Some(latitude) = changes.latitude {
            ensure_finite("lat", latitude)?;
        }
        if let Some(longitude) = changes.longitude {
            ensure_finite("lng", longitude)?;
        }
        rewrite::run(self, offset, rewrite::Rewrite::Update(changes))
    }

    /// Removes the record named by `offset` through the copy-on-write
    /// pipeline. Returns the deleted point.
    pub fn delete(&self, offset: i64) -> Result<Point> {
        rewrite::run(self, offset, rewrite::Rewrite::Delete)
    }

    /// Serializes the tree to `index.db` and the counters to `meta.db`,
    /// fsyncing both.
    pub fn save(&self) -> Result<()> {
        let priority = self.priority_lock.lock();
        let state = self.state.write();
        drop(priority);
        self.persist_state(&state)?;
        info!(
            "saved index ({} points) and metadata (file_len={}, last_id={})",
            state.tree.len(),
            state.file_len,
            state.last_id
        );
        Ok(())
    }

    /// Replaces the cached state with what the files currently hold.
    ///
    /// A missing or empty index yields an empty tree rather than an error.
    /// Metadata that disagrees with the record file's real size is reported
    /// as `Corrupted` and the cached state is left untouched.
    pub fn load(&self) -> Result<()> {
        let priority = self.priority_lock.lock();
        let mut state = self.state.write();
        drop(priority);

        let tree = match File::open(self.index_path()) {
            Ok(file) => RTree::deserialize(&mut BufReader::new(file))?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => RTree::new(),
            Err(err) => return Err(err.into()),
        };
        let loaded = meta::load(&self.meta_path())?;
        let actual_len = std::fs::metadata(self.records_path())?.len() as i64;
        if actual_len != loaded.file_len {
            return Err(Error::Corrupted(format!(
                "metadata claims {} record bytes but the file holds {}",
                loaded.file_len, actual_len
            )));
        }

        state.tree = tree;
        state.file_len = loaded.file_len;
        state.last_id = loaded.last_id;
        debug!(
            "loaded state: file_len={} last_id={} points={}",
            state.file_len,
            state.last_id,
            state.tree.len()
        );
        Ok(())
    }

    /// The serialized tree as a single JSON line, without the terminator.
    /// Backs the `print` diagnostic command.
    pub fn dump_index(&self) -> Result<String> {
        let state = self.state.read();
        Ok(serde_json::to_string(&state.tree)?)
    }

    /// A consistent snapshot of the engine's counters.
    pub fn stats(&self) -> EngineStats {
        let state = self.state.read();
        EngineStats {
            file_len: state.file_len,
            last_id: state.last_id,
            indexed: state.tree.len(),
        }
    }

    /// Writes the index and metadata files for the given state. The caller
    /// must hold the file lock exclusively.
    fn persist_state(&self, state: &EngineState) -> Result<()> {
        write_index_file(&self.index_path(), &state.tree)?;
        meta::save(
            &self.meta_path(),
            Meta {
                file_len: state.file_len,
                last_id: state.last_id,
            },
        )
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        OPEN_DIRS.lock().remove(&self.dir);
    }
}

/// Serializes the tree to `path` as one JSON line, truncating any previous
/// contents, and fsyncs.
pub(crate) fn write_index_file(path: &Path, tree: &RTree) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    tree.serialize(&mut writer)?;
    writer.flush()?;
    record::sync_file(writer.get_ref())
}
