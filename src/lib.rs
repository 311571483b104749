//! Summary: meridian, a single-node spatial database engine.
//! Copyright (c) Meridian. All rights reserved.
//!
//! Geo points live in an append-only, newline-delimited JSON record file and
//! are indexed in memory by a 2-D R-tree whose leaves reference records by
//! byte offset. A one-line metadata file ties the two together. Inserts
//! append; updates and deletes rewrite the record file copy-on-write,
//! rebuild the index, and atomically publish the new generation of all
//! three files by rename.
//!
//! # Concurrency
//!
//! The engine is shared across client sessions. Readers run in parallel
//! under a shared lock; appends and generation swaps run exclusively, with
//! an outer priority mutex ensuring a rewrite never has the record file
//! changed underneath it and a writer never starves behind a stream of
//! readers.

pub mod command;
pub mod engine;
pub mod error;
pub mod meta;
pub mod point;
pub mod record;
pub mod rect;
mod rewrite;
pub mod rtree;
pub mod server;

pub use engine::{Engine, EngineStats, FieldChanges};
pub use error::{Error, Result};
pub use point::{Location, Point};
pub use rect::Rect;
pub use rtree::RTree;
