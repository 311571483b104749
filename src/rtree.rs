//! Summary: Two-dimensional R-tree over record locations.
//! Copyright (c) Meridian. All rights reserved.
//!
//! Leaf entries are locations treated as degenerate 0x0 rectangles. The tree
//! lives fully in memory: `add` appends to it, the mutation pipeline rebuilds
//! it from scratch, and `save`/`load` move it through a one-line JSON dump.
//!
//! # On-disk JSON shape
//!
//! The encoding is pinned and must round-trip: a top-level
//! `{"Root": <node>, "Count": n}` envelope, where each node is internally
//! tagged as `{"Kind": "Branch", "Bounds": …, "Children": […]}` or
//! `{"Kind": "Leaf", "Bounds": …, "Entries": […]}`. Leaf entries use the
//! record JSON shape of [`Location`].

use std::io::{BufRead, Write};
use std::mem;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::point::Location;
use crate::rect::Rect;

/// Minimum children per node. Part of the on-disk format contract: a rebuilt
/// tree must use the same bounds for save/load compatibility.
pub const MIN_CHILDREN: usize = 25;

/// Maximum children per node; a node that grows past this splits.
pub const MAX_CHILDREN: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "Kind")]
enum Node {
    Branch {
        #[serde(rename = "Bounds")]
        bounds: Rect,
        #[serde(rename = "Children")]
        children: Vec<Node>,
    },
    Leaf {
        #[serde(rename = "Bounds")]
        bounds: Rect,
        #[serde(rename = "Entries")]
        entries: Vec<Location>,
    },
}

impl Node {
    fn empty_leaf() -> Node {
        Node::Leaf {
            bounds: Rect::point(0.0, 0.0),
            entries: Vec::new(),
        }
    }

    fn bounds(&self) -> Rect {
        match self {
            Node::Branch { bounds, .. } | Node::Leaf { bounds, .. } => *bounds,
        }
    }
}

/// A 2-D R-tree index over locations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RTree {
    #[serde(rename = "Root")]
    root: Node,
    #[serde(rename = "Count")]
    count: usize,
}

impl Default for RTree {
    fn default() -> Self {
        Self::new()
    }
}

impl RTree {
    /// Creates an empty tree.
    pub fn new() -> Self {
        Self {
            root: Node::empty_leaf(),
            count: 0,
        }
    }

    /// Number of indexed locations.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Inserts one leaf entry.
    pub fn insert(&mut self, location: Location) {
        if let Some(sibling) = Self::insert_into(&mut self.root, location) {
            let old_root = mem::replace(&mut self.root, Node::empty_leaf());
            let bounds = old_root.bounds().union(&sibling.bounds());
            self.root = Node::Branch {
                bounds,
                children: vec![old_root, sibling],
            };
        }
        self.count += 1;
    }

    /// Descends to a leaf (Guttman choose-leaf: least enlargement, ties by
    /// smaller area), inserts, and propagates splits upward. Returns the
    /// split-off sibling when the visited node overflowed.
    fn insert_into(node: &mut Node, location: Location) -> Option<Node> {
        let entry_rect = location.mbr();
        match node {
            Node::Leaf { bounds, entries } => {
                *bounds = if entries.is_empty() {
                    entry_rect
                } else {
                    bounds.union(&entry_rect)
                };
                entries.push(location);
                if entries.len() <= MAX_CHILDREN {
                    return None;
                }
                let ((kept, kept_bounds), (moved, moved_bounds)) =
                    quadratic_split(mem::take(entries));
                *entries = kept;
                *bounds = kept_bounds;
                Some(Node::Leaf {
                    bounds: moved_bounds,
                    entries: moved,
                })
            }
            Node::Branch { bounds, children } => {
                *bounds = bounds.union(&entry_rect);
                let target = choose_subtree(children, &entry_rect);
                if let Some(sibling) = Self::insert_into(&mut children[target], location) {
                    children.push(sibling);
                    if children.len() > MAX_CHILDREN {
                        let ((kept, kept_bounds), (moved, moved_bounds)) =
                            quadratic_split(mem::take(children));
                        *children = kept;
                        *bounds = kept_bounds;
                        return Some(Node::Branch {
                            bounds: moved_bounds,
                            children: moved,
                        });
                    }
                }
                None
            }
        }
    }

    /// Returns every location whose point lies within or on the boundary of
    /// the query rectangle. Order is unspecified; callers that need
    /// determinism sort by offset.
    pub fn search_intersect(&self, query: &Rect) -> Vec<Location> {
        let mut found = Vec::new();
        if self.count > 0 {
            Self::search_node(&self.root, query, &mut found);
        }
        found
    }

    fn search_node(node: &Node, query: &Rect, found: &mut Vec<Location>) {
        match node {
            Node::Leaf { entries, .. } => {
                for entry in entries {
                    if query.contains_point(entry.latitude, entry.longitude) {
                        found.push(*entry);
                    }
                }
            }
            Node::Branch { children, .. } => {
                for child in children {
                    if query.intersects(&child.bounds()) {
                        Self::search_node(child, query, found);
                    }
                }
            }
        }
    }

    /// Writes the tree as a single JSON line (terminated by `\n`).
    pub fn serialize<W: Write>(&self, writer: &mut W) -> Result<()> {
        let line = serde_json::to_string(self)?;
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        Ok(())
    }

    /// Reads one JSON line and rebuilds the tree. Empty input (a missing or
    /// truncated index file) yields an empty tree rather than an error.
    pub fn deserialize<R: BufRead>(reader: &mut R) -> Result<RTree> {
        let mut line = String::new();
        reader.read_line(&mut line)?;
        let line = line.trim_end();
        if line.is_empty() {
            return Ok(RTree::new());
        }
        Ok(serde_json::from_str(line)?)
    }
}

/// Anything placed in a node: leaf entries and child nodes.
trait Bounded {
    fn mbr(&self) -> Rect;
}

impl Bounded for Location {
    fn mbr(&self) -> Rect {
        Rect::point(self.latitude, self.longitude)
    }
}

impl Bounded for Node {
    fn mbr(&self) -> Rect {
        self.bounds()
    }
}

/// Index of the child whose bounds need the least enlargement to cover
/// `rect`; ties resolved toward the smaller area.
fn choose_subtree(children: &[Node], rect: &Rect) -> usize {
    let mut best = 0;
    let mut best_enlargement = f64::INFINITY;
    let mut best_area = f64::INFINITY;
    for (index, child) in children.iter().enumerate() {
        let bounds = child.bounds();
        let enlargement = bounds.enlargement(rect);
        let area = bounds.area();
        if enlargement < best_enlargement
            || (enlargement == best_enlargement && area < best_area)
        {
            best = index;
            best_enlargement = enlargement;
            best_area = area;
        }
    }
    best
}

/// Guttman quadratic split. Seeds are the pair wasting the most area
/// together; remaining items go to the group needing the smaller
/// enlargement, except when one group must take everything left to reach
/// `MIN_CHILDREN`.
fn quadratic_split<T: Bounded>(mut items: Vec<T>) -> ((Vec<T>, Rect), (Vec<T>, Rect)) {
    debug_assert!(items.len() > MAX_CHILDREN);
    let (first, second) = pick_seeds(&items);
    let seed_b = items.remove(second);
    let seed_a = items.remove(first);
    let mut bounds_a = seed_a.mbr();
    let mut bounds_b = seed_b.mbr();
    let mut group_a = vec![seed_a];
    let mut group_b = vec![seed_b];

    while !items.is_empty() {
        if group_a.len() + items.len() <= MIN_CHILDREN {
            for item in items.drain(..) {
                bounds_a = bounds_a.union(&item.mbr());
                group_a.push(item);
            }
            break;
        }
        if group_b.len() + items.len() <= MIN_CHILDREN {
            for item in items.drain(..) {
                bounds_b = bounds_b.union(&item.mbr());
                group_b.push(item);
            }
            break;
        }

        let mut pick = 0;
        let mut pick_preference = f64::NEG_INFINITY;
        for (index, item) in items.iter().enumerate() {
            let rect = item.mbr();
            let preference = (bounds_a.enlargement(&rect) - bounds_b.enlargement(&rect)).abs();
            if preference > pick_preference {
                pick = index;
                pick_preference = preference;
            }
        }
        let item = items.swap_remove(pick);
        let rect = item.mbr();
        let grow_a = bounds_a.enlargement(&rect);
        let grow_b = bounds_b.enlargement(&rect);
        let into_a = if grow_a != grow_b {
            grow_a < grow_b
        } else if bounds_a.area() != bounds_b.area() {
            bounds_a.area() < bounds_b.area()
        } else {
            group_a.len() <= group_b.len()
        };
        if into_a {
            bounds_a = bounds_a.union(&rect);
            group_a.push(item);
        } else {
            bounds_b = bounds_b.union(&rect);
            group_b.push(item);
        }
    }

    ((group_a, bounds_a), (group_b, bounds_b))
}

/// The pair of items whose combined rectangle wastes the most area.
fn pick_seeds<T: Bounded>(items: &[T]) -> (usize, usize) {
    let mut worst = f64::NEG_INFINITY;
    let mut pair = (0, 1);
    for i in 0..items.len() {
        for j in (i + 1)..items.len() {
            let a = items[i].mbr();
            let b = items[j].mbr();
            let waste = a.union(&b).area() - a.area() - b.area();
            if waste > worst {
                worst = waste;
                pair = (i, j);
            }
        }
    }
    pair
}
