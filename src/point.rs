//! Summary: Point and location model with the on-disk JSON shape.
//! Copyright (c) Meridian. All rights reserved.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Coordinates of a stored point plus the byte offset at which the owning
/// record currently lives in the record file.
///
/// The offset uniquely identifies the record within the current file
/// generation. It is not stable across rewrites: the mutation pipeline
/// rebases every offset after the elided record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    #[serde(rename = "Latitude")]
    pub latitude: f64,
    #[serde(rename = "Longitude")]
    pub longitude: f64,
    /// Byte position of the record's first byte in the record file.
    #[serde(rename = "Offset")]
    pub offset: i64,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64, offset: i64) -> Self {
        Self {
            latitude,
            longitude,
            offset,
        }
    }
}

/// A named geo point.
///
/// A record on disk is exactly the JSON encoding of a `Point` followed by a
/// single `\n`; the terminator byte counts toward the record's byte length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Monotonically assigned identifier, unique within a database lifetime.
    /// Never changes after creation.
    #[serde(rename = "ID")]
    pub id: i64,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Location")]
    pub location: Location,
}

impl Point {
    /// Creates a point with unassigned id and offset. Both are assigned by
    /// the engine when the point is first persisted.
    pub fn new(name: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            id: -1,
            name: name.into(),
            location: Location::new(latitude, longitude, -1),
        }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, {:.2}, {:.2}",
            self.name, self.location.latitude, self.location.longitude
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_shape_is_pinned() {
        let point = Point {
            id: 3,
            name: "harbor".to_string(),
            location: Location::new(10.0, 20.5, 42),
        };
        let json = serde_json::to_string(&point).expect("encode");
        assert_eq!(
            json,
            r#"{"ID":3,"Name":"harbor","Location":{"Latitude":10.0,"Longitude":20.5,"Offset":42}}"#
        );
    }

    #[test]
    fn test_json_roundtrip() {
        let point = Point {
            id: 0,
            name: "pier 39".to_string(),
            location: Location::new(-37.5, 144.25, 0),
        };
        let json = serde_json::to_string(&point).expect("encode");
        let back: Point = serde_json::from_str(&json).expect("decode");
        assert_eq!(point, back);
    }

    #[test]
    fn test_display_two_decimal_places() {
        let point = Point {
            id: 7,
            name: "A".to_string(),
            location: Location::new(10.0, 20.0, 0),
        };
        assert_eq!(point.to_string(), "A, 10.00, 20.00");
    }

    #[test]
    fn test_new_leaves_id_and_offset_unassigned() {
        let point = Point::new("B", 1.5, 2.5);
        assert_eq!(point.id, -1);
        assert_eq!(point.location.offset, -1);
        assert_eq!(point.location.latitude, 1.5);
        assert_eq!(point.location.longitude, 2.5);
    }
}
