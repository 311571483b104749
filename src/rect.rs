//! Summary: Axis-aligned rectangles over latitude/longitude space.
//! Copyright (c) Meridian. All rights reserved.

use serde::{Deserialize, Serialize};

/// An axis-aligned rectangle built from a corner point and two non-negative
/// extents. The opposite corner is `(lat + width, lng + height)`.
///
/// A degenerate rectangle with zero extents is legal and matches exactly the
/// points equal to its corner. All containment and intersection checks are
/// boundary-inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    #[serde(rename = "Lat")]
    lat: f64,
    #[serde(rename = "Lng")]
    lng: f64,
    #[serde(rename = "Width")]
    width: f64,
    #[serde(rename = "Height")]
    height: f64,
}

impl Rect {
    /// Creates a rectangle from a corner and non-negative extents.
    pub fn new(lat: f64, lng: f64, width: f64, height: f64) -> Self {
        debug_assert!(width >= 0.0 && height >= 0.0);
        Self {
            lat,
            lng,
            width,
            height,
        }
    }

    /// Creates the degenerate 0x0 rectangle at the given point.
    pub fn point(lat: f64, lng: f64) -> Self {
        Self::new(lat, lng, 0.0, 0.0)
    }

    pub fn lat(&self) -> f64 {
        self.lat
    }

    pub fn lng(&self) -> f64 {
        self.lng
    }

    pub fn high_lat(&self) -> f64 {
        self.lat + self.width
    }

    pub fn high_lng(&self) -> f64 {
        self.lng + self.height
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    /// True if the point lies within or on the boundary of this rectangle.
    pub fn contains_point(&self, lat: f64, lng: f64) -> bool {
        lat >= self.lat && lat <= self.high_lat() && lng >= self.lng && lng <= self.high_lng()
    }

    /// True if the rectangles overlap, touching edges included.
    pub fn intersects(&self, other: &Rect) -> bool {
        self.lat <= other.high_lat()
            && other.lat <= self.high_lat()
            && self.lng <= other.high_lng()
            && other.lng <= self.high_lng()
    }

    /// The smallest rectangle covering both operands.
    pub fn union(&self, other: &Rect) -> Rect {
        let lat = self.lat.min(other.lat);
        let lng = self.lng.min(other.lng);
        let high_lat = self.high_lat().max(other.high_lat());
        let high_lng = self.high_lng().max(other.high_lng());
        Rect::new(lat, lng, high_lat - lat, high_lng - lng)
    }

    /// Area growth required to also cover `other`.
    pub fn enlargement(&self, other: &Rect) -> f64 {
        self.union(other).area() - self.area()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_point_boundary_inclusive() {
        let rect = Rect::new(0.0, 0.0, 2.0, 3.0);
        assert!(rect.contains_point(0.0, 0.0));
        assert!(rect.contains_point(2.0, 3.0));
        assert!(rect.contains_point(1.0, 1.5));
        assert!(!rect.contains_point(2.1, 1.0));
        assert!(!rect.contains_point(-0.1, 1.0));
    }

    #[test]
    fn test_degenerate_rect_matches_corner_only() {
        let rect = Rect::point(5.0, -5.0);
        assert!(rect.contains_point(5.0, -5.0));
        assert!(!rect.contains_point(5.0, -4.999));
        assert_eq!(rect.area(), 0.0);
    }

    #[test]
    fn test_intersects_touching_edges() {
        let a = Rect::new(0.0, 0.0, 1.0, 1.0);
        let b = Rect::new(1.0, 0.0, 1.0, 1.0);
        let c = Rect::new(2.5, 0.0, 1.0, 1.0);
        assert!(a.intersects(&b));
        assert!(b.intersects(&a));
        assert!(!a.intersects(&c));
    }

    #[test]
    fn test_union_covers_both() {
        let a = Rect::new(0.0, 0.0, 1.0, 1.0);
        let b = Rect::new(3.0, -2.0, 1.0, 1.0);
        let u = a.union(&b);
        assert_eq!(u.lat(), 0.0);
        assert_eq!(u.lng(), -2.0);
        assert_eq!(u.high_lat(), 4.0);
        assert_eq!(u.high_lng(), 1.0);
    }

    #[test]
    fn test_enlargement_zero_when_contained() {
        let outer = Rect::new(0.0, 0.0, 10.0, 10.0);
        let inner = Rect::new(2.0, 2.0, 1.0, 1.0);
        assert_eq!(outer.enlargement(&inner), 0.0);
        assert!(inner.enlargement(&outer) > 0.0);
    }
}
