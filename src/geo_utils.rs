//! # Geographic Utilities
//!
//! Distance and extent helpers shared by the segment filter, the metrics
//! engine and the export geometry.
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`haversine_distance`] | Great-circle distance between two track points |
//! | [`polyline_length`] | Total length of a polyline in meters |
//! | [`compute_bounds`] | Bounding box of a set of track points |
//!
//! ## Example
//!
//! ```rust
//! use trail_recorder::{TrackPoint, geo_utils};
//!
//! let track = vec![
//!     TrackPoint::new(-0.1278, 51.5074, 11.0),
//!     TrackPoint::new(-0.1290, 51.5080, 14.0),
//!     TrackPoint::new(-0.1300, 51.5090, 12.0),
//! ];
//!
//! let length = geo_utils::polyline_length(&track);
//! println!("Track length: {:.0}m", length);
//!
//! let bounds = geo_utils::compute_bounds(&track).unwrap();
//! println!("Bounds: {:.4}N to {:.4}N", bounds.min_lat, bounds.max_lat);
//! ```
//!
//! ## Algorithm Notes
//!
//! All distances are great-circle distances on a spherical Earth (haversine,
//! radius 6,371 km). A planar `sqrt(dLon² + dLat²) * 111000` shortcut is never
//! used: it overstates east-west movement away from the equator.
//!
//! Elevation is ignored for horizontal distance.

use geo::{Distance, Haversine, Point};

use crate::{Bounds, TrackPoint};

// =============================================================================
// Distance Functions
// =============================================================================

/// Great-circle distance in meters between two track points.
///
/// ```rust
/// use trail_recorder::{TrackPoint, geo_utils};
///
/// let a = TrackPoint::new(0.0, 0.0, 0.0);
/// let b = TrackPoint::new(0.00006, 0.0, 0.0);
/// let d = geo_utils::haversine_distance(&a, &b);
/// assert!((d - 6.67).abs() < 0.05);
/// ```
#[inline]
pub fn haversine_distance(p1: &TrackPoint, p2: &TrackPoint) -> f64 {
    let point1 = Point::new(p1.longitude, p1.latitude);
    let point2 = Point::new(p2.longitude, p2.latitude);
    Haversine::distance(point1, point2)
}

/// Sum of consecutive haversine distances. Empty or single-point input is 0.0.
pub fn polyline_length(points: &[TrackPoint]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }

    points
        .windows(2)
        .map(|w| haversine_distance(&w[0], &w[1]))
        .sum()
}

// =============================================================================
// Bounding Box Functions
// =============================================================================

/// Bounding box enclosing all points, or `None` for empty input.
pub fn compute_bounds<'a, I>(points: I) -> Option<Bounds>
where
    I: IntoIterator<Item = &'a TrackPoint>,
{
    let mut iter = points.into_iter();
    let first = iter.next()?;

    let mut bounds = Bounds {
        min_lat: first.latitude,
        max_lat: first.latitude,
        min_lng: first.longitude,
        max_lng: first.longitude,
    };

    for p in iter {
        bounds.min_lat = bounds.min_lat.min(p.latitude);
        bounds.max_lat = bounds.max_lat.max(p.latitude);
        bounds.min_lng = bounds.min_lng.min(p.longitude);
        bounds.max_lng = bounds.max_lng.max(p.longitude);
    }

    Some(bounds)
}

// =============================================================================
// Unit Tests
// =============================================================================
