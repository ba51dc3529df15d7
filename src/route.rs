//! Outward packaging of a recording.
//!
//! The session hands two things to the (external) persistence and export
//! layers:
//!
//! - [`RouteRecord`]: segments plus the full-fidelity coordinate log, ready
//!   to be written as JSON;
//! - [`SegmentGeometry`]: a MultiLineString of `[lon, lat, ele]` tuples with
//!   a bounding box and display properties, ready for GeoJSON/GPX/KML
//!   templating.

use geo::{Coord, LineString, MultiLineString};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::geo_utils::compute_bounds;
use crate::segment::Segment;
use crate::{Bounds, FixSample};

/// One entry of the full-fidelity log: every valid fix seen while recording,
/// whether or not the precision filter kept it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct TrackCoordinate {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub horizontal_accuracy: f64,
    pub vertical_accuracy: f64,
    pub timestamp_ms: i64,
    /// Index of the segment the fix was offered to.
    pub segment_index: u32,
    /// Whether the fix became a point of the segment polyline.
    pub accepted: bool,
}

impl TrackCoordinate {
    pub fn from_fix(fix: &FixSample, segment_index: u32, accepted: bool) -> Self {
        Self {
            latitude: fix.latitude,
            longitude: fix.longitude,
            altitude: fix.altitude,
            horizontal_accuracy: fix.horizontal_accuracy,
            vertical_accuracy: fix.vertical_accuracy,
            timestamp_ms: fix.timestamp_ms,
            segment_index,
            accepted,
        }
    }
}

/// A persistable recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct RouteRecord {
    pub name: String,
    /// Unix milliseconds at `start()`.
    pub start_time_ms: Option<i64>,
    /// Unix milliseconds when the record was created.
    pub created_at_ms: i64,
    /// Closed segments followed by the in-progress one, if non-empty.
    pub segments: Vec<Segment>,
    pub coordinates: Vec<TrackCoordinate>,
}

impl RouteRecord {
    pub fn point_count(&self) -> usize {
        self.segments.iter().map(Segment::len).sum()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Display properties attached to exported geometry.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct ExportProperties {
    pub name: String,
    pub color: Option<String>,
    pub description: Option<String>,
    pub info: Option<String>,
    pub image_url: Option<String>,
}

/// MultiLineString-shaped export of a recording: one line per segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct SegmentGeometry {
    pub properties: ExportProperties,
    pub segments: Vec<Segment>,
    /// `None` when there are no points.
    pub bounds: Option<Bounds>,
}

impl SegmentGeometry {
    pub fn new(properties: ExportProperties, segments: Vec<Segment>) -> Self {
        let bounds = compute_bounds(segments.iter().flat_map(|s| s.points.iter()));
        Self { properties, segments, bounds }
    }

    pub fn is_empty(&self) -> bool {
        self.segments.iter().all(Segment::is_empty)
    }

    /// `[[[lon, lat, ele], ...], ...]`, one inner array per segment.
    pub fn coordinates(&self) -> Vec<Vec<[f64; 3]>> {
        self.segments.iter().map(Segment::coordinates).collect()
    }

    /// GeoJSON bbox order: `[min_lon, min_lat, max_lon, max_lat]`.
    pub fn bbox(&self) -> Option<[f64; 4]> {
        self.bounds.map(|b| b.to_bbox())
    }

    /// 2D geometry for `geo` algorithms (elevation dropped).
    pub fn to_multi_line_string(&self) -> MultiLineString<f64> {
        MultiLineString::new(
            self.segments
                .iter()
                .map(|s| {
                    LineString::new(
                        s.points
                            .iter()
                            .map(|p| Coord { x: p.longitude, y: p.latitude })
                            .collect(),
                    )
                })
                .collect(),
        )
    }
}
