//! Segment building and the precision filter.
//!
//! A segment is the polyline recorded between a start/resume and the next
//! pause/stop. [`SegmentBuilder`] holds the open segment and decides, fix by
//! fix, whether to append a point:
//!
//! - the first point of a segment is always accepted, as is the point right
//!   after a forced accept (resume, cache seed);
//! - afterwards a point is accepted only if it lies more than the precision
//!   threshold away from the last *accepted* point.
//!
//! This is a lossy minimum-movement filter, not a smoother: rejected fixes are
//! simply dropped.

use serde::{Deserialize, Serialize};

use crate::geo_utils::{haversine_distance, polyline_length};
use crate::{FixSample, TrackPoint};

/// A closed, immutable polyline.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
#[serde(transparent)]
pub struct Segment {
    pub points: Vec<TrackPoint>,
}

impl Segment {
    pub fn new(points: Vec<TrackPoint>) -> Self {
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Horizontal length in meters.
    pub fn length(&self) -> f64 {
        polyline_length(&self.points)
    }

    /// Elevations in point order.
    pub fn elevations(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.elevation).collect()
    }

    /// `[lon, lat, ele]` tuples, GeoJSON order.
    pub fn coordinates(&self) -> Vec<[f64; 3]> {
        self.points.iter().map(TrackPoint::to_array).collect()
    }
}

/// Builds the open segment of a recording.
#[derive(Debug, Clone, Default)]
pub struct SegmentBuilder {
    points: Vec<TrackPoint>,
    /// Filter reference; only ever a point of the current segment.
    last_accepted: Option<TrackPoint>,
    force_accept_next: bool,
}

impl SegmentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept the next offered fix regardless of distance.
    pub fn force_accept_next(&mut self) {
        self.force_accept_next = true;
    }

    pub fn is_forcing_next(&self) -> bool {
        self.force_accept_next
    }

    pub fn has_first_point(&self) -> bool {
        self.last_accepted.is_some()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[TrackPoint] {
        &self.points
    }

    pub fn last_point(&self) -> Option<&TrackPoint> {
        self.points.last()
    }

    /// Offer a valid fix. Returns `true` if a point was appended.
    ///
    /// `precision_meters` is passed per call so a settings change applies to
    /// the very next decision.
    ///
    /// ```
    /// use trail_recorder::{FixSample, SegmentBuilder};
    ///
    /// let mut builder = SegmentBuilder::new();
    /// let at = |lon: f64| FixSample::new(0.0, lon, 0.0, 5.0, 3.0, 0);
    ///
    /// assert!(builder.offer(&at(0.0), 5.0));       // first point
    /// assert!(!builder.offer(&at(0.00003), 5.0));  // ~3.3m, too close
    /// assert!(builder.offer(&at(0.00006), 5.0));   // ~6.7m from the first
    /// ```
    pub fn offer(&mut self, fix: &FixSample, precision_meters: f64) -> bool {
        let candidate = fix.to_track_point();

        let accept = match self.last_accepted {
            None => true,
            Some(_) if self.force_accept_next => true,
            Some(last) => haversine_distance(&last, &candidate) > precision_meters,
        };

        if accept {
            self.push(candidate);
        }
        accept
    }

    /// Append a captured boundary fix unless it sits on the exact coordinates
    /// of the last point. Returns `true` if appended.
    pub fn append_boundary(&mut self, fix: &FixSample) -> bool {
        let candidate = fix.to_track_point();
        if let Some(last) = self.points.last() {
            if last.longitude == candidate.longitude && last.latitude == candidate.latitude {
                return false;
            }
        }
        self.push(candidate);
        true
    }

    /// Finalize the open segment. Empty segments are discarded.
    pub fn close(&mut self) -> Option<Segment> {
        self.last_accepted = None;
        self.force_accept_next = false;
        if self.points.is_empty() {
            return None;
        }
        Some(Segment::new(std::mem::take(&mut self.points)))
    }

    /// Drop everything, open or not.
    pub fn reset(&mut self) {
        self.points.clear();
        self.last_accepted = None;
        self.force_accept_next = false;
    }

    fn push(&mut self, point: TrackPoint) {
        self.points.push(point);
        self.last_accepted = Some(point);
        self.force_accept_next = false;
    }
}
