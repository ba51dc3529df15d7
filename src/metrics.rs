//! # Route Metrics
//!
//! Horizontal distance and elevation gain for a list of segments.
//!
//! ## Distance
//! Sum of haversine distances between consecutive points of each segment.
//! Segments are disjoint: the gap between the end of one segment and the
//! start of the next (a pause) is never counted.
//!
//! ## Ascent
//! Per segment, with smoothing enabled:
//! 1. Normalize the window to an odd width (6 becomes 7).
//! 2. If the segment has at least `window` points, replace every point that
//!    has `window / 2` neighbours on both sides with the centered mean.
//!    Points closer to either end pass through unchanged (no padding, no
//!    mirroring).
//! 3. Count a delta between consecutive elevations only if it exceeds the
//!    ascent threshold.
//!
//! With smoothing disabled every positive raw delta counts.
//!
//! The computation is a pure function of its input: no caching, no hidden
//! state, same operation order every call.

use serde::{Deserialize, Serialize};

use crate::segment::Segment;

/// Elevation smoothing parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct SmoothingConfig {
    pub enabled: bool,
    /// Moving-average window; even values are widened by one.
    pub window_size: u32,
    /// Minimum smoothed delta counted as ascent.
    pub ascent_threshold_meters: f64,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_size: 5,
            ascent_threshold_meters: 1.0,
        }
    }
}

impl SmoothingConfig {
    /// Odd window actually used for the moving average.
    pub fn normalized_window(&self) -> usize {
        let window = self.window_size.max(1) as usize;
        if window % 2 == 0 {
            window + 1
        } else {
            window
        }
    }
}

/// Distance and ascent summary. Always recomputed, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct MetricsResult {
    pub total_distance_meters: f64,
    pub total_ascent_meters: f64,
}

/// Distance and ascent over `segments`.
///
/// ```
/// use trail_recorder::{distance_and_ascent, Segment, SmoothingConfig, TrackPoint};
///
/// let segment = Segment::new(vec![
///     TrackPoint::new(0.0, 0.0, 100.0),
///     TrackPoint::new(0.001, 0.0, 104.0),
/// ]);
/// let smoothing = SmoothingConfig { enabled: false, ..Default::default() };
///
/// let result = distance_and_ascent(&[segment], &smoothing);
/// assert!((result.total_distance_meters - 111.2).abs() < 0.1);
/// assert_eq!(result.total_ascent_meters, 4.0);
/// ```
pub fn distance_and_ascent(segments: &[Segment], smoothing: &SmoothingConfig) -> MetricsResult {
    let mut result = MetricsResult::default();

    for segment in segments {
        result.total_distance_meters += segment.length();
        result.total_ascent_meters += segment_ascent(&segment.elevations(), smoothing);
    }

    result
}

/// Ascent of a single elevation series.
pub fn segment_ascent(elevations: &[f64], smoothing: &SmoothingConfig) -> f64 {
    if elevations.len() < 2 {
        return 0.0;
    }

    if !smoothing.enabled {
        return positive_gain(elevations, 0.0);
    }

    let window = smoothing.normalized_window();
    if elevations.len() >= window {
        let smoothed = smooth_centered(elevations, window);
        positive_gain(&smoothed, smoothing.ascent_threshold_meters)
    } else {
        positive_gain(elevations, smoothing.ascent_threshold_meters)
    }
}

/// Centered moving average. An even `window` is widened by one. Points
/// within `window / 2` of either end are returned unchanged.
pub fn smooth_centered(data: &[f64], window: usize) -> Vec<f64> {
    let window = if window % 2 == 0 { window + 1 } else { window };
    let radius = window / 2;
    if radius == 0 || data.len() < window {
        return data.to_vec();
    }

    let mut out = data.to_vec();
    for i in radius..data.len() - radius {
        let sum: f64 = data[i - radius..=i + radius].iter().sum();
        out[i] = sum / window as f64;
    }
    out
}

/// Sum of consecutive deltas strictly greater than `threshold`.
fn positive_gain(elevations: &[f64], threshold: f64) -> f64 {
    elevations
        .windows(2)
        .map(|w| w[1] - w[0])
        .filter(|delta| *delta > threshold)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TrackPoint;

    fn segment_with_elevations(elevations: &[f64]) -> Segment {
        Segment::new(
            elevations
                .iter()
                .enumerate()
                .map(|(i, &e)| TrackPoint::new(i as f64 * 0.0001, 0.0, e))
                .collect(),
        )
    }

    fn smoothing(window_size: u32, threshold: f64) -> SmoothingConfig {
        SmoothingConfig {
            enabled: true,
            window_size,
            ascent_threshold_meters: threshold,
        }
    }

    #[test]
    fn test_window_normalization() {
        assert_eq!(smoothing(6, 1.0).normalized_window(), 7);
        assert_eq!(smoothing(5, 1.0).normalized_window(), 5);
        assert_eq!(smoothing(0, 1.0).normalized_window(), 1);
    }

    #[test]
    fn test_smoothing_passes_boundaries_through() {
        let data = [100.0, 100.0, 105.0, 100.0, 100.0];
        let smoothed = smooth_centered(&data, 5);
        assert_eq!(smoothed[0], 100.0);
        assert_eq!(smoothed[1], 100.0);
        assert_eq!(smoothed[2], 101.0);
        assert_eq!(smoothed[3], 100.0);
        assert_eq!(smoothed[4], 100.0);
    }

    #[test]
    fn test_smooth_centered_widens_even_window() {
        let data = [100.0, 104.0, 100.0, 108.0, 100.0, 104.0, 100.0];
        assert_eq!(smooth_centered(&data, 4), smooth_centered(&data, 5));
        // Mean of five samples, not five samples over four.
        assert_eq!(smooth_centered(&data, 4)[3], 103.2);
    }

    #[test]
    fn test_even_window_behaves_as_next_odd() {
        let data: Vec<f64> = (0..12).map(|i| if i % 2 == 0 { 10.0 } else { 17.0 }).collect();
        let even = segment_ascent(&data, &smoothing(6, 0.0));
        let odd = segment_ascent(&data, &smoothing(7, 0.0));
        assert_eq!(even, odd);

        // Boundary points within 3 of either end are untouched by a 7-wide window.
        let smoothed = smooth_centered(&data, smoothing(6, 0.0).normalized_window());
        assert_eq!(&smoothed[..3], &data[..3]);
        assert_eq!(&smoothed[9..], &data[9..]);
        assert_ne!(smoothed[3], data[3]);
    }

    #[test]
    fn test_single_spike_gated_by_threshold() {
        let segment = segment_with_elevations(&[100.0, 100.0, 105.0, 100.0, 100.0]);
        // Smoothed: [100, 100, 101, 100, 100]. The only rise is 1.0, not > 1.0.
        let gated = distance_and_ascent(&[segment.clone()], &smoothing(5, 1.0));
        assert_eq!(gated.total_ascent_meters, 0.0);

        let lower = distance_and_ascent(&[segment], &smoothing(5, 0.5));
        assert_eq!(lower.total_ascent_meters, 1.0);
    }

    #[test]
    fn test_unsmoothed_counts_every_positive_delta() {
        let segment = segment_with_elevations(&[100.0, 100.2, 100.1, 100.6, 99.0, 101.0]);
        let config = SmoothingConfig {
            enabled: false,
            window_size: 5,
            ascent_threshold_meters: 1.0,
        };
        let result = distance_and_ascent(&[segment], &config);
        assert!((result.total_ascent_meters - 2.7).abs() < 1e-9);
    }

    #[test]
    fn test_short_segment_uses_raw_elevations_with_threshold() {
        let segment = segment_with_elevations(&[100.0, 100.5, 103.0]);
        let result = distance_and_ascent(&[segment], &smoothing(5, 1.0));
        assert_eq!(result.total_ascent_meters, 2.5);
    }

    #[test]
    fn test_segments_are_not_joined() {
        let a = Segment::new(vec![
            TrackPoint::new(0.0, 0.0, 100.0),
            TrackPoint::new(0.001, 0.0, 100.0),
        ]);
        // Starts 1km away and 50m higher: neither gap distance nor gap climb counts.
        let b = Segment::new(vec![
            TrackPoint::new(0.01, 0.0, 150.0),
            TrackPoint::new(0.011, 0.0, 150.0),
        ]);
        let config = SmoothingConfig { enabled: false, ..Default::default() };

        let joined = distance_and_ascent(&[a.clone(), b.clone()], &config);
        let leg = a.length();
        assert!((joined.total_distance_meters - (leg + b.length())).abs() < 1e-9);
        assert!(joined.total_distance_meters < 300.0);
        assert_eq!(joined.total_ascent_meters, 0.0);
    }

    #[test]
    fn test_empty_input() {
        let result = distance_and_ascent(&[], &SmoothingConfig::default());
        assert_eq!(result, MetricsResult::default());

        let single = segment_with_elevations(&[500.0]);
        let result = distance_and_ascent(&[single], &SmoothingConfig::default());
        assert_eq!(result.total_distance_meters, 0.0);
        assert_eq!(result.total_ascent_meters, 0.0);
    }

    #[test]
    fn test_repeated_calls_are_bit_identical() {
        let elevations: Vec<f64> = (0..50).map(|i| 1000.0 + (i as f64 * 0.7).sin() * 12.3 + i as f64 * 0.37).collect();
        let segments = vec![
            segment_with_elevations(&elevations),
            segment_with_elevations(&elevations[10..30]),
        ];
        let config = smoothing(6, 0.5);

        let first = distance_and_ascent(&segments, &config);
        let second = distance_and_ascent(&segments, &config);
        assert_eq!(first.total_distance_meters.to_bits(), second.total_distance_meters.to_bits());
        assert_eq!(first.total_ascent_meters.to_bits(), second.total_ascent_meters.to_bits());
    }
}
