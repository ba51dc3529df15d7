//! # Trail Recorder
//!
//! GPS route recording engine for hiking and outdoor apps.
//!
//! This library provides:
//! - Precision-filtered segment recording with pause/resume
//! - Best-fix capture at segment boundaries (pause, stop)
//! - A recent-fix buffer as fallback when a capture comes back poor
//! - Distance and smoothed elevation gain over recorded segments
//!
//! ## Features
//!
//! - **`ffi`** - Enable FFI bindings for mobile platforms (iOS/Android)
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use trail_recorder::{
//!     spawn_recorder, FixSample, LocationHub, ManualLocationSource, RouteSession, SharedConfig,
//! };
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> trail_recorder::Result<()> {
//! let hub = Arc::new(LocationHub::new());
//! let source = Arc::new(ManualLocationSource::authorized());
//! let session = RouteSession::new(hub, source, SharedConfig::default());
//! let (recorder, _task) = spawn_recorder(session);
//!
//! recorder.start().await?;
//! recorder.publish_fix(FixSample::new(46.90, 8.50, 1200.0, 4.0, 3.0, 0))?;
//! recorder.publish_fix(FixSample::new(46.91, 8.51, 1260.0, 4.0, 3.0, 1_000))?;
//!
//! let metrics = recorder.distance_and_ascent().await?;
//! println!("{:.0}m, +{:.0}m", metrics.total_distance_meters, metrics.total_ascent_meters);
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};

pub mod acquisition;
pub mod actor;
pub mod buffer;
pub mod config;
pub mod error;
pub mod geo_utils;
pub mod location;
pub mod metrics;
pub mod route;
pub mod segment;
pub mod session;

pub use acquisition::FixAcquisition;
pub use actor::{spawn_recorder, RecorderHandle};
pub use buffer::{BufferedFix, RecentFixBuffer, RECENT_FIX_CAPACITY};
pub use config::{RecorderConfig, SharedConfig};
pub use error::{RecorderError, Result};
pub use location::{
    Authorization, DesiredAccuracy, LocationHub, LocationSource, ManualLocationSource,
    SamplingConfig,
};
pub use metrics::{distance_and_ascent, MetricsResult, SmoothingConfig};
pub use route::{ExportProperties, RouteRecord, SegmentGeometry, TrackCoordinate};
pub use segment::{Segment, SegmentBuilder};
pub use session::{RouteSession, SessionStatus};

#[cfg(feature = "ffi")]
uniffi::setup_scaffolding!();

/// Initialize logging for Android (only used in FFI)
#[cfg(all(feature = "ffi", target_os = "android"))]
fn init_logging() {
    use android_logger::Config;
    use log::LevelFilter;

    android_logger::init_once(
        Config::default()
            .with_max_level(LevelFilter::Debug)
            .with_tag("TrailRecorder"),
    );
}

#[cfg(all(feature = "ffi", not(target_os = "android")))]
fn init_logging() {
    // No-op on non-Android platforms
}

// ============================================================================
// Core Types
// ============================================================================

/// A location fix as delivered by the platform.
///
/// # Example
/// ```
/// use trail_recorder::FixSample;
/// let fix = FixSample::new(46.9480, 7.4474, 540.0, 4.5, 3.0, 1_700_000_000_000); // Bern
/// assert!(fix.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct FixSample {
    pub latitude: f64,
    pub longitude: f64,
    /// Meters above sea level.
    pub altitude: f64,
    /// Radius of uncertainty in meters. Must be positive.
    pub horizontal_accuracy: f64,
    /// Negative when the altitude is unknown.
    pub vertical_accuracy: f64,
    /// Unix milliseconds reported by the platform.
    pub timestamp_ms: i64,
}

impl FixSample {
    pub fn new(
        latitude: f64,
        longitude: f64,
        altitude: f64,
        horizontal_accuracy: f64,
        vertical_accuracy: f64,
        timestamp_ms: i64,
    ) -> Self {
        Self {
            latitude,
            longitude,
            altitude,
            horizontal_accuracy,
            vertical_accuracy,
            timestamp_ms,
        }
    }

    /// Positive finite accuracy and in-range coordinates.
    pub fn is_valid(&self) -> bool {
        self.horizontal_accuracy.is_finite()
            && self.horizontal_accuracy > 0.0
            && self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }

    /// Polyline point; a non-finite altitude is stored as 0.
    pub fn to_track_point(&self) -> TrackPoint {
        let elevation = if self.altitude.is_finite() { self.altitude } else { 0.0 };
        TrackPoint::new(self.longitude, self.latitude, elevation)
    }

    /// Altitude for display, `None` when the platform marked it unknown.
    pub fn display_altitude(&self) -> Option<f64> {
        if self.vertical_accuracy < 0.0 || !self.altitude.is_finite() {
            None
        } else {
            Some(self.altitude)
        }
    }
}

/// A recorded polyline point.
///
/// Serializes as a `[lon, lat, ele]` array, the GeoJSON coordinate order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
#[serde(into = "[f64; 3]", from = "[f64; 3]")]
pub struct TrackPoint {
    pub longitude: f64,
    pub latitude: f64,
    pub elevation: f64,
}

impl TrackPoint {
    pub fn new(longitude: f64, latitude: f64, elevation: f64) -> Self {
        Self { longitude, latitude, elevation }
    }

    pub fn to_array(&self) -> [f64; 3] {
        [self.longitude, self.latitude, self.elevation]
    }
}

impl From<TrackPoint> for [f64; 3] {
    fn from(point: TrackPoint) -> Self {
        point.to_array()
    }
}

impl From<[f64; 3]> for TrackPoint {
    fn from([longitude, latitude, elevation]: [f64; 3]) -> Self {
        Self { longitude, latitude, elevation }
    }
}

/// Bounding box of a recording.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// GeoJSON bbox: `[min_lng, min_lat, max_lng, max_lat]`.
    pub fn to_bbox(&self) -> [f64; 4] {
        [self.min_lng, self.min_lat, self.max_lng, self.max_lat]
    }
}

/// Wall-clock Unix milliseconds, 0 if the clock is before the epoch.
pub(crate) fn unix_millis_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as i64)
}

// ============================================================================
// FFI Exports (only when feature enabled)
// ============================================================================

#[cfg(feature = "ffi")]
mod ffi {
    use super::*;
    use log::{debug, info};
    use std::sync::{Arc, Mutex, PoisonError};

    // ========================================================================
    // Platform Location Interface
    // ========================================================================

    /// The platform location stack (CoreLocation / FusedLocationProvider).
    /// Implement this in Kotlin/Swift and forward every platform update to
    /// [`RouteRecorder::publish_fix`].
    #[uniffi::export(callback_interface)]
    pub trait PlatformLocation: Send + Sync {
        fn authorization(&self) -> Authorization;
        /// Show the permission prompt. The answer is read back via `authorization()`.
        fn request_authorization(&self);
        fn apply_sampling(&self, config: SamplingConfig);
        fn start_updates(&self);
    }

    /// Adapts the callback interface to [`LocationSource`]. The platform does
    /// not report its sampling back, so the last applied config is mirrored here.
    struct PlatformBridge {
        platform: Box<dyn PlatformLocation>,
        sampling: Mutex<SamplingConfig>,
    }

    impl LocationSource for PlatformBridge {
        fn authorization(&self) -> Authorization {
            self.platform.authorization()
        }

        fn request_authorization(&self) {
            self.platform.request_authorization();
        }

        fn sampling(&self) -> SamplingConfig {
            *self.sampling.lock().unwrap_or_else(PoisonError::into_inner)
        }

        fn apply_sampling(&self, config: SamplingConfig) {
            *self.sampling.lock().unwrap_or_else(PoisonError::into_inner) = config;
            self.platform.apply_sampling(config);
        }

        fn start_updates(&self) {
            self.platform.start_updates();
        }
    }

    // ========================================================================
    // Recorder Object
    // ========================================================================

    /// A recording session driven from the mobile side.
    ///
    /// Owns a small tokio runtime that runs the recorder actor; the async
    /// methods resolve once the actor has applied the transition.
    #[derive(uniffi::Object)]
    pub struct RouteRecorder {
        // Declared before the runtime so the handle drops first.
        handle: RecorderHandle,
        _runtime: tokio::runtime::Runtime,
    }

    #[uniffi::export(async_runtime = "tokio")]
    impl RouteRecorder {
        #[uniffi::constructor]
        pub fn new(
            platform: Box<dyn PlatformLocation>,
            config: RecorderConfig,
        ) -> std::result::Result<Arc<Self>, RecorderError> {
            init_logging();
            info!("[TrailRecorder] Creating recorder");

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(1)
                .thread_name("trail-recorder")
                .enable_time()
                .build()
                .map_err(|e| RecorderError::Config(e.to_string()))?;

            let source = Arc::new(PlatformBridge {
                platform,
                sampling: Mutex::new(SamplingConfig::recording(config.update_frequency_meters)),
            });
            let session = RouteSession::new(
                Arc::new(LocationHub::new()),
                source,
                SharedConfig::new(config),
            );

            let handle = {
                let _guard = runtime.enter();
                spawn_recorder(session).0
            };

            Ok(Arc::new(Self { handle, _runtime: runtime }))
        }

        /// Forward a platform location update.
        pub fn publish_fix(&self, fix: FixSample) -> std::result::Result<(), RecorderError> {
            self.handle.publish_fix(fix)
        }

        pub fn status(&self) -> SessionStatus {
            self.handle.status()
        }

        pub fn config(&self) -> RecorderConfig {
            self.handle.config().snapshot()
        }

        /// Takes effect from the next fix or capture on.
        pub fn update_config(&self, config: RecorderConfig) {
            debug!("[TrailRecorder] Config updated: precision {:.1}m", config.route_precision_meters);
            self.handle.config().replace(config);
        }

        pub async fn start(&self) -> std::result::Result<(), RecorderError> {
            self.handle.start().await
        }

        pub async fn pause(&self) -> std::result::Result<(), RecorderError> {
            self.handle.pause().await
        }

        pub async fn resume(&self) -> std::result::Result<(), RecorderError> {
            self.handle.resume().await
        }

        pub async fn stop(&self) -> std::result::Result<(), RecorderError> {
            self.handle.stop().await
        }

        pub async fn create_route(
            &self,
            name: String,
        ) -> std::result::Result<Option<RouteRecord>, RecorderError> {
            self.handle.create_route(name).await
        }

        /// Route record serialized as JSON, ready to be written to disk.
        pub async fn create_route_json(
            &self,
            name: String,
        ) -> std::result::Result<Option<String>, RecorderError> {
            match self.handle.create_route(name).await? {
                Some(record) => record.to_json().map(Some),
                None => Ok(None),
            }
        }

        pub async fn export_segments(
            &self,
            properties: ExportProperties,
        ) -> std::result::Result<SegmentGeometry, RecorderError> {
            self.handle.export_segments(properties).await
        }

        pub async fn distance_and_ascent(&self) -> std::result::Result<MetricsResult, RecorderError> {
            self.handle.distance_and_ascent().await
        }
    }

    // ========================================================================
    // Free Functions
    // ========================================================================

    /// Distance and ascent for stored segments (e.g. a reloaded route).
    #[uniffi::export]
    pub fn compute_distance_and_ascent(
        segments: Vec<Segment>,
        smoothing: SmoothingConfig,
    ) -> MetricsResult {
        init_logging();
        debug!("[TrailRecorder] Computing metrics for {} segments", segments.len());
        distance_and_ascent(&segments, &smoothing)
    }

    /// Get default recorder configuration.
    #[uniffi::export]
    pub fn default_recorder_config() -> RecorderConfig {
        RecorderConfig::default()
    }

    /// Parse a stored route record.
    #[uniffi::export]
    pub fn parse_route_record(json: String) -> std::result::Result<RouteRecord, RecorderError> {
        RouteRecord::from_json(&json)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fix_validation() {
        assert!(FixSample::new(46.9, 8.5, 1200.0, 5.0, 3.0, 0).is_valid());
        assert!(!FixSample::new(46.9, 8.5, 1200.0, 0.0, 3.0, 0).is_valid());
        assert!(!FixSample::new(46.9, 8.5, 1200.0, -1.0, 3.0, 0).is_valid());
        assert!(!FixSample::new(46.9, 8.5, 1200.0, f64::NAN, 3.0, 0).is_valid());
        assert!(!FixSample::new(91.0, 8.5, 1200.0, 5.0, 3.0, 0).is_valid());
        assert!(!FixSample::new(46.9, 181.0, 1200.0, 5.0, 3.0, 0).is_valid());
        assert!(!FixSample::new(f64::NAN, 8.5, 1200.0, 5.0, 3.0, 0).is_valid());
    }

    #[test]
    fn test_track_point_from_fix() {
        let fix = FixSample::new(46.9, 8.5, 1200.0, 5.0, 3.0, 0);
        assert_eq!(fix.to_track_point(), TrackPoint::new(8.5, 46.9, 1200.0));

        let no_altitude = FixSample::new(46.9, 8.5, f64::NAN, 5.0, -1.0, 0);
        assert_eq!(no_altitude.to_track_point().elevation, 0.0);
    }

    #[test]
    fn test_display_altitude() {
        assert_eq!(FixSample::new(46.9, 8.5, 1200.0, 5.0, 3.0, 0).display_altitude(), Some(1200.0));
        assert_eq!(FixSample::new(46.9, 8.5, 1200.0, 5.0, -1.0, 0).display_altitude(), None);
    }

    #[test]
    fn test_track_point_serializes_as_array() {
        let point = TrackPoint::new(8.5, 46.9, 1200.0);
        let json = serde_json::to_string(&point).unwrap();
        assert_eq!(json, "[8.5,46.9,1200.0]");

        let parsed: TrackPoint = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, point);
    }

    #[test]
    fn test_bbox_order() {
        let bounds = Bounds { min_lat: 46.0, max_lat: 47.0, min_lng: 8.0, max_lng: 9.0 };
        assert_eq!(bounds.to_bbox(), [8.0, 46.0, 9.0, 47.0]);
    }

    #[test]
    fn test_unix_millis_now_is_recent() {
        // 2023-11-14 or later.
        assert!(unix_millis_now() > 1_700_000_000_000);
    }
}
