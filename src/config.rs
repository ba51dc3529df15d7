//! Recorder configuration.
//!
//! Settings are read live: every filtering decision takes a fresh snapshot
//! from [`SharedConfig`], so a change made mid-route applies to the very next fix.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::metrics::SmoothingConfig;

/// Tunables for recording, boundary capture and elevation metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
#[serde(default)]
pub struct RecorderConfig {
    /// Minimum movement (meters) from the last accepted point before a new
    /// point is added to the active segment.
    /// Default: 5.0 meters
    pub route_precision_meters: f64,

    /// Platform distance filter applied outside of grace windows and captures.
    /// Default: 10.0 meters
    pub update_frequency_meters: f64,

    /// Smooth elevations with a centered moving average before summing ascent.
    /// Default: true
    pub elevation_smoothing_enabled: bool,

    /// Moving-average window. Even values are widened by one.
    /// Default: 5
    pub elevation_smoothing_window: u32,

    /// Smoothed elevation delta that must be exceeded to count as ascent.
    /// Default: 1.0 meters
    pub elevation_gain_threshold_meters: f64,

    /// Time budget for the best-fix capture at pause/stop.
    /// Default: 3000 ms
    pub boundary_capture_timeout_ms: u64,

    /// Accuracy that ends a boundary capture early.
    /// Default: 5.0 meters
    pub boundary_target_accuracy_meters: f64,

    /// Worst accuracy accepted from the recent-fix buffer fallback.
    /// Default: 20.0 meters
    pub recent_fix_max_accuracy_meters: f64,

    /// Oldest fix accepted from the recent-fix buffer fallback.
    /// Default: 10000 ms
    pub recent_fix_max_age_ms: u64,

    /// Oldest cached fix that may seed a freshly started route.
    /// Default: 15000 ms
    pub seed_max_age_ms: u64,

    /// Worst accuracy a cached fix may have to seed a freshly started route.
    /// Default: 20.0 meters
    pub seed_max_accuracy_meters: f64,

    /// How long start/resume keep the distance filter disabled.
    /// Default: 3000 ms
    pub grace_period_ms: u64,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            route_precision_meters: 5.0,
            update_frequency_meters: 10.0,
            elevation_smoothing_enabled: true,
            elevation_smoothing_window: 5,
            elevation_gain_threshold_meters: 1.0,
            boundary_capture_timeout_ms: 3_000,
            boundary_target_accuracy_meters: 5.0,
            recent_fix_max_accuracy_meters: 20.0,
            recent_fix_max_age_ms: 10_000,
            seed_max_age_ms: 15_000,
            seed_max_accuracy_meters: 20.0,
            grace_period_ms: 3_000,
        }
    }
}

impl RecorderConfig {
    /// Parse a persisted JSON settings blob. Missing keys take their defaults.
    ///
    /// ```
    /// use trail_recorder::RecorderConfig;
    ///
    /// let config = RecorderConfig::from_json(r#"{"route_precision_meters": 8.0}"#).unwrap();
    /// assert_eq!(config.route_precision_meters, 8.0);
    /// assert_eq!(config.update_frequency_meters, 10.0);
    /// ```
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Elevation smoothing snapshot for [`crate::distance_and_ascent`].
    pub fn smoothing(&self) -> SmoothingConfig {
        SmoothingConfig {
            enabled: self.elevation_smoothing_enabled,
            window_size: self.elevation_smoothing_window,
            ascent_threshold_meters: self.elevation_gain_threshold_meters,
        }
    }

    pub fn boundary_capture_timeout(&self) -> Duration {
        Duration::from_millis(self.boundary_capture_timeout_ms)
    }

    pub fn recent_fix_max_age(&self) -> Duration {
        Duration::from_millis(self.recent_fix_max_age_ms)
    }

    pub fn seed_max_age(&self) -> Duration {
        Duration::from_millis(self.seed_max_age_ms)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }
}

/// Read-through handle to the live settings.
///
/// Cloning is cheap; all clones observe the same values.
#[derive(Debug, Clone, Default)]
pub struct SharedConfig {
    inner: Arc<RwLock<RecorderConfig>>,
}

impl SharedConfig {
    pub fn new(config: RecorderConfig) -> Self {
        Self { inner: Arc::new(RwLock::new(config)) }
    }

    /// Current settings.
    pub fn snapshot(&self) -> RecorderConfig {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn route_precision_meters(&self) -> f64 {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).route_precision_meters
    }

    /// Replace all settings.
    pub fn replace(&self, config: RecorderConfig) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = config;
    }

    /// Modify settings in place.
    pub fn update(&self, f: impl FnOnce(&mut RecorderConfig)) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RecorderConfig::default();
        assert_eq!(config.route_precision_meters, 5.0);
        assert_eq!(config.update_frequency_meters, 10.0);
        assert!(config.elevation_smoothing_enabled);
        assert_eq!(config.boundary_capture_timeout(), Duration::from_secs(3));
        assert_eq!(config.grace_period(), Duration::from_secs(3));
    }

    #[test]
    fn test_json_round_trip_keeps_custom_values() {
        let mut config = RecorderConfig::default();
        config.elevation_smoothing_window = 7;
        let json = config.to_json().unwrap();
        assert_eq!(RecorderConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_bad_json_is_config_error() {
        let err = RecorderConfig::from_json("{not json").unwrap_err();
        assert!(matches!(err, crate::RecorderError::Config(_)));
    }

    #[test]
    fn test_shared_config_updates_are_visible_to_clones() {
        let shared = SharedConfig::default();
        let reader = shared.clone();
        shared.update(|c| c.route_precision_meters = 12.0);
        assert_eq!(reader.route_precision_meters(), 12.0);
        assert_eq!(reader.snapshot().route_precision_meters, 12.0);
    }

    #[test]
    fn test_smoothing_snapshot() {
        let mut config = RecorderConfig::default();
        config.elevation_smoothing_enabled = false;
        config.elevation_gain_threshold_meters = 0.5;
        let smoothing = config.smoothing();
        assert!(!smoothing.enabled);
        assert_eq!(smoothing.window_size, 5);
        assert_eq!(smoothing.ascent_threshold_meters, 0.5);
    }
}
