//! Platform location seam and the live fix feed.
//!
//! The platform (CoreLocation, Android's fused provider, a simulator) is
//! reached through [`LocationSource`], which only exposes the knobs the
//! recorder needs: authorization, sampling configuration and start/stop.
//!
//! Fixes flow the other way through [`LocationHub`]. The platform callback is
//! the hub's single producer; it validates each fix, remembers the latest one,
//! feeds the [`RecentFixBuffer`] and broadcasts the fix to every subscriber
//! (the recorder actor and any in-flight best-fix capture).

use std::sync::{Mutex, PoisonError, RwLock};
use std::time::Duration;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::buffer::{BufferedFix, RecentFixBuffer};
use crate::error::{RecorderError, Result};
use crate::FixSample;

/// Fixes buffered per subscriber before the slowest one starts lagging.
pub const FIX_CHANNEL_CAPACITY: usize = 64;

// ============================================================================
// Platform configuration types
// ============================================================================

/// Location authorization as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum Authorization {
    NotDetermined,
    Denied,
    Restricted,
    Authorized,
}

impl Authorization {
    pub fn is_granted(self) -> bool {
        matches!(self, Authorization::Authorized)
    }
}

/// Desired accuracy tiers, coarsest last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum DesiredAccuracy {
    BestForNavigation,
    Best,
    NearestTenMeters,
    HundredMeters,
    Kilometer,
}

/// Sampling knobs of the platform location stack.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct SamplingConfig {
    pub desired_accuracy: DesiredAccuracy,
    /// Minimum movement between platform updates; `None` delivers every update.
    pub distance_filter_meters: Option<f64>,
}

impl SamplingConfig {
    /// Highest accuracy with no distance filter. Used for captures and grace windows.
    pub fn high_accuracy() -> Self {
        Self {
            desired_accuracy: DesiredAccuracy::BestForNavigation,
            distance_filter_meters: None,
        }
    }

    /// Regular recording configuration.
    pub fn recording(update_frequency_meters: f64) -> Self {
        Self {
            desired_accuracy: DesiredAccuracy::Best,
            distance_filter_meters: Some(update_frequency_meters),
        }
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self::recording(10.0)
    }
}

// ============================================================================
// Platform seam
// ============================================================================

/// The platform location stack.
///
/// Methods take `&self`; implementations use interior mutability since the
/// capture guard and the session both hold the source behind an `Arc`.
pub trait LocationSource: Send + Sync {
    fn authorization(&self) -> Authorization;

    /// Ask the user for permission. The answer arrives later through `authorization()`.
    fn request_authorization(&self);

    fn sampling(&self) -> SamplingConfig;

    fn apply_sampling(&self, config: SamplingConfig);

    /// Begin delivering fixes. Recording never turns updates off again; the
    /// host keeps them running for its current-location display.
    fn start_updates(&self);
}

#[derive(Debug)]
struct ManualState {
    authorization: Authorization,
    sampling: SamplingConfig,
    updating: bool,
    authorization_requests: u32,
    applied: Vec<SamplingConfig>,
}

/// In-memory [`LocationSource`] for tests, demos and simulators.
///
/// Every `apply_sampling` call is recorded so callers can verify that
/// temporary overrides were restored.
#[derive(Debug)]
pub struct ManualLocationSource {
    state: Mutex<ManualState>,
}

impl ManualLocationSource {
    pub fn new(authorization: Authorization) -> Self {
        Self {
            state: Mutex::new(ManualState {
                authorization,
                sampling: SamplingConfig::default(),
                updating: false,
                authorization_requests: 0,
                applied: Vec::new(),
            }),
        }
    }

    pub fn authorized() -> Self {
        Self::new(Authorization::Authorized)
    }

    pub fn set_authorization(&self, authorization: Authorization) {
        self.lock().authorization = authorization;
    }

    pub fn is_updating(&self) -> bool {
        self.lock().updating
    }

    pub fn authorization_requests(&self) -> u32 {
        self.lock().authorization_requests
    }

    /// Every configuration applied so far, oldest first.
    pub fn applied_sampling(&self) -> Vec<SamplingConfig> {
        self.lock().applied.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl LocationSource for ManualLocationSource {
    fn authorization(&self) -> Authorization {
        self.lock().authorization
    }

    fn request_authorization(&self) {
        self.lock().authorization_requests += 1;
    }

    fn sampling(&self) -> SamplingConfig {
        self.lock().sampling
    }

    fn apply_sampling(&self, config: SamplingConfig) {
        let mut state = self.lock();
        state.sampling = config;
        state.applied.push(config);
    }

    fn start_updates(&self) {
        self.lock().updating = true;
    }
}

// ============================================================================
// Live fix feed
// ============================================================================

/// Shared entry point for platform fixes.
///
/// One producer calls [`LocationHub::publish`]; readers either query the
/// latest fix / recent buffer or [`subscribe`](LocationHub::subscribe) to the
/// broadcast.
#[derive(Debug)]
pub struct LocationHub {
    latest: RwLock<Option<BufferedFix>>,
    recent: Mutex<RecentFixBuffer>,
    sender: broadcast::Sender<FixSample>,
}

impl Default for LocationHub {
    fn default() -> Self {
        Self::new()
    }
}

impl LocationHub {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(FIX_CHANNEL_CAPACITY);
        Self {
            latest: RwLock::new(None),
            recent: Mutex::new(RecentFixBuffer::default()),
            sender,
        }
    }

    /// Accept a platform fix.
    ///
    /// Invalid fixes are dropped here, before they reach the buffer or any
    /// subscriber, and reported as [`RecorderError::InvalidFix`].
    pub fn publish(&self, fix: FixSample) -> Result<()> {
        if !fix.is_valid() {
            debug!(
                "[LocationHub] Dropping invalid fix (accuracy {:.1}m at {:.6},{:.6})",
                fix.horizontal_accuracy, fix.latitude, fix.longitude
            );
            return Err(RecorderError::InvalidFix);
        }

        let received_at = Instant::now();
        *self.latest.write().unwrap_or_else(PoisonError::into_inner) =
            Some(BufferedFix { fix, received_at });
        self.recent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(fix, received_at);

        // No subscribers is fine: nobody is recording or capturing right now.
        if self.sender.send(fix).is_err() {
            debug!("[LocationHub] Fix published with no subscribers");
        }
        Ok(())
    }

    /// New receiver that sees every fix published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<FixSample> {
        self.sender.subscribe()
    }

    pub fn latest(&self) -> Option<BufferedFix> {
        *self.latest.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Latest fix if it is no older than `max_age` and no worse than `max_accuracy`.
    pub fn latest_usable(&self, max_age: Duration, max_accuracy: f64) -> Option<FixSample> {
        let latest = self.latest()?;
        if latest.age(Instant::now()) > max_age {
            debug!("[LocationHub] Cached fix too old to use ({:?})", latest.age(Instant::now()));
            return None;
        }
        if latest.fix.horizontal_accuracy > max_accuracy {
            return None;
        }
        Some(latest.fix)
    }

    /// Fallback oracle: most accurate buffered fix within the given limits.
    pub fn best_recent_sample(&self, min_accuracy: f64, max_age: Duration) -> Option<FixSample> {
        let best = self
            .recent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .best_recent(min_accuracy, max_age, Instant::now());
        if best.is_none() {
            warn!(
                "[LocationHub] No buffered fix within {:.1}m / {:?}",
                min_accuracy, max_age
            );
        }
        best
    }

    pub fn recent_len(&self) -> usize {
        self.recent.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
