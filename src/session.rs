//! # Route Session
//!
//! State machine for one recording:
//!
//! ```text
//! Idle --start--> Tracking --pause--> Paused --resume--> Tracking
//!   ^                |                   |
//!   +------stop------+-------stop--------+
//! ```
//!
//! All route mutation goes through `start`, `record_fix`, `pause`, `resume`
//! and `stop`. `record_fix` is the single funnel that feeds both views of the
//! recording: the filtered polyline (segments) and the full-fidelity
//! coordinate log.
//!
//! Pause and stop seal the open segment with a best-fix capture. The capture
//! is the only await point; while it runs the session reports
//! `is_finalizing_last_point` through its status channel and the platform
//! keeps publishing fixes into the hub.

use std::sync::Arc;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::Instant;

use crate::acquisition::FixAcquisition;
use crate::config::{RecorderConfig, SharedConfig};
use crate::error::{RecorderError, Result};
use crate::location::{Authorization, LocationHub, LocationSource, SamplingConfig};
use crate::metrics::{distance_and_ascent, MetricsResult};
use crate::route::{ExportProperties, RouteRecord, SegmentGeometry, TrackCoordinate};
use crate::segment::{Segment, SegmentBuilder};
use crate::{unix_millis_now, FixSample, TrackPoint};

/// Snapshot of the session for status displays.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct SessionStatus {
    pub is_tracking: bool,
    pub is_paused: bool,
    pub is_finalizing_last_point: bool,
    pub start_time_ms: Option<i64>,
    /// Points in all segments, including the open one.
    pub point_count: u32,
    /// Entries in the full-fidelity coordinate log.
    pub coordinate_count: u32,
    /// Closed segments.
    pub segment_count: u32,
    /// Last user-visible error, cleared by a successful start.
    pub error_message: Option<String>,
}

/// One recording session. See the [module docs](self).
pub struct RouteSession {
    hub: Arc<LocationHub>,
    source: Arc<dyn LocationSource>,
    acquisition: FixAcquisition,
    config: SharedConfig,

    is_tracking: bool,
    is_paused: bool,
    is_finalizing: bool,
    start_time_ms: Option<i64>,

    segments: Vec<Segment>,
    builder: SegmentBuilder,
    coordinates: Vec<TrackCoordinate>,

    grace_deadline: Option<Instant>,
    /// Movement filter at 0 until the start grace window ends.
    relaxed_filter: bool,
    error_message: Option<String>,
    status: watch::Sender<SessionStatus>,
}

impl RouteSession {
    pub fn new(hub: Arc<LocationHub>, source: Arc<dyn LocationSource>, config: SharedConfig) -> Self {
        let (status, _) = watch::channel(SessionStatus::default());
        Self {
            acquisition: FixAcquisition::new(hub.clone(), source.clone()),
            hub,
            source,
            config,
            is_tracking: false,
            is_paused: false,
            is_finalizing: false,
            start_time_ms: None,
            segments: Vec::new(),
            builder: SegmentBuilder::new(),
            coordinates: Vec::new(),
            grace_deadline: None,
            relaxed_filter: false,
            error_message: None,
            status,
        }
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn hub(&self) -> &Arc<LocationHub> {
        &self.hub
    }

    pub fn config(&self) -> &SharedConfig {
        &self.config
    }

    pub fn is_tracking(&self) -> bool {
        self.is_tracking
    }

    pub fn is_paused(&self) -> bool {
        self.is_paused
    }

    pub fn is_finalizing_last_point(&self) -> bool {
        self.is_finalizing
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Closed segments, in closing order.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Points of the open segment.
    pub fn active_points(&self) -> &[TrackPoint] {
        self.builder.points()
    }

    pub fn coordinates(&self) -> &[TrackCoordinate] {
        &self.coordinates
    }

    pub fn point_count(&self) -> usize {
        self.segments.iter().map(Segment::len).sum::<usize>() + self.builder.len()
    }

    /// Closed segments followed by the open one when it has points.
    pub fn all_segments(&self) -> Vec<Segment> {
        let mut all = self.segments.clone();
        if !self.builder.is_empty() {
            all.push(Segment::new(self.builder.points().to_vec()));
        }
        all
    }

    /// End of the current start/resume grace window, if one is running.
    pub fn grace_deadline(&self) -> Option<Instant> {
        self.grace_deadline
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            is_tracking: self.is_tracking,
            is_paused: self.is_paused,
            is_finalizing_last_point: self.is_finalizing,
            start_time_ms: self.start_time_ms,
            point_count: self.point_count() as u32,
            coordinate_count: self.coordinates.len() as u32,
            segment_count: self.segments.len() as u32,
            error_message: self.error_message.clone(),
        }
    }

    /// Receiver that observes every status change, including the transient
    /// finalizing state while a pause or stop is capturing its last point.
    pub fn subscribe_status(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    // ------------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------------

    /// Begin a new recording.
    ///
    /// Fails with [`RecorderError::PermissionDenied`] without location
    /// authorization; the message is also retained in the status so the UI
    /// can offer to re-request permission. Starting while already tracking is
    /// a no-op.
    pub fn start(&mut self) -> Result<()> {
        if self.is_tracking {
            debug!("[RouteSession] start ignored: already tracking");
            return Ok(());
        }

        let authorization = self.source.authorization();
        if !authorization.is_granted() {
            if authorization == Authorization::NotDetermined {
                self.source.request_authorization();
            }
            warn!("[RouteSession] Cannot start tracking: authorization {:?}", authorization);
            self.error_message = Some(RecorderError::PermissionDenied.to_string());
            self.publish_status();
            return Err(RecorderError::PermissionDenied);
        }

        let config = self.config.snapshot();

        self.error_message = None;
        self.segments.clear();
        self.builder.reset();
        self.coordinates.clear();
        self.is_tracking = true;
        self.is_paused = false;
        self.start_time_ms = Some(unix_millis_now());

        self.source.start_updates();

        // Seed from the cached fix so the first segment is not empty while the
        // first live update is still on its way.
        if let Some(seed) = self
            .hub
            .latest_usable(config.seed_max_age(), config.seed_max_accuracy_meters)
        {
            self.offer(&seed, config.route_precision_meters);
            self.builder.force_accept_next();
            info!(
                "[RouteSession] Seeded route with cached {:.1}m fix",
                seed.horizontal_accuracy
            );
        }

        self.begin_grace(&config);
        self.relaxed_filter = true;
        info!("[RouteSession] Tracking started");
        self.publish_status();
        Ok(())
    }

    /// Offer a live fix. Returns `true` if it became a polyline point.
    ///
    /// Ignored unless tracking, unpaused and not finalizing. During the grace
    /// window after `start()` every movement is kept; the configured precision
    /// applies once the window ends.
    pub fn record_fix(&mut self, fix: &FixSample) -> bool {
        if self.grace_deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            self.end_grace();
        }

        if !self.is_tracking || self.is_paused || self.is_finalizing {
            return false;
        }
        if !fix.is_valid() {
            debug!("[RouteSession] Ignoring invalid fix");
            return false;
        }

        let precision = if self.relaxed_filter {
            0.0
        } else {
            self.config.route_precision_meters()
        };
        let accepted = self.offer(fix, precision);
        self.publish_status();
        accepted
    }

    /// Seal the open segment with a best-fix capture and pause.
    /// No-op unless tracking and unpaused.
    pub async fn pause(&mut self) {
        if !self.is_tracking || self.is_paused {
            debug!("[RouteSession] pause ignored: not actively tracking");
            return;
        }

        self.seal_active_segment().await;
        self.is_paused = true;
        info!("[RouteSession] Tracking paused ({} segments)", self.segments.len());
        self.publish_status();
    }

    /// Open a new segment whose first fix is accepted unconditionally.
    /// No-op unless paused.
    pub fn resume(&mut self) {
        if !self.is_tracking || !self.is_paused {
            debug!("[RouteSession] resume ignored: not paused");
            return;
        }

        let config = self.config.snapshot();
        self.is_paused = false;
        self.builder.reset();
        self.builder.force_accept_next();
        self.begin_grace(&config);
        info!("[RouteSession] Tracking resumed (segment {})", self.segments.len());
        self.publish_status();
    }

    /// End the recording with a final best-fix capture. A second stop is a
    /// no-op.
    ///
    /// Stopping while paused still captures: the final fix becomes a
    /// single-point segment (no distance is bridged across the pause) unless
    /// it sits on the last recorded point.
    ///
    /// Location updates keep running so the current position can still be
    /// shown; only route recording ends.
    pub async fn stop(&mut self) {
        if !self.is_tracking {
            debug!("[RouteSession] stop ignored: not tracking");
            return;
        }

        self.seal_active_segment().await;
        self.is_tracking = false;
        self.is_paused = false;
        info!(
            "[RouteSession] Tracking stopped: {} segments, {} points",
            self.segments.len(),
            self.point_count()
        );
        self.publish_status();
    }

    /// Close the start/resume grace window and restore regular sampling.
    pub fn end_grace(&mut self) {
        self.relaxed_filter = false;
        if self.grace_deadline.take().is_some() {
            let frequency = self.config.snapshot().update_frequency_meters;
            self.source.apply_sampling(SamplingConfig::recording(frequency));
            debug!("[RouteSession] Grace window over, distance filter {:.1}m", frequency);
        }
    }

    // ------------------------------------------------------------------------
    // Outputs
    // ------------------------------------------------------------------------

    /// Package the recording for persistence. `None` if no point was recorded.
    pub fn create_route(&self, name: &str) -> Option<RouteRecord> {
        let segments = self.all_segments();
        if segments.is_empty() {
            debug!("[RouteSession] create_route: nothing recorded");
            return None;
        }

        Some(RouteRecord {
            name: name.to_string(),
            start_time_ms: self.start_time_ms,
            created_at_ms: unix_millis_now(),
            segments,
            coordinates: self.coordinates.clone(),
        })
    }

    /// MultiLineString-shaped geometry of all segments, open one included.
    pub fn export_segments(&self, properties: ExportProperties) -> SegmentGeometry {
        SegmentGeometry::new(properties, self.all_segments())
    }

    /// Distance and ascent of all segments with the current smoothing settings.
    pub fn distance_and_ascent(&self) -> MetricsResult {
        distance_and_ascent(&self.all_segments(), &self.config.snapshot().smoothing())
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn active_segment_index(&self) -> u32 {
        self.segments.len() as u32
    }

    fn offer(&mut self, fix: &FixSample, precision_meters: f64) -> bool {
        let accepted = self.builder.offer(fix, precision_meters);
        let segment_index = self.active_segment_index();
        self.coordinates
            .push(TrackCoordinate::from_fix(fix, segment_index, accepted));
        accepted
    }

    fn begin_grace(&mut self, config: &RecorderConfig) {
        self.source.apply_sampling(SamplingConfig::high_accuracy());
        self.grace_deadline = Some(Instant::now() + config.grace_period());
    }

    async fn seal_active_segment(&mut self) {
        let config = self.config.snapshot();

        self.is_finalizing = true;
        self.publish_status();

        match self.boundary_fix(&config).await {
            Some(fix) if self.is_last_recorded(&fix) => {
                debug!("[RouteSession] Boundary fix duplicates last point");
            }
            Some(fix) => {
                self.builder.append_boundary(&fix);
                let segment_index = self.active_segment_index();
                self.coordinates
                    .push(TrackCoordinate::from_fix(&fix, segment_index, true));
                debug!("[RouteSession] Appended {:.1}m boundary fix", fix.horizontal_accuracy);
            }
            None => {
                warn!("[RouteSession] {}; closing segment without a final point", RecorderError::NoFixAvailable);
            }
        }

        if let Some(segment) = self.builder.close() {
            self.segments.push(segment);
        }
        self.end_grace();
        self.is_finalizing = false;
    }

    /// Exact position match with the newest point of the recording, open
    /// segment first, then the last closed one.
    fn is_last_recorded(&self, fix: &FixSample) -> bool {
        let last = self
            .builder
            .last_point()
            .or_else(|| self.segments.last().and_then(|s| s.points.last()));
        last.is_some_and(|p| p.longitude == fix.longitude && p.latitude == fix.latitude)
    }

    /// Best-fix capture, compared against the recent-fix buffer when the
    /// capture did not reach its target.
    async fn boundary_fix(&self, config: &RecorderConfig) -> Option<FixSample> {
        let target = config.boundary_target_accuracy_meters;
        let captured = match self
            .acquisition
            .capture_best_fix(config.boundary_capture_timeout(), target)
            .await
        {
            Ok(fix) => fix,
            Err(err) => {
                warn!("[RouteSession] Boundary capture failed: {}", err);
                None
            }
        };

        if let Some(fix) = captured {
            if fix.horizontal_accuracy <= target {
                return Some(fix);
            }
        }

        let recent = self
            .acquisition
            .best_recent_sample(config.recent_fix_max_accuracy_meters, config.recent_fix_max_age());

        match (captured, recent) {
            (Some(c), Some(r)) if r.horizontal_accuracy < c.horizontal_accuracy => Some(r),
            (Some(c), _) => Some(c),
            (None, r) => r,
        }
    }

    fn publish_status(&self) {
        self.status.send_replace(self.status());
    }
}
