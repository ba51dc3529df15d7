//! # Best-Fix Capture
//!
//! Bounded wait for a high-confidence fix, used to seal a segment at pause
//! and stop without waiting indefinitely for an ideal reading.
//!
//! ## Algorithm
//! 1. Claim the single in-flight slot (a second concurrent capture is refused).
//! 2. Switch the platform to highest accuracy with no distance filter. A guard
//!    restores the previous configuration when it is dropped, so success,
//!    timeout and cancellation (the future being dropped) all restore it
//!    exactly once.
//! 3. Race the live fix feed against a timer. A fix at or below the target
//!    accuracy wins immediately; otherwise the timer wins and the most
//!    accurate fix seen during the window is returned (possibly none).
//!
//! Both wake sources funnel through one `tokio::select!`, so only one of them
//! can ever resolve the capture.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::broadcast::error::RecvError;

use crate::error::{RecorderError, Result};
use crate::location::{LocationHub, LocationSource, SamplingConfig};
use crate::FixSample;

/// Temporary sampling override, restored on drop.
struct SamplingOverride {
    source: Arc<dyn LocationSource>,
    prior: SamplingConfig,
}

impl SamplingOverride {
    fn engage(source: Arc<dyn LocationSource>, config: SamplingConfig) -> Self {
        let prior = source.sampling();
        source.apply_sampling(config);
        Self { source, prior }
    }
}

impl Drop for SamplingOverride {
    fn drop(&mut self) {
        self.source.apply_sampling(self.prior);
    }
}

/// Releases the in-flight slot on drop.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn claim(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Captures best fixes from a [`LocationHub`], temporarily overriding the
/// sampling configuration of a [`LocationSource`].
pub struct FixAcquisition {
    hub: Arc<LocationHub>,
    source: Arc<dyn LocationSource>,
    in_flight: AtomicBool,
}

impl FixAcquisition {
    pub fn new(hub: Arc<LocationHub>, source: Arc<dyn LocationSource>) -> Self {
        Self {
            hub,
            source,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn is_capturing(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Wait up to `timeout` for a fix with `horizontal_accuracy <= target_accuracy`.
    ///
    /// Returns the qualifying fix as soon as it arrives, or after the timeout
    /// the most accurate fix seen during the window (`None` if no fix arrived).
    /// Fails with [`RecorderError::CaptureInFlight`] if another capture is running.
    pub async fn capture_best_fix(
        &self,
        timeout: Duration,
        target_accuracy: f64,
    ) -> Result<Option<FixSample>> {
        let Some(_slot) = InFlight::claim(&self.in_flight) else {
            warn!("[FixAcquisition] Capture refused: another capture is in flight");
            return Err(RecorderError::CaptureInFlight);
        };

        // Subscribe before raising accuracy so no fix slips between the two.
        let mut fixes = self.hub.subscribe();
        let _override = SamplingOverride::engage(self.source.clone(), SamplingConfig::high_accuracy());

        debug!(
            "[FixAcquisition] Capturing best fix (target {:.1}m, timeout {:?})",
            target_accuracy, timeout
        );

        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        let mut best_seen: Option<FixSample> = None;

        loop {
            tokio::select! {
                biased;

                received = fixes.recv() => match received {
                    Ok(fix) => {
                        if fix.horizontal_accuracy <= target_accuracy {
                            info!(
                                "[FixAcquisition] Target met with {:.1}m fix",
                                fix.horizontal_accuracy
                            );
                            return Ok(Some(fix));
                        }
                        if best_seen.map_or(true, |b| fix.horizontal_accuracy < b.horizontal_accuracy) {
                            best_seen = Some(fix);
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("[FixAcquisition] Feed lagged, skipped {} fixes", skipped);
                    }
                    Err(RecvError::Closed) => {
                        // No more fixes can arrive; waiting out the timer is pointless.
                        warn!("[FixAcquisition] Fix feed closed during capture");
                        return Ok(best_seen);
                    }
                },

                _ = &mut deadline => {
                    match best_seen {
                        Some(fix) => info!(
                            "[FixAcquisition] Timed out, using best seen {:.1}m fix",
                            fix.horizontal_accuracy
                        ),
                        None => info!("[FixAcquisition] Timed out with no fix"),
                    }
                    return Ok(best_seen);
                }
            }
        }
    }

    /// Fallback when a capture yields nothing usable: the most accurate
    /// buffered fix within `min_accuracy` and `max_age`.
    pub fn best_recent_sample(&self, min_accuracy: f64, max_age: Duration) -> Option<FixSample> {
        self.hub.best_recent_sample(min_accuracy, max_age)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::ManualLocationSource;
    use tokio::time::Instant;

    fn fix(accuracy: f64, timestamp_ms: i64) -> FixSample {
        FixSample::new(46.5, 8.0, 1500.0, accuracy, 3.0, timestamp_ms)
    }

    fn setup() -> (Arc<LocationHub>, Arc<ManualLocationSource>, FixAcquisition) {
        let hub = Arc::new(LocationHub::new());
        let source = Arc::new(ManualLocationSource::authorized());
        let acquisition = FixAcquisition::new(hub.clone(), source.clone());
        (hub, source, acquisition)
    }

    fn publish_after(hub: &Arc<LocationHub>, delay_ms: u64, fix: FixSample) {
        let hub = hub.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            hub.publish(fix).unwrap();
        });
    }

    #[tokio::test(start_paused = true)]
    async fn test_early_exit_on_target_accuracy() {
        let (hub, _source, acquisition) = setup();
        publish_after(&hub, 1_000, fix(4.0, 1));
        publish_after(&hub, 2_000, fix(2.0, 2));

        let started = Instant::now();
        let result = acquisition
            .capture_best_fix(Duration::from_secs(3), 5.0)
            .await
            .unwrap();

        assert_eq!(result.unwrap().timestamp_ms, 1);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_falls_back_to_best_seen() {
        let (hub, _source, acquisition) = setup();
        publish_after(&hub, 500, fix(12.0, 1));
        publish_after(&hub, 1_000, fix(7.0, 2));
        publish_after(&hub, 2_000, fix(9.0, 3));

        let started = Instant::now();
        let result = acquisition
            .capture_best_fix(Duration::from_secs(3), 5.0)
            .await
            .unwrap();

        assert_eq!(result.unwrap().timestamp_ms, 2);
        assert!(started.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_with_no_fix() {
        let (_hub, _source, acquisition) = setup();
        let result = acquisition
            .capture_best_fix(Duration::from_secs(3), 5.0)
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_fixes_never_reach_capture() {
        let (hub, _source, acquisition) = setup();
        let hub_clone = hub.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            assert!(hub_clone.publish(fix(0.0, 1)).is_err());
        });

        let result = acquisition
            .capture_best_fix(Duration::from_secs(1), 5.0)
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sampling_restored_after_success_and_timeout() {
        let (hub, source, acquisition) = setup();
        let original = source.sampling();

        publish_after(&hub, 100, fix(3.0, 1));
        acquisition.capture_best_fix(Duration::from_secs(3), 5.0).await.unwrap();
        assert_eq!(source.sampling(), original);

        acquisition.capture_best_fix(Duration::from_secs(3), 5.0).await.unwrap();
        assert_eq!(source.sampling(), original);

        // engage + restore per capture
        let applied = source.applied_sampling();
        assert_eq!(applied.len(), 4);
        assert_eq!(applied[0], SamplingConfig::high_accuracy());
        assert_eq!(applied[1], original);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_capture_restores_sampling() {
        let (_hub, source, acquisition) = setup();
        let original = source.sampling();

        let cancelled = tokio::time::timeout(
            Duration::from_millis(500),
            acquisition.capture_best_fix(Duration::from_secs(3), 5.0),
        )
        .await;

        assert!(cancelled.is_err());
        assert_eq!(source.sampling(), original);
        assert!(!acquisition.is_capturing());
        assert_eq!(source.applied_sampling().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_concurrent_capture_is_refused() {
        let (hub, source, acquisition) = setup();
        let original = source.sampling();
        publish_after(&hub, 1_000, fix(3.0, 7));

        let (first, second) = tokio::join!(
            acquisition.capture_best_fix(Duration::from_secs(3), 5.0),
            acquisition.capture_best_fix(Duration::from_secs(3), 5.0),
        );

        assert_eq!(first.unwrap().unwrap().timestamp_ms, 7);
        assert_eq!(second, Err(RecorderError::CaptureInFlight));
        assert_eq!(source.sampling(), original);
        assert_eq!(source.applied_sampling().len(), 2);
    }

    /// Platform that delivers a fix the moment high accuracy is engaged.
    struct EagerSource {
        inner: ManualLocationSource,
        hub: Arc<LocationHub>,
        fix: FixSample,
    }

    impl LocationSource for EagerSource {
        fn authorization(&self) -> crate::location::Authorization {
            self.inner.authorization()
        }

        fn request_authorization(&self) {
            self.inner.request_authorization();
        }

        fn sampling(&self) -> SamplingConfig {
            self.inner.sampling()
        }

        fn apply_sampling(&self, config: SamplingConfig) {
            self.inner.apply_sampling(config);
            if config == SamplingConfig::high_accuracy() {
                self.hub.publish(self.fix).unwrap();
            }
        }

        fn start_updates(&self) {
            self.inner.start_updates();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fix_wins_when_ready_with_deadline() {
        let hub = Arc::new(LocationHub::new());
        let source = Arc::new(EagerSource {
            inner: ManualLocationSource::authorized(),
            hub: hub.clone(),
            fix: fix(3.0, 42),
        });
        let acquisition = FixAcquisition::new(hub, source.clone());
        let original = source.sampling();

        // Zero timeout: the deadline and the fix are both ready on the first poll.
        let result = acquisition
            .capture_best_fix(Duration::ZERO, 5.0)
            .await
            .unwrap();

        assert_eq!(result.map(|f| f.timestamp_ms), Some(42));
        assert_eq!(source.sampling(), original);
        assert_eq!(source.inner.applied_sampling().len(), 2);
        assert!(!acquisition.is_capturing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_poor_fix_ready_with_deadline_is_still_best_seen() {
        let hub = Arc::new(LocationHub::new());
        let source = Arc::new(EagerSource {
            inner: ManualLocationSource::authorized(),
            hub: hub.clone(),
            fix: fix(9.0, 43),
        });
        let acquisition = FixAcquisition::new(hub, source);

        let result = acquisition
            .capture_best_fix(Duration::ZERO, 5.0)
            .await
            .unwrap();

        assert_eq!(result.map(|f| f.timestamp_ms), Some(43));
    }

    #[tokio::test(start_paused = true)]
    async fn test_best_recent_sample_fallback() {
        let (hub, _source, acquisition) = setup();
        hub.publish(fix(15.0, 1)).unwrap();
        hub.publish(fix(8.0, 2)).unwrap();
        hub.publish(fix(40.0, 3)).unwrap();

        let best = acquisition.best_recent_sample(20.0, Duration::from_secs(10)).unwrap();
        assert_eq!(best.timestamp_ms, 2);

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(acquisition.best_recent_sample(20.0, Duration::from_secs(10)).is_none());
    }
}
