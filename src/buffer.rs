//! Ring of the most recent valid fixes.
//!
//! The buffer is never a primary point source. It is consulted only when a
//! best-fix capture comes back empty-handed or with a fix worse than one we
//! already saw a moment ago.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

use crate::FixSample;

/// Number of fixes retained.
pub const RECENT_FIX_CAPACITY: usize = 10;

/// A fix together with the moment the hub received it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BufferedFix {
    pub fix: FixSample,
    pub received_at: Instant,
}

impl BufferedFix {
    /// Age relative to `now`. Saturates to zero for fixes "from the future".
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.received_at)
    }
}

/// Fixed-capacity FIFO; the oldest entry is evicted on overflow.
#[derive(Debug, Clone)]
pub struct RecentFixBuffer {
    entries: VecDeque<BufferedFix>,
    capacity: usize,
}

impl Default for RecentFixBuffer {
    fn default() -> Self {
        Self::with_capacity(RECENT_FIX_CAPACITY)
    }
}

impl RecentFixBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, fix: FixSample, received_at: Instant) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(BufferedFix { fix, received_at });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &BufferedFix> {
        self.entries.iter()
    }

    /// Most accurate fix with `horizontal_accuracy <= min_accuracy` that is no
    /// older than `max_age` at `now`. Ties go to the newer fix.
    pub fn best_recent(&self, min_accuracy: f64, max_age: Duration, now: Instant) -> Option<FixSample> {
        self.entries
            .iter()
            .rev()
            .filter(|e| e.fix.horizontal_accuracy <= min_accuracy && e.age(now) <= max_age)
            .fold(None::<&BufferedFix>, |best, e| match best {
                Some(b) if b.fix.horizontal_accuracy <= e.fix.horizontal_accuracy => Some(b),
                _ => Some(e),
            })
            .map(|e| e.fix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fix(accuracy: f64, timestamp_ms: i64) -> FixSample {
        FixSample::new(46.5, 8.0, 1500.0, accuracy, 3.0, timestamp_ms)
    }

    #[test]
    fn test_evicts_oldest_on_overflow() {
        let now = Instant::now();
        let mut buffer = RecentFixBuffer::default();
        for i in 0..15 {
            buffer.push(fix(10.0, i), now);
        }
        assert_eq!(buffer.len(), RECENT_FIX_CAPACITY);
        let first = buffer.iter().next().unwrap();
        assert_eq!(first.fix.timestamp_ms, 5);
    }

    #[test]
    fn test_best_recent_picks_most_accurate() {
        let now = Instant::now();
        let mut buffer = RecentFixBuffer::default();
        buffer.push(fix(12.0, 1), now);
        buffer.push(fix(6.0, 2), now);
        buffer.push(fix(9.0, 3), now);

        let best = buffer.best_recent(20.0, Duration::from_secs(10), now).unwrap();
        assert_eq!(best.timestamp_ms, 2);
    }

    #[test]
    fn test_best_recent_respects_accuracy_limit() {
        let now = Instant::now();
        let mut buffer = RecentFixBuffer::default();
        buffer.push(fix(30.0, 1), now);
        assert!(buffer.best_recent(20.0, Duration::from_secs(10), now).is_none());
    }

    #[test]
    fn test_best_recent_respects_age_limit() {
        let start = Instant::now();
        let mut buffer = RecentFixBuffer::default();
        buffer.push(fix(3.0, 1), start);
        buffer.push(fix(8.0, 2), start + Duration::from_secs(15));

        let now = start + Duration::from_secs(20);
        let best = buffer.best_recent(20.0, Duration::from_secs(10), now).unwrap();
        assert_eq!(best.timestamp_ms, 2);
    }

    #[test]
    fn test_best_recent_tie_prefers_newer() {
        let now = Instant::now();
        let mut buffer = RecentFixBuffer::default();
        buffer.push(fix(5.0, 1), now);
        buffer.push(fix(5.0, 2), now);
        let best = buffer.best_recent(20.0, Duration::from_secs(10), now).unwrap();
        assert_eq!(best.timestamp_ms, 2);
    }

    #[test]
    fn test_empty_buffer() {
        let buffer = RecentFixBuffer::default();
        assert!(buffer.is_empty());
        assert!(buffer.best_recent(100.0, Duration::from_secs(60), Instant::now()).is_none());
    }
}
