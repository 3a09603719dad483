//! Wall-clock access and sleep/wake detection.
//!
//! Timers run on tokio's monotonic clock, which stops while the machine is
//! suspended. The wall clock keeps going, so a gap between the two after a
//! poll means the system slept.

use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::time::Instant;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

impl<T: Clock + ?Sized> Clock for std::sync::Arc<T> {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// True when the wall clock advanced more than `threshold` beyond the
/// monotonic clock over the same interval.
pub fn slept_between(wall_elapsed: chrono::TimeDelta, mono_elapsed: Duration, threshold: Duration) -> bool {
    let Ok(wall) = wall_elapsed.to_std() else {
        // Wall clock went backwards (manual change); not a sleep.
        return false;
    };
    wall.saturating_sub(mono_elapsed) > threshold
}

/// Polls both clocks and calls `on_wake` once per detected sleep period.
pub struct WakeDetector<C> {
    clock: C,
    poll: Duration,
    threshold: Duration,
}

impl<C: Clock> WakeDetector<C> {
    pub fn new(clock: C, poll: Duration, threshold: Duration) -> Self {
        Self {
            clock,
            poll,
            threshold,
        }
    }

    /// Runs until `on_wake` returns `false`.
    pub async fn run<F>(self, mut on_wake: F)
    where
        F: FnMut() -> bool,
    {
        let mut last_wall = self.clock.now();
        let mut last_mono = Instant::now();
        tracing::debug!(poll = ?self.poll, threshold = ?self.threshold, "wake detector started");

        loop {
            tokio::time::sleep(self.poll).await;

            let wall = self.clock.now();
            let mono = Instant::now();
            let wall_elapsed = wall.signed_duration_since(last_wall);
            let mono_elapsed = mono.duration_since(last_mono);
            last_wall = wall;
            last_mono = mono;

            if slept_between(wall_elapsed, mono_elapsed, self.threshold) {
                tracing::info!(
                    asleep_secs = (wall_elapsed.num_seconds() - mono_elapsed.as_secs() as i64),
                    "system woke from sleep"
                );
                if !on_wake() {
                    break;
                }
            }
        }

        tracing::debug!("wake detector stopped");
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Manually driven wall clock.
    #[derive(Debug)]
    pub struct ManualClock {
        now: Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        pub fn new(now: DateTime<Utc>) -> Self {
            Self {
                now: Mutex::new(now),
            }
        }

        pub fn advance(&self, by: Duration) {
            let mut now = self.now.lock().unwrap();
            *now += chrono::TimeDelta::from_std(by).unwrap();
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock().unwrap()
        }
    }

    /// Wall clock that follows tokio's (pausable) clock from a fixed origin,
    /// truncated to whole seconds so timer rounding does not leak into
    /// assertions.
    #[derive(Debug, Clone)]
    pub struct TokioClock {
        origin: DateTime<Utc>,
        started: Instant,
    }

    impl TokioClock {
        pub fn new(origin: DateTime<Utc>) -> Self {
            Self {
                origin,
                started: Instant::now(),
            }
        }
    }

    impl Clock for TokioClock {
        fn now(&self) -> DateTime<Utc> {
            self.origin + chrono::TimeDelta::seconds(self.started.elapsed().as_secs() as i64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::ManualClock;
    use super::*;
    use chrono::{TimeDelta, TimeZone};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn gap_detection() {
        let threshold = Duration::from_secs(30);
        let poll = Duration::from_secs(5);
        assert!(!slept_between(TimeDelta::seconds(5), poll, threshold));
        assert!(!slept_between(TimeDelta::seconds(30), poll, threshold));
        assert!(slept_between(TimeDelta::seconds(36), poll, threshold));
        assert!(slept_between(TimeDelta::hours(8), poll, threshold));
        assert!(!slept_between(TimeDelta::seconds(-600), poll, threshold));
    }

    #[tokio::test(start_paused = true)]
    async fn detector_reports_a_wall_clock_jump_once() {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 5, 4, 8, 0, 0).unwrap(),
        ));
        let wakes = Arc::new(AtomicUsize::new(0));
        let poll = Duration::from_secs(5);

        let detector = WakeDetector::new(clock.clone(), poll, Duration::from_secs(30));
        let counter = wakes.clone();
        let task = tokio::spawn(detector.run(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            false
        }));

        // Two quiet polls: wall and monotonic advance together.
        for _ in 0..2 {
            clock.advance(poll);
            tokio::time::advance(poll).await;
            tokio::task::yield_now().await;
        }
        assert_eq!(wakes.load(Ordering::SeqCst), 0);

        // The laptop lid was closed for an hour.
        clock.advance(Duration::from_secs(3600) + poll);
        tokio::time::advance(poll).await;
        task.await.unwrap();
        assert_eq!(wakes.load(Ordering::SeqCst), 1);
    }
}
