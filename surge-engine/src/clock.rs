//! Run-relative timestamps and deadlines.
//!
//! All measurements go through `tokio::time` so a paused test runtime can
//! advance them deterministically.

use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Monotonic start point of a run, paired with the wall-clock time it began
#[derive(Debug, Clone, Copy)]
pub struct RunClock {
    started: Instant,
    started_at: DateTime<Utc>,
}

impl RunClock {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
            started_at: Utc::now(),
        }
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Milliseconds since start with sub-millisecond precision
    pub fn elapsed_ms(&self) -> f64 {
        duration_ms(self.elapsed())
    }

    /// Absolute instant `duration` after the start
    pub fn deadline(&self, duration: Duration) -> Instant {
        self.started + duration
    }

    pub fn is_past(&self, deadline: Instant) -> bool {
        Instant::now() >= deadline
    }

    /// Time left until `deadline`, zero once it has passed
    pub fn remaining(&self, deadline: Instant) -> Duration {
        deadline.saturating_duration_since(Instant::now())
    }

    /// Wall-clock time corresponding to an offset from the start
    pub fn wall_time_at(&self, elapsed: Duration) -> DateTime<Utc> {
        match chrono::Duration::from_std(elapsed) {
            Ok(offset) => self.started_at + offset,
            Err(_) => self.started_at,
        }
    }
}

pub fn duration_ms(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

/// Await `fut` and report how long it took in milliseconds
pub async fn timed<F: Future>(fut: F) -> (F::Output, f64) {
    let start = Instant::now();
    let output = fut.await;
    (output, duration_ms(start.elapsed()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_follows_paused_time() {
        let clock = RunClock::start();
        tokio::time::advance(Duration::from_millis(250)).await;
        assert!((clock.elapsed_ms() - 250.0).abs() < 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_and_remaining() {
        let clock = RunClock::start();
        let deadline = clock.deadline(Duration::from_secs(1));
        assert!(!clock.is_past(deadline));
        assert_eq!(clock.remaining(deadline), Duration::from_secs(1));

        tokio::time::advance(Duration::from_millis(1500)).await;
        assert!(clock.is_past(deadline));
        assert_eq!(clock.remaining(deadline), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_measures_sleep() {
        let (value, ms) = timed(async {
            tokio::time::sleep(Duration::from_millis(40)).await;
            7
        })
        .await;
        assert_eq!(value, 7);
        assert!(ms >= 40.0);
    }

    #[test]
    fn test_wall_time_offset() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        rt.block_on(async {
            let clock = RunClock::start();
            let later = clock.wall_time_at(Duration::from_secs(2));
            assert_eq!((later - clock.started_at()).num_milliseconds(), 2000);
        });
    }
}
