//! Drift-corrected frame pacing
//!
//! The engine sleeps between frames to match the source frame rate. Naive
//! fixed sleeps accumulate drift because decode and inference time varies per
//! frame; the clock subtracts the time already spent this tick from the
//! target interval so playback stays on schedule.

use std::time::{Duration, Instant};

/// Floor on the inter-frame delay. Even when processing overruns the target
/// interval the loop yields at least this long so control threads can grab
/// the state mutex.
pub const MIN_DELAY: Duration = Duration::from_millis(1);

/// Sleep used while paused or finished, bounding command latency to ~50ms
pub const IDLE_DELAY: Duration = Duration::from_millis(50);

/// Tracks tick start times and computes the remaining delay per frame
#[derive(Debug, Default)]
pub struct PlaybackClock {
    tick_start: Option<Instant>,
}

impl PlaybackClock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the start of a tick, before decode and inference
    pub fn mark(&mut self, now: Instant) {
        self.tick_start = Some(now);
    }

    /// Forget the last tick. Called after a seek or loop wrap so the first
    /// frame at the new position is not penalized for time spent seeking.
    pub fn reset(&mut self) {
        self.tick_start = None;
    }

    /// Remaining delay for this tick: `max(MIN_DELAY, base / speed - elapsed)`
    /// where `elapsed` is the time since [`mark`](Self::mark).
    #[must_use]
    pub fn next_delay(&self, base: Duration, speed: f32, now: Instant) -> Duration {
        // Scale in nanoseconds; Duration::div_f32 loses precision through
        // f32 seconds
        let target = if speed > 0.0 {
            Duration::from_nanos((base.as_nanos() as f64 / f64::from(speed)).round() as u64)
        } else {
            base
        };

        let elapsed = match self.tick_start {
            Some(start) => now.saturating_duration_since(start),
            None => Duration::ZERO,
        };

        target.saturating_sub(elapsed).max(MIN_DELAY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: Duration = Duration::from_millis(33);

    #[test]
    fn test_full_interval_when_processing_is_instant() {
        let mut clock = PlaybackClock::new();
        let now = Instant::now();
        clock.mark(now);
        assert_eq!(clock.next_delay(BASE, 1.0, now), BASE);
    }

    #[test]
    fn test_elapsed_time_is_subtracted() {
        let mut clock = PlaybackClock::new();
        let start = Instant::now();
        clock.mark(start);
        let later = start + Duration::from_millis(10);
        assert_eq!(clock.next_delay(BASE, 1.0, later), Duration::from_millis(23));
    }

    #[test]
    fn test_overrun_clamps_to_min_delay() {
        let mut clock = PlaybackClock::new();
        let start = Instant::now();
        clock.mark(start);
        let later = start + Duration::from_millis(100);
        assert_eq!(clock.next_delay(BASE, 1.0, later), MIN_DELAY);
    }

    #[test]
    fn test_speed_divides_interval() {
        let mut clock = PlaybackClock::new();
        let now = Instant::now();
        clock.mark(now);
        // 33ms at 2x -> 16.5ms
        assert_eq!(clock.next_delay(BASE, 2.0, now), Duration::from_micros(16_500));
        // 33ms at 0.5x -> 66ms
        assert_eq!(clock.next_delay(BASE, 0.5, now), Duration::from_millis(66));
    }

    #[test]
    fn test_delay_never_exceeds_scaled_interval() {
        let mut clock = PlaybackClock::new();
        let now = Instant::now();
        clock.mark(now);
        for speed in [0.25f32, 1.0, 2.0, 4.0] {
            let delay = clock.next_delay(BASE, speed, now + Duration::from_millis(5));
            let target = Duration::from_nanos((BASE.as_nanos() as f64 / f64::from(speed)) as u64);
            assert!(delay <= target);
            assert!(delay >= MIN_DELAY);
        }
    }

    #[test]
    fn test_reset_forgets_elapsed() {
        let mut clock = PlaybackClock::new();
        let start = Instant::now();
        clock.mark(start);
        clock.reset();
        let later = start + Duration::from_millis(100);
        assert_eq!(clock.next_delay(BASE, 1.0, later), BASE);
    }
}
