//! Frame timing for the main loop.

use std::time::{Duration, Instant};

/// Measures frame deltas and accumulates a once-per-interval frame rate.
#[derive(Debug)]
pub struct FrameTimer {
    last_tick: Instant,
    window_start: Instant,
    window_frames: u32,
    report_interval: Duration,
    total_frames: u64,
}

impl FrameTimer {
    /// Create a timer that reports once per second.
    pub fn new() -> Self {
        Self::with_report_interval(Duration::from_secs(1))
    }

    /// Create a timer with a custom report interval.
    pub fn with_report_interval(report_interval: Duration) -> Self {
        let now = Instant::now();
        Self {
            last_tick: now,
            window_start: now,
            window_frames: 0,
            report_interval,
            total_frames: 0,
        }
    }

    /// Mark the end of a frame and return the time since the previous one.
    pub fn tick(&mut self) -> Duration {
        let now = Instant::now();
        let delta = now - self.last_tick;
        self.last_tick = now;
        self.window_frames += 1;
        self.total_frames += 1;
        delta
    }

    /// Average frames per second over the elapsed interval, if one has passed.
    ///
    /// Resets the interval when it returns `Some`.
    pub fn take_report(&mut self) -> Option<f64> {
        let elapsed = self.window_start.elapsed();
        if elapsed < self.report_interval || self.window_frames == 0 {
            return None;
        }

        let fps = f64::from(self.window_frames) / elapsed.as_secs_f64();
        self.window_start = Instant::now();
        self.window_frames = 0;
        Some(fps)
    }

    /// Frames ticked since creation.
    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }
}

impl Default for FrameTimer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_counts_frames() {
        let mut timer = FrameTimer::new();
        timer.tick();
        timer.tick();
        assert_eq!(timer.total_frames(), 2);
    }

    #[test]
    fn test_report_after_interval() {
        let mut timer = FrameTimer::with_report_interval(Duration::ZERO);
        assert!(timer.take_report().is_none());

        timer.tick();
        std::thread::sleep(Duration::from_millis(2));
        let fps = timer.take_report().expect("interval elapsed");
        assert!(fps > 0.0);
        assert!(timer.take_report().is_none());
    }
}
