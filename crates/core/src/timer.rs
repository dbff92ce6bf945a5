//! High-resolution timer for frame timing and pacing.

use std::time::{Duration, Instant};

/// High-resolution timer for measuring elapsed time.
#[derive(Debug)]
pub struct Timer {
    start: Instant,
    last_tick: Instant,
}

impl Timer {
    /// Create a new timer, starting from now.
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_tick: now,
        }
    }

    /// Get the total elapsed time since the timer was created.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Get the elapsed time in seconds since the timer was created.
    pub fn elapsed_secs(&self) -> f32 {
        self.elapsed().as_secs_f32()
    }

    /// Time since the last `tick()` without consuming it.
    pub fn since_tick(&self) -> Duration {
        self.last_tick.elapsed()
    }

    /// Get the time elapsed since the last call to `tick()`.
    pub fn tick(&mut self) -> Duration {
        let now = Instant::now();
        let delta = now - self.last_tick;
        self.last_tick = now;
        delta
    }

    /// Get the delta time in seconds since the last tick.
    pub fn delta_secs(&mut self) -> f64 {
        self.tick().as_secs_f64()
    }

    /// Reset the timer to the current time.
    pub fn reset(&mut self) {
        let now = Instant::now();
        self.start = now;
        self.last_tick = now;
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

/// Accumulated time exposed to application code once per tick.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TimeData {
    /// Seconds accumulated from every `update(dt)` call.
    pub elapsed_time: f32,
    /// Frames presented so far.
    pub total_frame_count: u64,
}

impl TimeData {
    /// Adds one update step.
    pub fn advance(&mut self, dt: f32) {
        self.elapsed_time += dt;
    }

    /// Counts one presented frame.
    pub fn count_frame(&mut self) {
        self.total_frame_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_is_monotonic() {
        let mut timer = Timer::new();
        std::thread::sleep(Duration::from_millis(2));
        let first = timer.tick();
        assert!(first >= Duration::from_millis(2));
        assert!(timer.since_tick() < first + Duration::from_secs(1));
    }

    #[test]
    fn test_reset_restarts_elapsed() {
        let mut timer = Timer::new();
        std::thread::sleep(Duration::from_millis(20));
        let before = timer.elapsed();
        timer.reset();
        assert!(timer.elapsed() < before);
    }

    #[test]
    fn test_time_data_accumulates() {
        let mut time = TimeData::default();
        time.advance(0.5);
        time.advance(0.25);
        time.count_frame();
        time.count_frame();

        assert_eq!(time.elapsed_time, 0.75);
        assert_eq!(time.total_frame_count, 2);
    }
}
