//! Frame timing.
//!
//! [`FrameClock`] turns wall-clock instants into simulation deltas. Deltas
//! are capped so a long stall (window hidden, debugger break) does not turn
//! into one huge simulation step.
//!
//! # Example
//!
//! ```ignore
//! use flockfx::time::FrameClock;
//!
//! let mut clock = FrameClock::new();
//!
//! // In your frame callback:
//! let dt = clock.tick(Instant::now());
//!
//! println!("Elapsed: {:.2}s", clock.elapsed());
//! println!("FPS: {:.1}", clock.fps());
//! ```

use std::time::{Duration, Instant};

/// Largest delta a single frame may report, in seconds.
pub const MAX_FRAME_DELTA: f32 = 0.1;

#[derive(Debug)]
pub struct FrameClock {
    /// Instant of the previous tick, `None` until the first tick or after a rebase.
    last_frame: Option<Instant>,
    /// Accumulated simulation time in seconds (sum of capped deltas).
    elapsed_secs: f32,
    delta_secs: f32,
    frame_count: u64,
    max_delta: f32,
    /// Calculated FPS (updated periodically).
    fps: f32,
    fps_frame_count: u64,
    fps_update_time: Option<Instant>,
    fps_update_interval: Duration,
}

impl FrameClock {
    pub fn new() -> Self {
        Self {
            last_frame: None,
            elapsed_secs: 0.0,
            delta_secs: 0.0,
            frame_count: 0,
            max_delta: MAX_FRAME_DELTA,
            fps: 0.0,
            fps_frame_count: 0,
            fps_update_time: None,
            fps_update_interval: Duration::from_millis(500),
        }
    }

    /// Use a different delta cap. Negative values clamp to 0.
    pub fn with_max_delta(mut self, max_delta: f32) -> Self {
        self.max_delta = max_delta.max(0.0);
        self
    }

    /// Advance to `now` and return the capped delta in seconds.
    ///
    /// The first tick after construction or [`rebase`](Self::rebase)
    /// reports 0.
    pub fn tick(&mut self, now: Instant) -> f32 {
        let raw_delta = self
            .last_frame
            .map_or(0.0, |last| now.saturating_duration_since(last).as_secs_f32());
        self.delta_secs = raw_delta.min(self.max_delta);
        self.elapsed_secs += self.delta_secs;
        self.last_frame = Some(now);
        self.frame_count += 1;

        let window_start = *self.fps_update_time.get_or_insert(now);
        let fps_elapsed = now.saturating_duration_since(window_start);
        if fps_elapsed >= self.fps_update_interval {
            let frames_since = self.frame_count - self.fps_frame_count;
            self.fps = frames_since as f32 / fps_elapsed.as_secs_f32();
            self.fps_frame_count = self.frame_count;
            self.fps_update_time = Some(now);
        }

        self.delta_secs
    }

    /// Forget the previous frame instant, e.g. after a pause, so the gap is
    /// not counted.
    pub fn rebase(&mut self) {
        self.last_frame = None;
        self.fps_update_time = None;
        self.fps_frame_count = self.frame_count;
    }

    /// Simulation time in seconds.
    #[inline]
    pub fn elapsed(&self) -> f32 {
        self.elapsed_secs
    }

    /// Delta of the last tick in seconds.
    #[inline]
    pub fn delta(&self) -> f32 {
        self.delta_secs
    }

    /// Total ticks.
    #[inline]
    pub fn frame(&self) -> u64 {
        self.frame_count
    }

    #[inline]
    pub fn fps(&self) -> f32 {
        self.fps
    }

    #[inline]
    pub fn max_delta(&self) -> f32 {
        self.max_delta
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}
