//! Per-frame scheduling state.
//!
//! The host owns the actual frame callback (a winit redraw request, a test
//! loop). [`RenderLoop`] decides whether a callback should run and how much
//! simulation time it covers.
//!
//! ```text
//!   Idle --start--> Running <--resume/pause--> Paused
//!     \               |                          /
//!      `-----------dispose--> Disposed <--------'
//! ```

use std::time::Instant;

use crate::time::FrameClock;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running,
    Paused,
    Disposed,
}

#[derive(Debug)]
pub struct RenderLoop {
    state: LoopState,
    clock: FrameClock,
    loaded: bool,
}

impl RenderLoop {
    pub fn new() -> Self {
        Self::with_clock(FrameClock::new())
    }

    pub fn with_clock(clock: FrameClock) -> Self {
        Self {
            state: LoopState::Idle,
            clock,
            loaded: false,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn clock(&self) -> &FrameClock {
        &self.clock
    }

    /// Whether the host should keep scheduling frame callbacks.
    pub fn is_running(&self) -> bool {
        self.state == LoopState::Running
    }

    /// Whether a frame has been rendered successfully.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Begin scheduling. No effect if running or disposed; a paused loop
    /// resumes.
    ///
    /// Returns `true` if the state changed.
    pub fn start(&mut self) -> bool {
        match self.state {
            LoopState::Idle => {
                self.clock.rebase();
                self.state = LoopState::Running;
                true
            }
            LoopState::Paused => self.resume(),
            LoopState::Running | LoopState::Disposed => false,
        }
    }

    /// Stop scheduling and keep all state.
    pub fn pause(&mut self) -> bool {
        if self.state != LoopState::Running {
            return false;
        }
        self.state = LoopState::Paused;
        true
    }

    /// Continue after [`pause`](Self::pause). The paused interval does not
    /// count as simulation time.
    pub fn resume(&mut self) -> bool {
        if self.state != LoopState::Paused {
            return false;
        }
        self.clock.rebase();
        self.state = LoopState::Running;
        true
    }

    /// Stop for good. Returns `false` if already disposed.
    pub fn dispose(&mut self) -> bool {
        if self.state == LoopState::Disposed {
            return false;
        }
        self.state = LoopState::Disposed;
        true
    }

    /// Start a frame at `now`. Returns the capped delta in seconds, or
    /// `None` if no frame should run.
    pub fn begin_frame(&mut self, now: Instant) -> Option<f32> {
        self.is_running().then(|| self.clock.tick(now))
    }

    /// Record a successful draw. Returns `true` exactly once, for the first.
    pub fn mark_rendered(&mut self) -> bool {
        !std::mem::replace(&mut self.loaded, true)
    }
}

impl Default for RenderLoop {
    fn default() -> Self {
        Self::new()
    }
}
