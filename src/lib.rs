//! # flockfx - decorative particle effects
//!
//! A small real-time particle engine: boids flocking over a uniform spatial
//! grid, transient density-driven attractors, and two offloadable effects
//! (a twinkling starfield and a solar-wind stream) that run either on the
//! CPU or as wgpu compute kernels with asynchronous readback.
//!
//! ## Quick Start
//!
//! ```ignore
//! use flockfx::prelude::*;
//!
//! fn main() -> Result<(), SessionError> {
//!     flockfx::window::run(Preset::flocking())
//! }
//! ```
//!
//! ## Headless
//!
//! The simulation does not need a window:
//!
//! ```ignore
//! let mut flock = Flock::new(SimulationConfig::default().with_agent_count(100));
//! for _ in 0..1000 {
//!     flock.step(0.016);
//! }
//! println!("average speed {}", flock.average_speed());
//! ```
//!
//! ## Pieces
//!
//! | Module | What it does |
//! |--------|--------------|
//! | [`spatial`] | 27-cell neighbor queries |
//! | [`agent`] | steering, integration, boundaries, color |
//! | [`attractor`] | cluster pool with spawn/active/fade lifecycle |
//! | [`flock`] | the per-tick pipeline |
//! | [`compute`] | CPU and GPU backends for the offloadable effects |
//! | [`session`] | start / pause / resume / dispose for one surface |

pub mod agent;
pub mod attractor;
pub mod compute;
pub mod config;
pub mod effects;
pub mod error;
pub mod flock;
pub mod gpu;
pub mod render;
pub mod render_loop;
pub mod session;
pub mod shaders;
pub mod spatial;
pub mod time;
pub mod window;

pub use glam::Vec3;

/// Everything a host usually needs.
pub mod prelude {
    pub use crate::agent::Agent;
    pub use crate::attractor::{AttractorPool, Cluster, ClusterPhase};
    pub use crate::compute::{probe_backend, BackendKind, ComputeBackend, CpuBackend};
    pub use crate::config::{
        BoundaryPolicy, ClusterConfig, Environment, Preset, SimulationConfig, SolarWindConfig, StarfieldConfig,
    };
    pub use crate::effects::Effect;
    pub use crate::error::{GpuError, RenderError, SessionError};
    pub use crate::flock::Flock;
    pub use crate::gpu::PointRenderer;
    pub use crate::render::RenderTarget;
    pub use crate::render_loop::{LoopState, RenderLoop};
    pub use crate::session::EffectSession;
    pub use crate::spatial::SpatialGrid;
    pub use crate::time::FrameClock;
    pub use crate::Vec3;
}
