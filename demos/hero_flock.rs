//! The flocking hero: 1200 boids, transient clusters, pointer attraction.
//!
//! Move the cursor over the window to pull the flock.
//! Run with: cargo run --example hero_flock

use flockfx::prelude::*;

fn main() -> Result<(), SessionError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    flockfx::window::run(Preset::flocking())
}
