//! Solar-wind stream: particles with finite lifetime respawning at the origin.
//!
//! Run with: cargo run --example solar_wind

use flockfx::prelude::*;

fn main() -> Result<(), SessionError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = SolarWindConfig::default()
        .with_particle_count(6000)
        .with_origin(Vec3::new(-14.0, 0.0, 0.0));
    flockfx::window::run(Preset::SolarWind(config))
}
