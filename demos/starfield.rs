//! Twinkling starfield, colors computed by the twinkle kernel.
//!
//! Run with: cargo run --example starfield
//! Set `RUST_LOG=debug` to see which compute backend was picked.

use flockfx::prelude::*;

fn main() -> Result<(), SessionError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = StarfieldConfig::default().with_star_count(4000);
    flockfx::window::run(Preset::Starfield(config))
}
