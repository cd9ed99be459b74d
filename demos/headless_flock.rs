//! Run the flocking simulation without a window and print statistics.
//!
//! Run with: cargo run --example headless_flock [agent_count] [ticks]

use flockfx::prelude::*;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let count: usize = std::env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(1200);
    let ticks: u64 = std::env::args()
        .nth(2)
        .and_then(|s| s.parse().ok())
        .unwrap_or(2000);

    let mut flock = Flock::new(SimulationConfig::default().with_agent_count(count));
    let started = std::time::Instant::now();

    for tick in 1..=ticks {
        flock.step(0.016);
        if tick % 250 == 0 {
            let crowded = flock.agents().iter().filter(|a| a.neighbor_count >= 8).count();
            println!(
                "tick {:>5}: avg speed {:.4}, clusters {}, crowded agents {}, grid cells {}",
                tick,
                flock.average_speed(),
                flock.pool().len(),
                crowded,
                flock.grid().occupied_cells(),
            );
        }
    }

    let elapsed = started.elapsed();
    println!(
        "{} ticks of {} agents in {:.2?} ({:.3} ms/tick)",
        ticks,
        count,
        elapsed,
        elapsed.as_secs_f64() * 1000.0 / ticks as f64
    );

    let backend = probe_backend(&BackendKind::PROBE_ORDER);
    println!("compute backend available: {}", backend.kind());
}
