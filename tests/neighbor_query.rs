//! Grid queries against a brute-force distance check.

use flockfx::agent::Agent;
use flockfx::config::SimulationConfig;
use flockfx::spatial::SpatialGrid;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn agents(count: usize, seed: u64, config: &SimulationConfig) -> Vec<Agent> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| Agent::random(&mut rng, config.bounds, config.max_speed))
        .collect()
}

#[test]
fn test_no_false_negatives_within_neighbor_radius() {
    // Small bounds so the 50 agents actually have neighbors.
    let config = SimulationConfig::default().with_bounds(4.0);
    let radius = config.neighbor_radius();
    let radius_sq = radius * radius;

    for seed in 0..5 {
        let agents = agents(50, seed, &config);
        let mut grid = SpatialGrid::new();
        grid.rebuild(agents.iter().map(|a| a.position), config.bounds, config.cell_size);

        let mut pairs = 0;
        for (i, a) in agents.iter().enumerate() {
            let found = grid.query_neighbors(a.position);
            assert!(found.contains(&i), "query must include the agent itself");

            for (j, b) in agents.iter().enumerate() {
                if a.position.distance_squared(b.position) <= radius_sq {
                    pairs += 1;
                    assert!(found.contains(&j), "seed {}: agent {} missed neighbor {}", seed, i, j);
                }
            }
        }
        assert!(pairs > agents.len(), "dataset should contain real neighbor pairs");
    }
}

#[test]
fn test_query_returns_exactly_the_27_cell_block() {
    let config = SimulationConfig::default();
    for seed in [7, 99] {
        let agents = agents(200, seed, &config);
        let mut grid = SpatialGrid::new();
        grid.rebuild(agents.iter().map(|a| a.position), config.bounds, config.cell_size);

        for a in &agents {
            let key = grid.key(a.position);
            let mut found = grid.query_neighbors(a.position);
            found.sort_unstable();

            let expected: Vec<usize> = agents
                .iter()
                .enumerate()
                .filter(|(_, b)| (grid.key(b.position) - key).abs().max_element() <= 1)
                .map(|(j, _)| j)
                .collect();
            assert_eq!(found, expected, "seed {}", seed);
        }
    }
}

#[test]
fn test_query_on_empty_grid() {
    let grid = SpatialGrid::new();
    assert!(grid.query_neighbors(flockfx::Vec3::ZERO).is_empty());
}
