//! The flocking step.
//!
//! One call to [`Flock::step`] runs the whole per-tick pipeline:
//!
//! 1. advance the attractor pool (intensity, drift, formation check)
//! 2. rebuild the spatial grid from current positions
//! 3. per agent: query the 27-cell neighborhood, gather boids steering and
//!    attractor pull
//! 4. integrate every agent and apply the boundary policy
//! 5. derive render colors
//!
//! Forces are computed for every agent before any agent moves, so the
//! result does not depend on iteration order.

use glam::Vec3;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::agent::{attraction, attractor_proximity, derive_color, Agent, AttractorPoint, Steering};
use crate::attractor::AttractorPool;
use crate::config::SimulationConfig;
use crate::spatial::SpatialGrid;

pub struct Flock {
    config: SimulationConfig,
    agents: Vec<Agent>,
    grid: SpatialGrid,
    pool: AttractorPool,
    pointer: Option<Vec3>,
    rng: StdRng,
    ticks: u64,
    // Scratch buffers reused across ticks.
    neighbors: Vec<usize>,
    forces: Vec<Vec3>,
    counts: Vec<usize>,
    attractors: Vec<AttractorPoint>,
}

impl Flock {
    /// Scatter `config.agent_count` agents randomly inside the bounds.
    pub fn new(config: SimulationConfig) -> Self {
        let mut rng = StdRng::seed_from_u64(config.seed);
        let agents = (0..config.agent_count)
            .map(|_| Agent::random(&mut rng, config.bounds, config.max_speed))
            .collect();
        Self::from_parts(config, agents, rng)
    }

    /// Start from explicit agents. `config.agent_count` is ignored.
    pub fn with_agents(config: SimulationConfig, agents: Vec<Agent>) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self::from_parts(config, agents, rng)
    }

    fn from_parts(config: SimulationConfig, agents: Vec<Agent>, rng: StdRng) -> Self {
        let count = agents.len();
        Self {
            pool: AttractorPool::new(config.clusters.clone()),
            config,
            agents,
            grid: SpatialGrid::new(),
            pointer: None,
            rng,
            ticks: 0,
            neighbors: Vec::new(),
            forces: vec![Vec3::ZERO; count],
            counts: vec![0; count],
            attractors: Vec::new(),
        }
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn pool(&self) -> &AttractorPool {
        &self.pool
    }

    pub fn grid(&self) -> &SpatialGrid {
        &self.grid
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// World-space pointer position, or `None` when the pointer left the surface.
    pub fn set_pointer(&mut self, pointer: Option<Vec3>) {
        self.pointer = pointer;
    }

    pub fn pointer(&self) -> Option<Vec3> {
        self.pointer
    }

    /// Average agent speed.
    pub fn average_speed(&self) -> f32 {
        if self.agents.is_empty() {
            return 0.0;
        }
        self.agents.iter().map(Agent::speed).sum::<f32>() / self.agents.len() as f32
    }

    /// Run one tick. `delta_time` is seconds and only drives attractor timing;
    /// agent motion is per tick.
    pub fn step(&mut self, delta_time: f32) {
        let Self {
            config,
            agents,
            grid,
            pool,
            pointer,
            rng,
            neighbors,
            forces,
            counts,
            attractors,
            ..
        } = self;

        pool.update(delta_time * 1000.0, agents, config.bounds, rng);

        attractors.clear();
        attractors.extend(pool.attractors());
        if let Some(point) = *pointer {
            attractors.push(AttractorPoint {
                position: point,
                radius: config.pointer_radius,
                strength: config.pointer_strength,
                intensity: 1.0,
            });
        }

        grid.rebuild(agents.iter().map(|a| a.position), config.bounds, config.cell_size);

        forces.resize(agents.len(), Vec3::ZERO);
        counts.resize(agents.len(), 0);
        let max_pull = pool.config().max_combined_force;
        for (index, agent) in agents.iter().enumerate() {
            grid.query_neighbors_into(agent.position, neighbors);
            let steering = Steering::gather(agent, neighbors.iter().map(|&j| &agents[j]), config);
            let pull = attraction(agent.position, attractors.iter(), max_pull);
            forces[index] = steering.combined(config) + pull * config.attraction_weight;
            counts[index] = steering.neighbor_count;
        }

        let speed_ref = config.max_speed.max(f32::EPSILON);
        for ((agent, force), count) in agents.iter_mut().zip(forces.iter()).zip(counts.iter()) {
            agent.neighbor_count = *count;
            agent.apply_force(*force);
            agent.integrate(config.max_speed);
            agent.apply_boundary(config.bounds, config.boundary, rng);
        }

        for agent in agents.iter_mut() {
            let density = agent.neighbor_count as f32 / config.colors.density_reference;
            let proximity = attractor_proximity(agent.position, attractors.iter());
            agent.color = derive_color(agent.speed() / speed_ref, density, proximity, &config.colors);
        }

        self.ticks += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClusterConfig;

    fn small_config() -> SimulationConfig {
        SimulationConfig::default()
            .with_agent_count(200)
            .with_bounds(8.0)
            .with_seed(42)
    }

    #[test]
    fn test_new_places_agents_in_bounds() {
        let flock = Flock::new(small_config());
        assert_eq!(flock.agents().len(), 200);
        for agent in flock.agents() {
            assert!(agent.position.abs().max_element() <= 8.0);
            assert!(agent.speed() <= flock.config().max_speed + 1e-6);
        }
    }

    #[test]
    fn test_same_seed_same_trajectory() {
        let mut a = Flock::new(small_config());
        let mut b = Flock::new(small_config());
        for _ in 0..50 {
            a.step(0.016);
            b.step(0.016);
        }
        assert_eq!(a.agents(), b.agents());
        assert_eq!(a.ticks(), 50);
    }

    #[test]
    fn test_invariants_hold_every_tick() {
        let mut flock = Flock::new(small_config());
        let max_speed = flock.config().max_speed;
        for _ in 0..300 {
            flock.step(0.016);
            for agent in flock.agents() {
                assert!(agent.position.abs().max_element() <= 8.0 + 1e-4);
                assert!(agent.speed() <= max_speed + 1e-6);
                assert_eq!(agent.acceleration, Vec3::ZERO);
            }
        }
    }

    #[test]
    fn test_pointer_pulls_lone_agent() {
        let config = small_config().with_clusters(ClusterConfig::disabled());
        let agent = Agent::new(Vec3::ZERO, Vec3::ZERO);
        let mut flock = Flock::with_agents(config, vec![agent]);
        flock.set_pointer(Some(Vec3::new(3.0, 0.0, 0.0)));
        flock.step(0.016);

        let moved = &flock.agents()[0];
        assert!(moved.velocity.x > 0.0);
        assert_eq!(moved.neighbor_count, 0);
    }

    #[test]
    fn test_neighbor_counts_feed_colors() {
        let config = small_config().with_clusters(ClusterConfig::disabled());
        let agents = vec![
            Agent::new(Vec3::ZERO, Vec3::ZERO),
            Agent::new(Vec3::new(0.5, 0.0, 0.0), Vec3::ZERO),
            Agent::new(Vec3::new(6.0, 6.0, 6.0), Vec3::ZERO),
        ];
        let mut flock = Flock::with_agents(config, agents);
        flock.step(0.016);

        assert_eq!(flock.agents()[0].neighbor_count, 1);
        assert_eq!(flock.agents()[2].neighbor_count, 0);
        assert_ne!(flock.agents()[0].color, Vec3::ONE);
    }

    #[test]
    fn test_empty_flock_steps() {
        let mut flock = Flock::new(small_config().with_agent_count(0));
        flock.step(0.016);
        assert_eq!(flock.average_speed(), 0.0);
    }
}
