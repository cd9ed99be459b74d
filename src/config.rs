//! Tunables for every effect.
//!
//! All values are compile-time defaults exposed through plain structs. Each
//! struct offers chained `with_*` setters so a host can adjust a preset
//! without touching the rest:
//!
//! ```ignore
//! let config = SimulationConfig::default()
//!     .with_agent_count(600)
//!     .with_bounds(10.0);
//! ```

use std::ops::Range;

use glam::Vec3;

/// What happens to an agent that leaves the simulation cube.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BoundaryPolicy {
    /// Toroidal topology: a component above `bound` jumps to `-bound` and
    /// vice versa.
    #[default]
    Wrap,
    /// Re-seed the agent at a random in-bounds position, keeping its velocity.
    Respawn,
    /// Mirror the position back inside and negate that velocity component.
    Reflect,
}

/// Parameters for the flocking simulation.
///
/// Distances are world units, speeds and forces are per tick.
#[derive(Clone, Debug, PartialEq)]
pub struct SimulationConfig {
    pub agent_count: usize,
    /// Half-size of the simulation cube (`-bounds..=bounds` on each axis).
    pub bounds: f32,
    /// Edge length of a spatial grid cell. Should be at least the largest
    /// of the three neighbor distances.
    pub cell_size: f32,
    pub separation_distance: f32,
    pub alignment_distance: f32,
    pub cohesion_distance: f32,
    pub max_speed: f32,
    pub max_force: f32,
    pub separation_weight: f32,
    pub alignment_weight: f32,
    pub cohesion_weight: f32,
    pub attraction_weight: f32,
    /// Influence radius of the pointer attractor.
    pub pointer_radius: f32,
    /// Pull strength of the pointer attractor at full intensity.
    pub pointer_strength: f32,
    pub boundary: BoundaryPolicy,
    /// Seed for initial placement and attractor sampling.
    pub seed: u64,
    pub clusters: ClusterConfig,
    pub colors: ColorConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            agent_count: 1200,
            bounds: 15.0,
            cell_size: 2.5,
            separation_distance: 1.0,
            alignment_distance: 2.0,
            cohesion_distance: 2.5,
            max_speed: 0.08,
            max_force: 0.003,
            separation_weight: 1.5,
            alignment_weight: 1.0,
            cohesion_weight: 1.0,
            attraction_weight: 1.0,
            pointer_radius: 5.0,
            pointer_strength: 0.003,
            boundary: BoundaryPolicy::Wrap,
            seed: 0x5eed_f10c,
            clusters: ClusterConfig::default(),
            colors: ColorConfig::default(),
        }
    }
}

impl SimulationConfig {
    pub fn with_agent_count(mut self, count: usize) -> Self {
        self.agent_count = count;
        self
    }

    pub fn with_bounds(mut self, bounds: f32) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn with_cell_size(mut self, cell_size: f32) -> Self {
        self.cell_size = cell_size;
        self
    }

    pub fn with_max_speed(mut self, max_speed: f32) -> Self {
        self.max_speed = max_speed;
        self
    }

    pub fn with_boundary(mut self, boundary: BoundaryPolicy) -> Self {
        self.boundary = boundary;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_clusters(mut self, clusters: ClusterConfig) -> Self {
        self.clusters = clusters;
        self
    }

    /// Largest of the three steering distances.
    pub fn neighbor_radius(&self) -> f32 {
        self.separation_distance
            .max(self.alignment_distance)
            .max(self.cohesion_distance)
    }
}

/// Parameters for the transient attractor ("cluster") pool.
///
/// Times are milliseconds of simulation time.
#[derive(Clone, Debug, PartialEq)]
pub struct ClusterConfig {
    pub enabled: bool,
    pub max_count: usize,
    pub formation_check_interval: f32,
    pub formation_radius: f32,
    /// Agents required within `formation_radius` of a candidate point.
    pub min_density: usize,
    /// Minimum distance between a candidate and every existing cluster.
    pub min_separation: f32,
    /// Random candidate points sampled per check.
    pub candidate_samples: usize,
    pub lifetime: f32,
    pub fade_duration: f32,
    /// Intensity gained per tick while building up.
    pub build_up_rate: f32,
    pub target_intensity: Range<f32>,
    pub influence_radius: f32,
    pub strength: f32,
    /// Cap on the summed attraction of all clusters on one agent.
    pub max_combined_force: f32,
    /// Fraction of the distance to the local crowd centroid moved per tick.
    pub drift_rate: f32,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_count: 3,
            formation_check_interval: 2000.0,
            formation_radius: 3.0,
            min_density: 8,
            min_separation: 6.0,
            candidate_samples: 5,
            lifetime: 8000.0,
            fade_duration: 3000.0,
            build_up_rate: 0.01,
            target_intensity: 0.6..1.0,
            influence_radius: 6.0,
            strength: 0.002,
            max_combined_force: 0.004,
            drift_rate: 0.02,
        }
    }
}

impl ClusterConfig {
    /// A pool that never spawns.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn with_max_count(mut self, max_count: usize) -> Self {
        self.max_count = max_count;
        self
    }

    pub fn with_min_density(mut self, min_density: usize) -> Self {
        self.min_density = min_density;
        self
    }

    pub fn with_timing(mut self, lifetime: f32, fade_duration: f32) -> Self {
        self.lifetime = lifetime;
        self.fade_duration = fade_duration;
        self
    }
}

/// Weights for the render-only color derivation.
#[derive(Clone, Debug, PartialEq)]
pub struct ColorConfig {
    pub base_hue: f32,
    /// Hue shift at full normalized speed (negative moves toward cyan).
    pub speed_hue_shift: f32,
    /// Hue shift at full attractor proximity.
    pub cluster_hue_shift: f32,
    pub base_saturation: f32,
    pub density_saturation: f32,
    pub base_lightness: f32,
    pub speed_lightness: f32,
    pub cluster_lightness: f32,
    /// Neighbor count that maps to a normalized density of 1.
    pub density_reference: f32,
}

impl Default for ColorConfig {
    fn default() -> Self {
        Self {
            base_hue: 0.6,
            speed_hue_shift: -0.15,
            cluster_hue_shift: 0.1,
            base_saturation: 0.6,
            density_saturation: 0.3,
            base_lightness: 0.45,
            speed_lightness: 0.25,
            cluster_lightness: 0.2,
            density_reference: 10.0,
        }
    }
}

/// Parameters for the twinkling starfield.
#[derive(Clone, Debug, PartialEq)]
pub struct StarfieldConfig {
    pub star_count: usize,
    /// Radius of the shell stars are scattered in.
    pub radius: f32,
    /// Range of angular twinkle speeds in radians per second.
    pub twinkle_speed: Range<f32>,
    pub seed: u64,
}

impl Default for StarfieldConfig {
    fn default() -> Self {
        Self {
            star_count: 2000,
            radius: 40.0,
            twinkle_speed: 0.5..3.0,
            seed: 0x57a2_f1e1,
        }
    }
}

impl StarfieldConfig {
    pub fn with_star_count(mut self, count: usize) -> Self {
        self.star_count = count;
        self
    }
}

/// Parameters for the solar-wind stream.
#[derive(Clone, Debug, PartialEq)]
pub struct SolarWindConfig {
    pub particle_count: usize,
    /// Point particles are emitted from.
    pub origin: Vec3,
    /// Multiplier applied to each particle's velocity.
    pub speed: f32,
    pub lifetime: Range<f32>,
    /// Distance from `origin` beyond which a particle respawns.
    pub max_radius: f32,
    /// Half-size of the jitter cube around `origin` used on respawn.
    pub spawn_radius: f32,
    pub seed: u64,
}

impl Default for SolarWindConfig {
    fn default() -> Self {
        Self {
            particle_count: 3000,
            origin: Vec3::new(-12.0, 0.0, 0.0),
            speed: 1.0,
            lifetime: 4.0..10.0,
            max_radius: 30.0,
            spawn_radius: 0.5,
            seed: 0x501a_12d0,
        }
    }
}

impl SolarWindConfig {
    pub fn with_particle_count(mut self, count: usize) -> Self {
        self.particle_count = count;
        self
    }

    pub fn with_origin(mut self, origin: Vec3) -> Self {
        self.origin = origin;
        self
    }
}

/// Per-surface effect selection.
#[derive(Clone, Debug, PartialEq)]
pub enum Preset {
    Flocking(SimulationConfig),
    Starfield(StarfieldConfig),
    SolarWind(SolarWindConfig),
}

impl Preset {
    /// Default flocking hero.
    pub fn flocking() -> Self {
        Preset::Flocking(SimulationConfig::default())
    }

    pub fn starfield() -> Self {
        Preset::Starfield(StarfieldConfig::default())
    }

    pub fn solar_wind() -> Self {
        Preset::SolarWind(SolarWindConfig::default())
    }

    /// Half-extent of the visible volume, used for camera framing and
    /// pointer mapping.
    pub fn extent(&self) -> f32 {
        match self {
            Preset::Flocking(c) => c.bounds,
            Preset::Starfield(c) => c.radius * 0.5,
            Preset::SolarWind(c) => c.max_radius * 0.5,
        }
    }

    /// Whether the effect offloads work to a compute backend. Flocking
    /// always steps on the CPU.
    pub fn uses_compute(&self) -> bool {
        !matches!(self, Preset::Flocking(_))
    }
}

/// Facts about the host decided once at startup.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Environment {
    pub viewport: (u32, u32),
    /// Effects never initialize on low-capability devices.
    pub low_capability: bool,
}

impl Environment {
    pub fn new(viewport: (u32, u32), low_capability: bool) -> Self {
        Self {
            viewport,
            low_capability,
        }
    }

    /// Treat hosts with fewer than four hardware threads as low capability.
    pub fn detect(viewport: (u32, u32)) -> Self {
        let threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self::new(viewport, threads < 4)
    }

    pub fn aspect(&self) -> f32 {
        let (w, h) = self.viewport;
        w.max(1) as f32 / h.max(1) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_neighbor_radius_is_largest_distance() {
        let config = SimulationConfig::default();
        assert_eq!(config.neighbor_radius(), config.cohesion_distance);
        assert!(config.cell_size >= config.neighbor_radius());
    }

    #[test]
    fn test_builder_chain() {
        let config = SimulationConfig::default()
            .with_agent_count(100)
            .with_bounds(15.0)
            .with_boundary(BoundaryPolicy::Reflect);
        assert_eq!(config.agent_count, 100);
        assert_eq!(config.boundary, BoundaryPolicy::Reflect);
    }

    #[test]
    fn test_disabled_clusters() {
        let clusters = ClusterConfig::disabled();
        assert!(!clusters.enabled);
        assert_eq!(clusters.max_count, 3);
    }

    #[test]
    fn test_environment_aspect_guards_zero() {
        let env = Environment::new((0, 0), false);
        assert_eq!(env.aspect(), 1.0);
        assert_eq!(Environment::new((1600, 800), false).aspect(), 2.0);
    }

    #[test]
    fn test_only_offloaded_presets_use_compute() {
        assert!(!Preset::flocking().uses_compute());
        assert!(Preset::starfield().uses_compute());
        assert!(Preset::solar_wind().uses_compute());
    }
}
