//! Transient attractors ("clusters") that form where agents gather.
//!
//! Every `formation_check_interval` ms the pool samples a few random
//! candidate points. The first candidate with enough agents nearby and far
//! enough from every live cluster becomes a new cluster, as long as the pool
//! is below capacity. A cluster then walks through
//! `Spawning -> Active -> Fading` and is dropped once its intensity hits 0.
//! While alive it drifts toward the centroid of the agents around it.

use glam::Vec3;
use rand::Rng;

use crate::agent::{random_in_cube, Agent, AttractorPoint};
use crate::config::ClusterConfig;

/// Fraction of the bounds candidates are sampled in, keeping clusters off the walls.
const CANDIDATE_SPREAD: f32 = 0.8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClusterPhase {
    /// Intensity rising toward the target.
    Spawning,
    /// At target intensity, lifetime not yet elapsed.
    Active,
    /// Lifetime elapsed, intensity falling to 0.
    Fading,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Cluster {
    pub position: Vec3,
    /// Simulation time in ms when the cluster formed.
    pub spawn_time: f32,
    pub intensity: f32,
    pub target_intensity: f32,
    pub build_up_rate: f32,
    fading: bool,
}

impl Cluster {
    pub fn new(position: Vec3, spawn_time: f32, target_intensity: f32, build_up_rate: f32) -> Self {
        Self {
            position,
            spawn_time,
            intensity: 0.0,
            target_intensity: target_intensity.clamp(0.0, 1.0),
            build_up_rate,
            fading: false,
        }
    }

    pub fn age(&self, now: f32) -> f32 {
        now - self.spawn_time
    }

    pub fn phase(&self) -> ClusterPhase {
        if self.fading {
            ClusterPhase::Fading
        } else if self.intensity < self.target_intensity {
            ClusterPhase::Spawning
        } else {
            ClusterPhase::Active
        }
    }

    /// Step intensity for one tick at simulation time `now`.
    ///
    /// Returns `false` once the cluster has faded out and should be removed.
    pub fn advance(&mut self, now: f32, dt_ms: f32, config: &ClusterConfig) -> bool {
        if !self.fading && self.age(now) < config.lifetime {
            self.intensity = (self.intensity + self.build_up_rate).min(self.target_intensity);
            return true;
        }
        self.fading = true;
        let fade_per_ms = self.target_intensity / config.fade_duration.max(f32::EPSILON);
        self.intensity -= fade_per_ms * dt_ms;
        if self.intensity <= 0.0 {
            self.intensity = 0.0;
            return false;
        }
        true
    }

    pub fn as_attractor(&self, config: &ClusterConfig) -> AttractorPoint {
        AttractorPoint {
            position: self.position,
            radius: config.influence_radius,
            strength: config.strength,
            intensity: self.intensity,
        }
    }
}

/// Bounded set of live clusters.
#[derive(Clone, Debug)]
pub struct AttractorPool {
    config: ClusterConfig,
    clusters: Vec<Cluster>,
    /// Simulation time in ms.
    elapsed: f32,
    last_check: f32,
}

impl AttractorPool {
    pub fn new(config: ClusterConfig) -> Self {
        Self {
            clusters: Vec::with_capacity(config.max_count),
            config,
            elapsed: 0.0,
            last_check: 0.0,
        }
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    /// Simulation time in ms.
    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    /// Current clusters as attraction points.
    pub fn attractors(&self) -> impl Iterator<Item = AttractorPoint> + '_ {
        self.clusters.iter().map(|c| c.as_attractor(&self.config))
    }

    /// Advance every cluster, drift them toward their crowds and run the
    /// periodic formation check.
    ///
    /// Returns `true` if a cluster formed this tick.
    pub fn update<R: Rng>(&mut self, dt_ms: f32, agents: &[Agent], bounds: f32, rng: &mut R) -> bool {
        if !self.config.enabled {
            return false;
        }
        self.elapsed += dt_ms;

        let now = self.elapsed;
        let config = &self.config;
        self.clusters.retain_mut(|c| c.advance(now, dt_ms, config));

        for cluster in &mut self.clusters {
            if let Some(centroid) = crowd_centroid(cluster.position, agents, config.formation_radius) {
                cluster.position += (centroid - cluster.position) * config.drift_rate;
            }
        }

        if self.elapsed - self.last_check >= config.formation_check_interval {
            self.last_check = self.elapsed;
            return self.try_spawn(agents, bounds, rng);
        }
        false
    }

    /// Sample candidate points and form at most one cluster.
    pub fn try_spawn<R: Rng>(&mut self, agents: &[Agent], bounds: f32, rng: &mut R) -> bool {
        if self.clusters.len() >= self.config.max_count {
            return false;
        }
        for _ in 0..self.config.candidate_samples {
            let candidate = random_in_cube(rng, bounds * CANDIDATE_SPREAD);
            if self.accepts(candidate, agents) {
                let target = if self.config.target_intensity.is_empty() {
                    self.config.target_intensity.start
                } else {
                    rng.gen_range(self.config.target_intensity.clone())
                };
                self.clusters.push(Cluster::new(
                    candidate,
                    self.elapsed,
                    target,
                    self.config.build_up_rate,
                ));
                return true;
            }
        }
        false
    }

    fn accepts(&self, candidate: Vec3, agents: &[Agent]) -> bool {
        let min_sep_sq = self.config.min_separation * self.config.min_separation;
        let separated = self
            .clusters
            .iter()
            .all(|c| c.position.distance_squared(candidate) > min_sep_sq);
        separated && density_at(candidate, agents, self.config.formation_radius) >= self.config.min_density
    }
}

/// Agents within `radius` of `point`.
pub fn density_at(point: Vec3, agents: &[Agent], radius: f32) -> usize {
    let radius_sq = radius * radius;
    agents
        .iter()
        .filter(|a| a.position.distance_squared(point) <= radius_sq)
        .count()
}

fn crowd_centroid(point: Vec3, agents: &[Agent], radius: f32) -> Option<Vec3> {
    let radius_sq = radius * radius;
    let (sum, count) = agents
        .iter()
        .filter(|a| a.position.distance_squared(point) <= radius_sq)
        .fold((Vec3::ZERO, 0u32), |(sum, n), a| (sum + a.position, n + 1));
    (count > 0).then(|| sum / count as f32)
}
