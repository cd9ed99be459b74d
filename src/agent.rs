//! Boids agents: steering, integration, boundaries and color.
//!
//! Each tick an agent gathers four steering vectors from its neighborhood
//! and the active attractors, sums them into its acceleration, then
//! integrates:
//!
//! ```text
//! velocity += acceleration
//! velocity  = clamp_length(velocity, max_speed)
//! position += velocity
//! acceleration = 0
//! ```
//!
//! Color is derived afterwards and never feeds back into physics.

use glam::Vec3;
use rand::Rng;

use crate::config::{BoundaryPolicy, ColorConfig, SimulationConfig};

const MIN_DISTANCE: f32 = 1e-4;

/// One simulated particle.
#[derive(Clone, Debug, PartialEq)]
pub struct Agent {
    pub position: Vec3,
    pub velocity: Vec3,
    pub acceleration: Vec3,
    /// RGB in 0..1, render output only.
    pub color: Vec3,
    /// Neighbors found within the steering radius on the last query.
    pub neighbor_count: usize,
}

impl Agent {
    pub fn new(position: Vec3, velocity: Vec3) -> Self {
        Self {
            position,
            velocity,
            acceleration: Vec3::ZERO,
            color: Vec3::ONE,
            neighbor_count: 0,
        }
    }

    /// Random position inside the cube and a random velocity up to `max_speed`.
    pub fn random<R: Rng>(rng: &mut R, bounds: f32, max_speed: f32) -> Self {
        let position = random_in_cube(rng, bounds);
        let direction = Vec3::new(
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
        )
        .normalize_or_zero();
        Self::new(position, direction * rng.gen_range(0.0..=max_speed))
    }

    #[inline]
    pub fn apply_force(&mut self, force: Vec3) {
        self.acceleration += force;
    }

    /// Advance one tick and reset the accumulated acceleration.
    pub fn integrate(&mut self, max_speed: f32) {
        self.velocity = (self.velocity + self.acceleration).clamp_length_max(max_speed);
        self.position += self.velocity;
        self.acceleration = Vec3::ZERO;
    }

    /// Bring the agent back inside `-bounds..=bounds` on every axis.
    pub fn apply_boundary<R: Rng>(&mut self, bounds: f32, policy: BoundaryPolicy, rng: &mut R) {
        match policy {
            BoundaryPolicy::Wrap => {
                for axis in 0..3 {
                    if self.position[axis] > bounds {
                        self.position[axis] = -bounds;
                    } else if self.position[axis] < -bounds {
                        self.position[axis] = bounds;
                    }
                }
            }
            BoundaryPolicy::Reflect => {
                for axis in 0..3 {
                    if self.position[axis] > bounds {
                        self.position[axis] = (2.0 * bounds - self.position[axis]).max(-bounds);
                        self.velocity[axis] = -self.velocity[axis].abs();
                    } else if self.position[axis] < -bounds {
                        self.position[axis] = (-2.0 * bounds - self.position[axis]).min(bounds);
                        self.velocity[axis] = self.velocity[axis].abs();
                    }
                }
            }
            BoundaryPolicy::Respawn => {
                if self.position.abs().max_element() > bounds {
                    self.position = random_in_cube(rng, bounds);
                }
            }
        }
    }

    #[inline]
    pub fn speed(&self) -> f32 {
        self.velocity.length()
    }
}

pub(crate) fn random_in_cube<R: Rng>(rng: &mut R, half: f32) -> Vec3 {
    if half <= 0.0 {
        return Vec3::ZERO;
    }
    Vec3::new(
        rng.gen_range(-half..=half),
        rng.gen_range(-half..=half),
        rng.gen_range(-half..=half),
    )
}

/// A point that pulls agents toward it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AttractorPoint {
    pub position: Vec3,
    pub radius: f32,
    pub strength: f32,
    /// 0..1 scale on `strength`.
    pub intensity: f32,
}

/// The three boids steering vectors for one agent, already clamped.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Steering {
    pub separation: Vec3,
    pub alignment: Vec3,
    pub cohesion: Vec3,
    /// Neighbors within the largest steering distance.
    pub neighbor_count: usize,
}

impl Steering {
    /// Gather separation, alignment and cohesion from `neighbors`.
    ///
    /// `neighbors` may include `agent` itself; zero-distance entries are
    /// skipped.
    pub fn gather<'a, I>(agent: &Agent, neighbors: I, config: &SimulationConfig) -> Self
    where
        I: IntoIterator<Item = &'a Agent>,
    {
        let sep_sq = config.separation_distance * config.separation_distance;
        let ali_sq = config.alignment_distance * config.alignment_distance;
        let coh_sq = config.cohesion_distance * config.cohesion_distance;
        let radius = config.neighbor_radius();
        let radius_sq = radius * radius;

        let mut repel = Vec3::ZERO;
        let mut repel_count = 0u32;
        let mut velocity_sum = Vec3::ZERO;
        let mut velocity_count = 0u32;
        let mut position_sum = Vec3::ZERO;
        let mut position_count = 0u32;
        let mut neighbor_count = 0;

        for other in neighbors {
            let offset = agent.position - other.position;
            let dist_sq = offset.length_squared();
            if dist_sq < MIN_DISTANCE * MIN_DISTANCE {
                continue;
            }
            if dist_sq < radius_sq {
                neighbor_count += 1;
            }
            if dist_sq < sep_sq {
                let dist = dist_sq.sqrt();
                repel += offset / dist / dist;
                repel_count += 1;
            }
            if dist_sq < ali_sq {
                velocity_sum += other.velocity;
                velocity_count += 1;
            }
            if dist_sq < coh_sq {
                position_sum += other.position;
                position_count += 1;
            }
        }

        let separation = if repel_count > 0 {
            seek_velocity(agent, repel / repel_count as f32, config)
        } else {
            Vec3::ZERO
        };
        let alignment = if velocity_count > 0 {
            seek_velocity(agent, velocity_sum / velocity_count as f32, config)
        } else {
            Vec3::ZERO
        };
        let cohesion = if position_count > 0 {
            let centroid = position_sum / position_count as f32;
            seek_velocity(agent, centroid - agent.position, config)
        } else {
            Vec3::ZERO
        };

        Self {
            separation,
            alignment,
            cohesion,
            neighbor_count,
        }
    }

    /// Weighted sum of the three vectors.
    pub fn combined(&self, config: &SimulationConfig) -> Vec3 {
        self.separation * config.separation_weight
            + self.alignment * config.alignment_weight
            + self.cohesion * config.cohesion_weight
    }
}

/// Steer toward `direction` at full speed, clamped to `max_force`.
fn seek_velocity(agent: &Agent, direction: Vec3, config: &SimulationConfig) -> Vec3 {
    let desired = direction.normalize_or_zero() * config.max_speed;
    if desired == Vec3::ZERO {
        return Vec3::ZERO;
    }
    (desired - agent.velocity).clamp_length_max(config.max_force)
}

/// Inverse-distance pull toward every attractor in range, clamped as a sum.
pub fn attraction<'a, I>(position: Vec3, attractors: I, max_combined: f32) -> Vec3
where
    I: IntoIterator<Item = &'a AttractorPoint>,
{
    let mut total = Vec3::ZERO;
    for attractor in attractors {
        if attractor.intensity <= 0.0 {
            continue;
        }
        let offset = attractor.position - position;
        let dist = offset.length();
        if dist < MIN_DISTANCE || dist > attractor.radius {
            continue;
        }
        total += offset / dist * (attractor.strength * attractor.intensity / (1.0 + dist));
    }
    total.clamp_length_max(max_combined)
}

/// Closeness to the nearest attractor in 0..1 (1 at its center, 0 outside its radius).
pub fn attractor_proximity<'a, I>(position: Vec3, attractors: I) -> f32
where
    I: IntoIterator<Item = &'a AttractorPoint>,
{
    attractors
        .into_iter()
        .filter(|a| a.radius > 0.0)
        .map(|a| (1.0 - a.position.distance(position) / a.radius).clamp(0.0, 1.0) * a.intensity)
        .fold(0.0, f32::max)
}

/// Render color from normalized speed, density and attractor proximity.
pub fn derive_color(speed: f32, density: f32, proximity: f32, colors: &ColorConfig) -> Vec3 {
    let speed = speed.clamp(0.0, 1.0);
    let density = density.clamp(0.0, 1.0);
    let proximity = proximity.clamp(0.0, 1.0);

    let hue = (colors.base_hue + colors.speed_hue_shift * speed + colors.cluster_hue_shift * proximity)
        .rem_euclid(1.0);
    let saturation = (colors.base_saturation + colors.density_saturation * density).clamp(0.0, 1.0);
    let lightness = (colors.base_lightness
        + colors.speed_lightness * speed
        + colors.cluster_lightness * proximity)
        .clamp(0.0, 1.0);
    hsl_to_rgb(hue, saturation, lightness)
}

/// HSL (all components 0..1) to linear RGB.
pub fn hsl_to_rgb(h: f32, s: f32, l: f32) -> Vec3 {
    if s <= 0.0 {
        return Vec3::splat(l);
    }
    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;
    Vec3::new(
        hue_channel(p, q, h + 1.0 / 3.0),
        hue_channel(p, q, h),
        hue_channel(p, q, h - 1.0 / 3.0),
    )
}

fn hue_channel(p: f32, q: f32, t: f32) -> f32 {
    let t = t.rem_euclid(1.0);
    if t < 1.0 / 6.0 {
        p + (q - p) * 6.0 * t
    } else if t < 0.5 {
        q
    } else if t < 2.0 / 3.0 {
        p + (q - p) * (2.0 / 3.0 - t) * 6.0
    } else {
        p
    }
}
