//! The per-surface effects.
//!
//! An [`Effect`] is built from a [`Preset`] and advanced once per frame.
//! Flocking always runs on the CPU; the starfield and the solar wind hand
//! their per-particle math to the session's [`ComputeBackend`].

use std::f32::consts::TAU;

use glam::Vec3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::agent::hsl_to_rgb;
use crate::compute::{
    ComputeBackend, EffectHandle, Kernel, TwinkleBuffers, TwinkleUniforms, UpdateOutcome, WindBuffers,
    WindUniforms,
};
use crate::config::{Preset, SimulationConfig, SolarWindConfig, StarfieldConfig};
use crate::flock::Flock;

/// Render data produced by a frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameData<'a> {
    /// XYZ per point.
    pub positions: &'a [f32],
    /// RGB per point.
    pub colors: &'a [f32],
}

pub struct FlockEffect {
    flock: Flock,
    positions: Vec<f32>,
    colors: Vec<f32>,
    dirty: bool,
}

impl FlockEffect {
    pub fn new(config: SimulationConfig) -> Self {
        let mut effect = Self {
            flock: Flock::new(config),
            positions: Vec::new(),
            colors: Vec::new(),
            dirty: false,
        };
        effect.sync();
        effect
    }

    pub fn flock(&self) -> &Flock {
        &self.flock
    }

    fn update(&mut self, delta_time: f32) -> UpdateOutcome {
        self.flock.step(delta_time);
        self.sync();
        UpdateOutcome::Applied
    }

    fn sync(&mut self) {
        self.positions.clear();
        self.colors.clear();
        for agent in self.flock.agents() {
            self.positions.extend_from_slice(&agent.position.to_array());
            self.colors.extend_from_slice(&agent.color.to_array());
        }
        self.dirty = true;
    }
}

pub struct StarfieldEffect {
    handle: Option<EffectHandle>,
    buffers: TwinkleBuffers,
    positions: Vec<f32>,
    positions_dirty: bool,
    time: f32,
}

impl StarfieldEffect {
    pub fn new(config: &StarfieldConfig, backend: &mut dyn ComputeBackend) -> Self {
        let mut rng = StdRng::seed_from_u64(config.seed);
        let count = config.star_count;
        let mut positions = Vec::with_capacity(count * 3);
        let mut base_colors = Vec::with_capacity(count * 3);
        let mut phases = Vec::with_capacity(count * 2);

        for _ in 0..count {
            let direction = random_direction(&mut rng);
            let distance = config.radius * rng.gen_range(0.3f32..1.0);
            positions.extend_from_slice(&(direction * distance).to_array());

            // Mostly white, some tinted blue or amber.
            let hue = if rng.gen_bool(0.5) { 0.6 } else { 0.1 };
            let color = hsl_to_rgb(hue, rng.gen_range(0.0..0.4), rng.gen_range(0.6..0.95));
            base_colors.extend_from_slice(&color.to_array());

            phases.push(rng.gen_range(0.0..TAU));
            phases.push(sample(&mut rng, &config.twinkle_speed));
        }

        Self {
            handle: Some(backend.acquire(Kernel::Twinkle)),
            buffers: TwinkleBuffers::new(base_colors, phases),
            positions,
            positions_dirty: true,
            time: 0.0,
        }
    }

    pub fn buffers(&self) -> &TwinkleBuffers {
        &self.buffers
    }

    fn update(&mut self, delta_time: f32, backend: &mut dyn ComputeBackend) -> UpdateOutcome {
        let Some(handle) = &self.handle else {
            return UpdateOutcome::Skipped;
        };
        self.time += delta_time;
        let uniforms = TwinkleUniforms::new(self.time, self.buffers.len());
        backend.update_twinkle(handle, &mut self.buffers, &uniforms)
    }
}

pub struct SolarWindEffect {
    handle: Option<EffectHandle>,
    config: SolarWindConfig,
    buffers: WindBuffers,
    colors: Vec<f32>,
    colors_dirty: bool,
    time: f32,
    frame: u32,
}

impl SolarWindEffect {
    pub fn new(config: SolarWindConfig, backend: &mut dyn ComputeBackend) -> Self {
        let mut rng = StdRng::seed_from_u64(config.seed);
        let count = config.particle_count;
        let mut velocities = Vec::with_capacity(count * 3);
        let mut positions = Vec::with_capacity(count * 3);
        let mut lifetimes = Vec::with_capacity(count * 2);
        let mut colors = Vec::with_capacity(count * 3);

        for _ in 0..count {
            let spread = Vec3::new(1.0, rng.gen_range(-0.25..0.25), rng.gen_range(-0.25..0.25));
            let velocity = spread.normalize() * rng.gen_range(1.0f32..3.0);
            velocities.extend_from_slice(&velocity.to_array());

            let offset = Vec3::new(
                rng.gen_range(-1.0..=1.0),
                rng.gen_range(-1.0..=1.0),
                rng.gen_range(-1.0..=1.0),
            ) * config.spawn_radius;
            positions.extend_from_slice(&(config.origin + offset).to_array());

            // Staggered so the stream does not pulse.
            let max_life = sample(&mut rng, &config.lifetime);
            lifetimes.push(rng.gen_range(0.0f32..=1.0) * max_life);
            lifetimes.push(max_life);

            let color = hsl_to_rgb(rng.gen_range(0.05..0.14), 0.9, rng.gen_range(0.5..0.7));
            colors.extend_from_slice(&color.to_array());
        }

        Self {
            handle: Some(backend.acquire(Kernel::SolarWind)),
            config,
            buffers: WindBuffers::new(velocities, positions, lifetimes),
            colors,
            colors_dirty: true,
            time: 0.0,
            frame: 0,
        }
    }

    pub fn buffers(&self) -> &WindBuffers {
        &self.buffers
    }

    fn update(&mut self, delta_time: f32, backend: &mut dyn ComputeBackend) -> UpdateOutcome {
        let Some(handle) = &self.handle else {
            return UpdateOutcome::Skipped;
        };
        self.time += delta_time;
        self.frame = self.frame.wrapping_add(1);
        let uniforms = WindUniforms {
            origin: self.config.origin.to_array(),
            time: self.time,
            delta_time,
            speed: self.config.speed,
            max_radius: self.config.max_radius,
            spawn_radius: self.config.spawn_radius,
            count: self.buffers.len() as u32,
            seed: self.frame,
            _pad: [0; 2],
        };
        backend.update_wind(handle, &mut self.buffers, &uniforms)
    }
}

/// One active effect per surface.
pub enum Effect {
    Flock(FlockEffect),
    Starfield(StarfieldEffect),
    SolarWind(SolarWindEffect),
}

impl Effect {
    /// Build the effect for `preset`, acquiring backend resources if it
    /// needs any.
    pub fn new(preset: &Preset, backend: &mut dyn ComputeBackend) -> Self {
        match preset {
            Preset::Flocking(config) => Effect::Flock(FlockEffect::new(config.clone())),
            Preset::Starfield(config) => Effect::Starfield(StarfieldEffect::new(config, backend)),
            Preset::SolarWind(config) => Effect::SolarWind(SolarWindEffect::new(config.clone(), backend)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Effect::Flock(_) => "flocking",
            Effect::Starfield(_) => "starfield",
            Effect::SolarWind(_) => "solar wind",
        }
    }

    /// Number of rendered points.
    pub fn len(&self) -> usize {
        match self {
            Effect::Flock(e) => e.flock.agents().len(),
            Effect::Starfield(e) => e.buffers.len(),
            Effect::SolarWind(e) => e.buffers.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Advance by `delta_time` seconds.
    pub fn update(&mut self, delta_time: f32, backend: &mut dyn ComputeBackend) -> UpdateOutcome {
        match self {
            Effect::Flock(e) => e.update(delta_time),
            Effect::Starfield(e) => e.update(delta_time, backend),
            Effect::SolarWind(e) => e.update(delta_time, backend),
        }
    }

    /// Pointer in world space. Only flocking reacts to it.
    pub fn set_pointer(&mut self, pointer: Option<Vec3>) {
        if let Effect::Flock(e) = self {
            e.flock.set_pointer(pointer);
        }
    }

    /// Render data if anything changed since the last call.
    pub fn take_frame(&mut self) -> Option<FrameData<'_>> {
        match self {
            Effect::Flock(e) => std::mem::take(&mut e.dirty).then_some(FrameData {
                positions: &e.positions,
                colors: &e.colors,
            }),
            Effect::Starfield(e) => {
                let changed = std::mem::take(&mut e.buffers.dirty) | std::mem::take(&mut e.positions_dirty);
                changed.then_some(FrameData {
                    positions: &e.positions,
                    colors: &e.buffers.colors,
                })
            }
            Effect::SolarWind(e) => {
                let changed = std::mem::take(&mut e.buffers.dirty) | std::mem::take(&mut e.colors_dirty);
                changed.then_some(FrameData {
                    positions: &e.buffers.positions,
                    colors: &e.colors,
                })
            }
        }
    }

    /// Give backend resources back. Later updates are no-ops for
    /// backend-driven effects.
    pub fn release(&mut self, backend: &mut dyn ComputeBackend) {
        let handle = match self {
            Effect::Flock(_) => None,
            Effect::Starfield(e) => e.handle.take(),
            Effect::SolarWind(e) => e.handle.take(),
        };
        if let Some(handle) = handle {
            backend.release(handle);
        }
    }
}

fn random_direction<R: Rng>(rng: &mut R) -> Vec3 {
    loop {
        let v = Vec3::new(
            rng.gen_range(-1.0..=1.0),
            rng.gen_range(-1.0..=1.0),
            rng.gen_range(-1.0..=1.0),
        );
        let length_sq = v.length_squared();
        if length_sq > 1e-4 && length_sq <= 1.0 {
            return v / length_sq.sqrt();
        }
    }
}

fn sample<R: Rng>(rng: &mut R, range: &std::ops::Range<f32>) -> f32 {
    if range.is_empty() {
        range.start
    } else {
        rng.gen_range(range.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::{BackendKind, CpuBackend};
    use crate::config::ClusterConfig;

    #[test]
    fn test_flock_effect_frames() {
        let mut backend = CpuBackend::new();
        let preset = Preset::Flocking(
            SimulationConfig::default()
                .with_agent_count(50)
                .with_clusters(ClusterConfig::disabled()),
        );
        let mut effect = Effect::new(&preset, &mut backend);
        assert_eq!(effect.len(), 50);

        let frame = effect.take_frame().expect("initial frame");
        assert_eq!(frame.positions.len(), 150);
        assert_eq!(frame.colors.len(), 150);
        assert!(effect.take_frame().is_none());

        assert_eq!(effect.update(0.016, &mut backend), UpdateOutcome::Applied);
        assert!(effect.take_frame().is_some());
    }

    #[test]
    fn test_starfield_twinkles_on_cpu() {
        let mut backend = CpuBackend::new();
        let preset = Preset::Starfield(StarfieldConfig::default().with_star_count(100));
        let mut effect = Effect::new(&preset, &mut backend);
        effect.take_frame();

        effect.update(0.5, &mut backend);
        let frame = effect.take_frame().expect("twinkle marks colors dirty");
        assert_eq!(frame.colors.len(), 300);
        for &position in frame.positions {
            assert!(position.abs() <= 40.0);
        }
    }

    #[test]
    fn test_solar_wind_stays_within_radius() {
        let mut backend = CpuBackend::new();
        let config = SolarWindConfig::default().with_particle_count(200);
        let origin = config.origin;
        let max_radius = config.max_radius;
        let mut effect = Effect::new(&Preset::SolarWind(config), &mut backend);

        for _ in 0..500 {
            effect.update(0.05, &mut backend);
        }
        let frame = effect.take_frame().expect("wind moved");
        for p in frame.positions.chunks_exact(3) {
            assert!(Vec3::from_slice(p).distance(origin) <= max_radius);
        }
    }

    #[test]
    fn test_release_stops_backend_updates() {
        let mut backend = CpuBackend::new();
        assert_eq!(backend.kind(), BackendKind::Cpu);
        let mut effect = Effect::new(&Preset::starfield(), &mut backend);
        effect.release(&mut backend);
        assert_eq!(effect.update(0.016, &mut backend), UpdateOutcome::Skipped);
    }

    #[test]
    fn test_pointer_only_reaches_flock() {
        let mut backend = CpuBackend::new();
        let mut effect = Effect::new(&Preset::flocking(), &mut backend);
        effect.set_pointer(Some(Vec3::X));
        match &effect {
            Effect::Flock(e) => assert_eq!(e.flock().pointer(), Some(Vec3::X)),
            _ => unreachable!(),
        }
    }
}
