//! Direct iteration on the calling thread.

use glam::Vec3;

use super::{
    BackendKind, ComputeBackend, EffectHandle, Kernel, TwinkleBuffers, TwinkleUniforms, UpdateOutcome,
    WindBuffers, WindUniforms,
};
use crate::shaders::{jitter, TWINKLE_AMPLITUDE, TWINKLE_FLOOR};

#[derive(Debug, Default)]
pub struct CpuBackend {
    next_id: u64,
}

impl CpuBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ComputeBackend for CpuBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Cpu
    }

    fn acquire(&mut self, kernel: Kernel) -> EffectHandle {
        self.next_id += 1;
        EffectHandle::new(self.next_id, kernel)
    }

    fn update_twinkle(
        &mut self,
        _handle: &EffectHandle,
        buffers: &mut TwinkleBuffers,
        uniforms: &TwinkleUniforms,
    ) -> UpdateOutcome {
        twinkle(buffers, uniforms);
        UpdateOutcome::Applied
    }

    fn update_wind(
        &mut self,
        _handle: &EffectHandle,
        buffers: &mut WindBuffers,
        uniforms: &WindUniforms,
    ) -> UpdateOutcome {
        solar_wind(buffers, uniforms);
        UpdateOutcome::Applied
    }

    fn release(&mut self, _handle: EffectHandle) {}
}

/// CPU version of the twinkle kernel.
pub(crate) fn twinkle(buffers: &mut TwinkleBuffers, uniforms: &TwinkleUniforms) {
    buffers.colors.resize(buffers.base_colors.len(), 0.0);
    let count = (uniforms.count as usize).min(buffers.len());
    for i in 0..count {
        let phase = buffers.phases[i * 2];
        let speed = buffers.phases[i * 2 + 1];
        let factor = TWINKLE_FLOOR + TWINKLE_AMPLITUDE * (uniforms.time * speed + phase).sin();
        for c in 0..3 {
            buffers.colors[i * 3 + c] = buffers.base_colors[i * 3 + c] * factor;
        }
    }
    buffers.dirty = true;
}

/// CPU version of the solar-wind kernel.
pub(crate) fn solar_wind(buffers: &mut WindBuffers, uniforms: &WindUniforms) {
    let count = (uniforms.count as usize).min(buffers.len());
    let origin = Vec3::from_array(uniforms.origin);
    let step = uniforms.delta_time * uniforms.speed;

    for i in 0..count {
        let velocity = Vec3::from_slice(&buffers.velocities[i * 3..i * 3 + 3]);
        let mut position = Vec3::from_slice(&buffers.positions[i * 3..i * 3 + 3]);
        let mut remaining = buffers.lifetimes[i * 2];
        let max_life = buffers.lifetimes[i * 2 + 1];

        position += velocity * step;
        remaining -= uniforms.delta_time;

        if remaining <= 0.0 || position.distance(origin) > uniforms.max_radius {
            let index = i as u32;
            position = origin
                + Vec3::new(
                    jitter(index, 0, uniforms.seed),
                    jitter(index, 1, uniforms.seed),
                    jitter(index, 2, uniforms.seed),
                ) * uniforms.spawn_radius;
            remaining = max_life;
        }

        buffers.positions[i * 3..i * 3 + 3].copy_from_slice(&position.to_array());
        buffers.lifetimes[i * 2] = remaining;
    }
    buffers.dirty = true;
}
