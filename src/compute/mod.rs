//! Compute backends.
//!
//! Effects that can be offloaded (the starfield twinkle and the solar-wind
//! stream) talk to a [`ComputeBackend`]. Every backend exposes the same two
//! operations with the same buffer semantics, so an effect never knows
//! whether its data was produced on the CPU or read back from the GPU.
//!
//! Backend selection happens once per session through [`probe_backend`]:
//!
//! 1. [`BackendKind::Compute`] - native compute (Vulkan, Metal, DX12)
//! 2. [`BackendKind::Downlevel`] - the GL backend, if it can run compute shaders
//! 3. [`BackendKind::Cpu`] - always available
//!
//! A tier that fails to initialize is skipped; there is no retry.

mod cpu;
mod dispatch;

use std::fmt;

use bytemuck::{Pod, Zeroable};

pub use cpu::CpuBackend;
pub use dispatch::{ComputeDevice, GpuBackend, ReadbackCell, ReadbackState};

use crate::error::GpuError;
use crate::gpu::WgpuDevice;

/// Which tier a backend runs on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Compute,
    Downlevel,
    Cpu,
}

impl BackendKind {
    /// Default probe order, best first.
    pub const PROBE_ORDER: [BackendKind; 3] = [BackendKind::Compute, BackendKind::Downlevel, BackendKind::Cpu];

    pub fn is_gpu(self) -> bool {
        !matches!(self, BackendKind::Cpu)
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Compute => write!(f, "gpu-compute"),
            BackendKind::Downlevel => write!(f, "gpu-downlevel"),
            BackendKind::Cpu => write!(f, "cpu"),
        }
    }
}

/// The two offloadable kernels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Kernel {
    /// Per-star color from base color, phase and speed.
    Twinkle,
    /// Per-particle position and lifetime with respawn.
    SolarWind,
}

/// One storage binding of a kernel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BindingLayout {
    pub binding: u32,
    /// Floats per element.
    pub stride: usize,
    pub read_only: bool,
    /// Uploaded once per resource set rather than every dispatch.
    pub is_static: bool,
}

impl Kernel {
    /// Storage bindings, in binding order. Binding 0 is always the uniform buffer.
    pub fn bindings(self) -> &'static [BindingLayout] {
        const TWINKLE: [BindingLayout; 3] = [
            BindingLayout { binding: 1, stride: 3, read_only: true, is_static: true },
            BindingLayout { binding: 2, stride: 2, read_only: true, is_static: true },
            BindingLayout { binding: 3, stride: 3, read_only: false, is_static: false },
        ];
        const SOLAR_WIND: [BindingLayout; 3] = [
            BindingLayout { binding: 1, stride: 3, read_only: true, is_static: true },
            BindingLayout { binding: 2, stride: 3, read_only: false, is_static: false },
            BindingLayout { binding: 3, stride: 2, read_only: false, is_static: false },
        ];
        match self {
            Kernel::Twinkle => &TWINKLE,
            Kernel::SolarWind => &SOLAR_WIND,
        }
    }

    /// Bindings copied back after a dispatch, in readback order.
    pub fn outputs(self) -> &'static [u32] {
        match self {
            Kernel::Twinkle => &[3],
            Kernel::SolarWind => &[2, 3],
        }
    }

    pub fn uniform_size(self) -> u64 {
        match self {
            Kernel::Twinkle => std::mem::size_of::<TwinkleUniforms>() as u64,
            Kernel::SolarWind => std::mem::size_of::<WindUniforms>() as u64,
        }
    }

    pub fn binding(self, binding: u32) -> Option<&'static BindingLayout> {
        self.bindings().iter().find(|b| b.binding == binding)
    }

    /// Floats read back per element.
    pub fn output_stride(self) -> usize {
        self.outputs()
            .iter()
            .filter_map(|&b| self.binding(b))
            .map(|b| b.stride)
            .sum()
    }

    pub fn label(self) -> &'static str {
        match self {
            Kernel::Twinkle => "twinkle",
            Kernel::SolarWind => "solar_wind",
        }
    }
}

/// Identity of one effect's resource set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EffectId(u64);

impl EffectId {
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Returned by [`ComputeBackend::acquire`] and handed back to
/// [`ComputeBackend::release`]. GPU memory for the effect lives exactly
/// between those two calls.
#[derive(Debug, PartialEq, Eq)]
pub struct EffectHandle {
    id: EffectId,
    kernel: Kernel,
}

impl EffectHandle {
    pub(crate) fn new(id: u64, kernel: Kernel) -> Self {
        Self {
            id: EffectId(id),
            kernel,
        }
    }

    pub fn id(&self) -> EffectId {
        self.id
    }

    pub fn kernel(&self) -> Kernel {
        self.kernel
    }
}

/// What an update call did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Results were written to the buffers synchronously.
    Applied,
    /// Work was submitted; results land on a later call.
    Dispatched,
    /// A previous readback is still in flight; nothing was done.
    Skipped,
}

/// CPU-side arrays of the twinkle kernel.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TwinkleBuffers {
    /// RGB per star, never modified.
    pub base_colors: Vec<f32>,
    /// (phase, speed) per star, never modified.
    pub phases: Vec<f32>,
    /// RGB per star, output.
    pub colors: Vec<f32>,
    /// Set when `colors` changed and needs uploading to the renderer.
    pub dirty: bool,
}

impl TwinkleBuffers {
    pub fn new(base_colors: Vec<f32>, phases: Vec<f32>) -> Self {
        debug_assert_eq!(base_colors.len() / 3, phases.len() / 2);
        Self {
            colors: base_colors.clone(),
            base_colors,
            phases,
            dirty: true,
        }
    }

    /// Stars covered by every array.
    pub fn len(&self) -> usize {
        (self.base_colors.len() / 3)
            .min(self.colors.len() / 3)
            .min(self.phases.len() / 2)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// CPU-side arrays of the solar-wind kernel.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WindBuffers {
    /// XYZ per particle, never modified.
    pub velocities: Vec<f32>,
    /// XYZ per particle.
    pub positions: Vec<f32>,
    /// (remaining, max) per particle.
    pub lifetimes: Vec<f32>,
    pub dirty: bool,
}

impl WindBuffers {
    pub fn new(velocities: Vec<f32>, positions: Vec<f32>, lifetimes: Vec<f32>) -> Self {
        debug_assert_eq!(positions.len(), velocities.len());
        debug_assert_eq!(positions.len() / 3, lifetimes.len() / 2);
        Self {
            velocities,
            positions,
            lifetimes,
            dirty: true,
        }
    }

    /// Particles covered by every array.
    pub fn len(&self) -> usize {
        (self.velocities.len() / 3)
            .min(self.positions.len() / 3)
            .min(self.lifetimes.len() / 2)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct TwinkleUniforms {
    pub time: f32,
    pub count: u32,
    pub _pad: [u32; 2],
}

impl TwinkleUniforms {
    pub fn new(time: f32, count: usize) -> Self {
        Self {
            time,
            count: count as u32,
            _pad: [0; 2],
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct WindUniforms {
    pub origin: [f32; 3],
    pub time: f32,
    pub delta_time: f32,
    pub speed: f32,
    pub max_radius: f32,
    pub spawn_radius: f32,
    pub count: u32,
    /// Varies per frame so respawn jitter differs between frames.
    pub seed: u32,
    pub _pad: [u32; 2],
}

/// The operations every backend provides.
pub trait ComputeBackend {
    fn kind(&self) -> BackendKind;

    /// Register an effect. GPU resources are created lazily on first update.
    fn acquire(&mut self, kernel: Kernel) -> EffectHandle;

    fn update_twinkle(
        &mut self,
        handle: &EffectHandle,
        buffers: &mut TwinkleBuffers,
        uniforms: &TwinkleUniforms,
    ) -> UpdateOutcome;

    fn update_wind(
        &mut self,
        handle: &EffectHandle,
        buffers: &mut WindBuffers,
        uniforms: &WindUniforms,
    ) -> UpdateOutcome;

    /// Free everything held for the effect.
    fn release(&mut self, handle: EffectHandle);
}

/// Try each tier in `order` and return the first that initializes.
///
/// Falls back to [`CpuBackend`] if every listed tier fails.
pub fn probe_backend(order: &[BackendKind]) -> Box<dyn ComputeBackend> {
    select_backend(order, |kind| {
        let backends = match kind {
            BackendKind::Compute => wgpu::Backends::PRIMARY,
            BackendKind::Downlevel => wgpu::Backends::GL,
            BackendKind::Cpu => return Err(GpuError::NoAdapter),
        };
        let device = pollster::block_on(WgpuDevice::new(backends, kind))?;
        log::info!("{} adapter: {}", kind, device.adapter_name());
        Ok(device)
    })
}

/// Walk `order` once, calling `init` for each GPU tier until one succeeds.
/// A failed tier is never tried again.
pub fn select_backend<D, F>(order: &[BackendKind], mut init: F) -> Box<dyn ComputeBackend>
where
    D: ComputeDevice + 'static,
    F: FnMut(BackendKind) -> Result<D, GpuError>,
{
    for &kind in order {
        if !kind.is_gpu() {
            break;
        }
        match init(kind) {
            Ok(device) => {
                log::info!("compute backend: {}", kind);
                return Box::new(GpuBackend::new(device));
            }
            Err(e) => log::info!("{} backend unavailable: {}", kind, e),
        }
    }
    log::info!("compute backend: {}", BackendKind::Cpu);
    Box::new(CpuBackend::new())
}
