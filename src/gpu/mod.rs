//! wgpu plumbing: the compute device behind [`GpuBackend`](crate::compute::GpuBackend)
//! and the point-sprite renderer.

mod camera;
mod renderer;

use crate::compute::{BackendKind, ComputeDevice, Kernel, ReadbackCell};
use crate::error::GpuError;
use crate::shaders::{SOLAR_WIND_WGSL, TWINKLE_WGSL};

pub use camera::Camera;
pub use renderer::PointRenderer;

/// wgpu refuses zero-sized storage bindings.
const MIN_BUFFER_SIZE: u64 = 16;

struct KernelPipeline {
    layout: wgpu::BindGroupLayout,
    pipeline: wgpu::ComputePipeline,
}

impl KernelPipeline {
    fn new(device: &wgpu::Device, kernel: Kernel) -> Self {
        let source = match kernel {
            Kernel::Twinkle => TWINKLE_WGSL,
            Kernel::SolarWind => SOLAR_WIND_WGSL,
        };

        let mut entries = vec![wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }];
        entries.extend(kernel.bindings().iter().map(|b| wgpu::BindGroupLayoutEntry {
            binding: b.binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage {
                    read_only: b.read_only,
                },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }));

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(kernel.label()),
            entries: &entries,
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(kernel.label()),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(kernel.label()),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(kernel.label()),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: None,
        });

        Self { layout, pipeline }
    }
}

/// Buffers and bind group for one effect.
pub struct KernelResources {
    kernel: Kernel,
    uniform_buffer: wgpu::Buffer,
    storage: Vec<(u32, wgpu::Buffer)>,
    /// Output bindings packed back to back, in [`Kernel::outputs`] order.
    staging: wgpu::Buffer,
    /// `(binding, offset into staging, bytes)`
    copies: Vec<(u32, u64, u64)>,
    bind_group: wgpu::BindGroup,
}

impl KernelResources {
    fn storage(&self, binding: u32) -> Option<&wgpu::Buffer> {
        self.storage
            .iter()
            .find(|(b, _)| *b == binding)
            .map(|(_, buffer)| buffer)
    }
}

impl Drop for KernelResources {
    fn drop(&mut self) {
        self.uniform_buffer.destroy();
        for (_, buffer) in &self.storage {
            buffer.destroy();
        }
        self.staging.destroy();
    }
}

/// A headless wgpu device that runs the effect kernels.
pub struct WgpuDevice {
    tier: BackendKind,
    adapter_name: String,
    device: wgpu::Device,
    queue: wgpu::Queue,
    twinkle: KernelPipeline,
    solar_wind: KernelPipeline,
}

impl WgpuDevice {
    /// Open a device on `backends`. Fails if no adapter is found or it
    /// cannot run compute shaders.
    pub async fn new(backends: wgpu::Backends, tier: BackendKind) -> Result<Self, GpuError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(GpuError::NoAdapter)?;

        let downlevel = adapter.get_downlevel_capabilities();
        if !downlevel.flags.contains(wgpu::DownlevelFlags::COMPUTE_SHADERS) {
            return Err(GpuError::MissingComputeSupport);
        }

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("flockfx compute"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::downlevel_defaults(),
                    memory_hints: Default::default(),
                },
                None,
            )
            .await?;

        device.on_uncaptured_error(Box::new(|e| log::error!("wgpu: {}", e)));

        let twinkle = KernelPipeline::new(&device, Kernel::Twinkle);
        let solar_wind = KernelPipeline::new(&device, Kernel::SolarWind);

        Ok(Self {
            tier,
            adapter_name: adapter.get_info().name,
            device,
            queue,
            twinkle,
            solar_wind,
        })
    }

    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    fn pipeline(&self, kernel: Kernel) -> &KernelPipeline {
        match kernel {
            Kernel::Twinkle => &self.twinkle,
            Kernel::SolarWind => &self.solar_wind,
        }
    }
}

impl ComputeDevice for WgpuDevice {
    type Resources = KernelResources;

    fn tier(&self) -> BackendKind {
        self.tier
    }

    fn create_resources(&mut self, kernel: Kernel, count: usize) -> Result<KernelResources, GpuError> {
        let max_binding = u64::from(self.device.limits().max_storage_buffer_binding_size);
        let float_size = std::mem::size_of::<f32>() as u64;

        let mut storage = Vec::with_capacity(kernel.bindings().len());
        for layout in kernel.bindings() {
            let size = (count * layout.stride) as u64 * float_size;
            if size > max_binding {
                return Err(GpuError::Allocation(format!(
                    "binding {} needs {} bytes, device allows {}",
                    layout.binding, size, max_binding
                )));
            }
            let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(kernel.label()),
                size: size.max(MIN_BUFFER_SIZE),
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC,
                mapped_at_creation: false,
            });
            storage.push((layout.binding, buffer));
        }

        let mut copies = Vec::with_capacity(kernel.outputs().len());
        let mut offset = 0;
        for &binding in kernel.outputs() {
            let stride = kernel.binding(binding).map_or(0, |b| b.stride);
            let bytes = (count * stride) as u64 * float_size;
            copies.push((binding, offset, bytes));
            offset += bytes;
        }

        let uniform_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("effect uniforms"),
            size: kernel.uniform_size(),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("effect readback"),
            size: offset.max(MIN_BUFFER_SIZE),
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut entries = vec![wgpu::BindGroupEntry {
            binding: 0,
            resource: uniform_buffer.as_entire_binding(),
        }];
        entries.extend(storage.iter().map(|(binding, buffer)| wgpu::BindGroupEntry {
            binding: *binding,
            resource: buffer.as_entire_binding(),
        }));

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(kernel.label()),
            layout: &self.pipeline(kernel).layout,
            entries: &entries,
        });

        Ok(KernelResources {
            kernel,
            uniform_buffer,
            storage,
            staging,
            copies,
            bind_group,
        })
    }

    fn write_uniforms(&mut self, resources: &KernelResources, bytes: &[u8]) {
        self.queue.write_buffer(&resources.uniform_buffer, 0, bytes);
    }

    fn upload(&mut self, resources: &KernelResources, binding: u32, data: &[f32]) {
        if data.is_empty() {
            return;
        }
        if let Some(buffer) = resources.storage(binding) {
            self.queue.write_buffer(buffer, 0, bytemuck::cast_slice(data));
        }
    }

    fn dispatch(&mut self, resources: &KernelResources, workgroups: u32) {
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some(resources.kernel.label()),
        });

        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(resources.kernel.label()),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline(resources.kernel).pipeline);
            pass.set_bind_group(0, &resources.bind_group, &[]);
            pass.dispatch_workgroups(workgroups, 1, 1);
        }

        for &(binding, offset, bytes) in &resources.copies {
            if let Some(source) = resources.storage(binding) {
                if bytes > 0 {
                    encoder.copy_buffer_to_buffer(source, 0, &resources.staging, offset, bytes);
                }
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
    }

    fn map_output(&mut self, resources: &KernelResources) -> ReadbackCell {
        let cell = ReadbackCell::new();
        let callback_cell = cell.clone();
        resources
            .staging
            .slice(..)
            .map_async(wgpu::MapMode::Read, move |result| {
                callback_cell.resolve(result.map_err(|e| e.to_string()));
            });
        cell
    }

    fn read_output(&mut self, resources: &KernelResources) -> Vec<f32> {
        let data = {
            let view = resources.staging.slice(..).get_mapped_range();
            let used = resources.copies.iter().map(|&(_, _, bytes)| bytes).sum::<u64>() as usize;
            view[..used.min(view.len())]
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect()
        };
        resources.staging.unmap();
        data
    }

    fn poll(&mut self) {
        self.device.poll(wgpu::Maintain::Poll);
    }
}
