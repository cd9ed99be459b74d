//! GPU dispatch protocol.
//!
//! [`GpuBackend`] owns the per-effect resource sets and drives each one
//! through `Idle -> Dispatched -> Reading -> Idle`. The device itself sits
//! behind [`ComputeDevice`] so the protocol can run against a mock.
//!
//! Per update call:
//!
//! 1. if work was dispatched on an earlier call, start mapping its staging
//!    buffer (`Dispatched -> Reading`)
//! 2. poll the device and settle a finished readback (copy results into the
//!    CPU arrays, mark them dirty)
//! 3. if a readback is still in flight, return [`UpdateOutcome::Skipped`]
//! 4. create resources on first use or when the element count changed
//! 5. write uniforms, upload static inputs once and per-frame inputs always
//! 6. dispatch `ceil(count / WORKGROUP_SIZE)` workgroups (`Idle -> Dispatched`)

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use super::cpu;
use super::{
    BackendKind, ComputeBackend, EffectHandle, EffectId, Kernel, TwinkleBuffers, TwinkleUniforms,
    UpdateOutcome, WindBuffers, WindUniforms,
};
use crate::error::GpuError;
use crate::shaders::WORKGROUP_SIZE;

/// Completion slot for one asynchronous buffer map.
///
/// The map callback resolves it from whatever thread the driver uses; the
/// frame loop takes the result on a later poll.
#[derive(Clone, Debug, Default)]
pub struct ReadbackCell(Arc<Mutex<Option<Result<(), String>>>>);

impl ReadbackCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve(&self, result: Result<(), String>) {
        let mut slot = self.0.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Some(result);
    }

    /// Take the result if the map has completed.
    pub fn try_take(&self) -> Option<Result<(), String>> {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).take()
    }
}

#[derive(Clone, Debug, Default)]
pub enum ReadbackState {
    #[default]
    Idle,
    /// Work submitted, staging map not yet requested.
    Dispatched,
    /// Staging buffer map in flight.
    Reading(ReadbackCell),
}

impl ReadbackState {
    pub fn is_idle(&self) -> bool {
        matches!(self, ReadbackState::Idle)
    }
}

/// The operations the dispatch protocol needs from a GPU.
pub trait ComputeDevice {
    /// Buffers and bind group for one effect.
    type Resources;

    fn tier(&self) -> BackendKind;

    fn create_resources(&mut self, kernel: Kernel, count: usize) -> Result<Self::Resources, GpuError>;

    fn write_uniforms(&mut self, resources: &Self::Resources, bytes: &[u8]);

    fn upload(&mut self, resources: &Self::Resources, binding: u32, data: &[f32]);

    /// Run the kernel and copy its outputs into the staging buffer.
    fn dispatch(&mut self, resources: &Self::Resources, workgroups: u32);

    /// Start mapping the staging buffer.
    fn map_output(&mut self, resources: &Self::Resources) -> ReadbackCell;

    /// Copy the mapped staging buffer out and unmap it. Outputs are
    /// concatenated in [`Kernel::outputs`] order.
    fn read_output(&mut self, resources: &Self::Resources) -> Vec<f32>;

    /// Drive pending map callbacks without blocking.
    fn poll(&mut self);
}

struct EffectSlot<R> {
    kernel: Kernel,
    count: usize,
    resources: Option<R>,
    statics_uploaded: bool,
    readback: ReadbackState,
    /// Resource creation failed; this effect runs on the CPU from now on.
    degraded: bool,
}

impl<R> EffectSlot<R> {
    fn new(kernel: Kernel) -> Self {
        Self {
            kernel,
            count: 0,
            resources: None,
            statics_uploaded: false,
            readback: ReadbackState::Idle,
            degraded: false,
        }
    }
}

pub struct GpuBackend<D: ComputeDevice> {
    device: D,
    slots: HashMap<EffectId, EffectSlot<D::Resources>>,
    next_id: u64,
    reported: HashSet<String>,
}

impl<D: ComputeDevice> GpuBackend<D> {
    pub fn new(device: D) -> Self {
        Self {
            device,
            slots: HashMap::new(),
            next_id: 0,
            reported: HashSet::new(),
        }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn readback_state(&self, handle: &EffectHandle) -> Option<&ReadbackState> {
        self.slots.get(&handle.id()).map(|slot| &slot.readback)
    }

    /// Number of live effects.
    pub fn effect_count(&self) -> usize {
        self.slots.len()
    }

    /// Whether the effect fell back to CPU math.
    pub fn is_degraded(&self, handle: &EffectHandle) -> bool {
        self.slots.get(&handle.id()).is_some_and(|slot| slot.degraded)
    }

    /// Request the map for dispatched work, poll, then apply a finished
    /// readback through `apply`.
    ///
    /// Returns `false` while a readback is still in flight.
    fn settle(&mut self, id: EffectId, apply: impl FnOnce(&[f32])) -> bool {
        let Self {
            device,
            slots,
            reported,
            ..
        } = self;
        let Some(slot) = slots.get_mut(&id) else {
            return false;
        };

        if let ReadbackState::Dispatched = slot.readback {
            slot.readback = match &slot.resources {
                Some(resources) => ReadbackState::Reading(device.map_output(resources)),
                None => ReadbackState::Idle,
            };
        }
        device.poll();

        let result = match &slot.readback {
            ReadbackState::Reading(cell) => match cell.try_take() {
                Some(result) => result,
                None => return false,
            },
            _ => return true,
        };

        slot.readback = ReadbackState::Idle;
        match result {
            Ok(()) => {
                if let Some(resources) = &slot.resources {
                    apply(&device.read_output(resources));
                }
            }
            Err(message) => report(reported, &GpuError::BufferMapping(message)),
        }
        true
    }

    fn submit(
        &mut self,
        id: EffectId,
        count: usize,
        uniforms: &[u8],
        inputs: &[(u32, &[f32])],
    ) -> Result<UpdateOutcome, GpuError> {
        let Self { device, slots, .. } = self;
        let Some(slot) = slots.get_mut(&id) else {
            return Ok(UpdateOutcome::Skipped);
        };
        if count == 0 {
            return Ok(UpdateOutcome::Skipped);
        }

        if slot.resources.is_none() || slot.count != count {
            log::debug!(
                "allocating {} resources for effect {} ({} elements)",
                slot.kernel.label(),
                id.raw(),
                count
            );
            slot.resources = None;
            slot.resources = Some(device.create_resources(slot.kernel, count)?);
            slot.count = count;
            slot.statics_uploaded = false;
        }
        let Some(resources) = slot.resources.as_ref() else {
            return Ok(UpdateOutcome::Skipped);
        };

        device.write_uniforms(resources, uniforms);
        for &(binding, data) in inputs {
            let Some(layout) = slot.kernel.binding(binding) else {
                continue;
            };
            if layout.is_static && slot.statics_uploaded {
                continue;
            }
            let len = data.len().min(count * layout.stride);
            device.upload(resources, binding, &data[..len]);
        }
        slot.statics_uploaded = true;

        let workgroups = (count as u32).div_ceil(WORKGROUP_SIZE);
        device.dispatch(resources, workgroups);
        slot.readback = ReadbackState::Dispatched;

        Ok(UpdateOutcome::Dispatched)
    }

    fn degrade(&mut self, id: EffectId, error: &GpuError) {
        report(&mut self.reported, error);
        if let Some(slot) = self.slots.get_mut(&id) {
            slot.degraded = true;
            slot.resources = None;
            slot.readback = ReadbackState::Idle;
        }
    }

    fn slot_degraded(&self, id: EffectId) -> bool {
        self.slots.get(&id).is_some_and(|slot| slot.degraded)
    }
}

impl<D: ComputeDevice> ComputeBackend for GpuBackend<D> {
    fn kind(&self) -> BackendKind {
        self.device.tier()
    }

    fn acquire(&mut self, kernel: Kernel) -> EffectHandle {
        self.next_id += 1;
        self.slots.insert(EffectId(self.next_id), EffectSlot::new(kernel));
        EffectHandle::new(self.next_id, kernel)
    }

    fn update_twinkle(
        &mut self,
        handle: &EffectHandle,
        buffers: &mut TwinkleBuffers,
        uniforms: &TwinkleUniforms,
    ) -> UpdateOutcome {
        let id = handle.id();
        if self.slot_degraded(id) {
            cpu::twinkle(buffers, uniforms);
            return UpdateOutcome::Applied;
        }

        let ready = self.settle(id, |data| {
            if data.len() == buffers.len() * Kernel::Twinkle.output_stride() {
                buffers.colors[..data.len()].copy_from_slice(data);
                buffers.dirty = true;
            }
        });
        if !ready {
            return UpdateOutcome::Skipped;
        }

        let inputs: [(u32, &[f32]); 2] = [(1, &buffers.base_colors), (2, &buffers.phases)];
        match self.submit(id, buffers.len(), bytemuck::bytes_of(uniforms), &inputs) {
            Ok(outcome) => outcome,
            Err(e) => {
                self.degrade(id, &e);
                cpu::twinkle(buffers, uniforms);
                UpdateOutcome::Applied
            }
        }
    }

    fn update_wind(
        &mut self,
        handle: &EffectHandle,
        buffers: &mut WindBuffers,
        uniforms: &WindUniforms,
    ) -> UpdateOutcome {
        let id = handle.id();
        if self.slot_degraded(id) {
            cpu::solar_wind(buffers, uniforms);
            return UpdateOutcome::Applied;
        }

        let ready = self.settle(id, |data| {
            let count = buffers.len();
            if data.len() == count * Kernel::SolarWind.output_stride() {
                let (positions, lifetimes) = data.split_at(count * 3);
                buffers.positions[..positions.len()].copy_from_slice(positions);
                buffers.lifetimes[..lifetimes.len()].copy_from_slice(lifetimes);
                buffers.dirty = true;
            }
        });
        if !ready {
            return UpdateOutcome::Skipped;
        }

        let inputs: [(u32, &[f32]); 3] = [
            (1, &buffers.velocities),
            (2, &buffers.positions),
            (3, &buffers.lifetimes),
        ];
        match self.submit(id, buffers.len(), bytemuck::bytes_of(uniforms), &inputs) {
            Ok(outcome) => outcome,
            Err(e) => {
                self.degrade(id, &e);
                cpu::solar_wind(buffers, uniforms);
                UpdateOutcome::Applied
            }
        }
    }

    fn release(&mut self, handle: EffectHandle) {
        if let Some(slot) = self.slots.remove(&handle.id()) {
            if !slot.readback.is_idle() {
                log::debug!("releasing effect {} with a readback in flight", handle.id().raw());
            }
        }
    }
}

/// Log the first error of each class at `warn`, repeats at `trace`.
fn report(reported: &mut HashSet<String>, error: &GpuError) {
    let message = error.to_string();
    let class = error_class(&message).to_owned();
    if reported.insert(class) {
        log::warn!("{}", message);
    } else {
        log::trace!("{}", message);
    }
}

/// Everything before the first detail separator, e.g.
/// `"Failed to map GPU buffer: Buffer is already mapped"` and the same
/// message with a different buffer label share a class.
fn error_class(message: &str) -> &str {
    let mut parts = message.splitn(3, ':');
    let head = parts.next().unwrap_or(message);
    match parts.next() {
        Some(kind) => &message[..head.len() + 1 + kind.len()],
        None => head,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct MockResources {
        kernel: Kernel,
        count: usize,
    }

    #[derive(Default)]
    struct MockDevice {
        created: usize,
        uniform_writes: usize,
        uploads: Vec<(u32, usize)>,
        dispatches: Vec<u32>,
        maps: usize,
        pending: Option<ReadbackCell>,
        /// When set, maps complete immediately with this result.
        map_result: Option<Result<(), String>>,
        fail_create: bool,
    }

    impl MockDevice {
        fn completing() -> Self {
            Self {
                map_result: Some(Ok(())),
                ..Default::default()
            }
        }

        fn uploads_of(&self, binding: u32) -> usize {
            self.uploads.iter().filter(|&&(b, _)| b == binding).count()
        }
    }

    impl ComputeDevice for MockDevice {
        type Resources = MockResources;

        fn tier(&self) -> BackendKind {
            BackendKind::Compute
        }

        fn create_resources(&mut self, kernel: Kernel, count: usize) -> Result<MockResources, GpuError> {
            if self.fail_create {
                return Err(GpuError::Allocation("binding too large".into()));
            }
            self.created += 1;
            Ok(MockResources { kernel, count })
        }

        fn write_uniforms(&mut self, _resources: &MockResources, bytes: &[u8]) {
            assert!(!bytes.is_empty());
            self.uniform_writes += 1;
        }

        fn upload(&mut self, _resources: &MockResources, binding: u32, data: &[f32]) {
            self.uploads.push((binding, data.len()));
        }

        fn dispatch(&mut self, _resources: &MockResources, workgroups: u32) {
            self.dispatches.push(workgroups);
        }

        fn map_output(&mut self, _resources: &MockResources) -> ReadbackCell {
            self.maps += 1;
            let cell = ReadbackCell::new();
            if let Some(result) = self.map_result.clone() {
                cell.resolve(result);
            }
            self.pending = Some(cell.clone());
            cell
        }

        /// Distinct values so misplaced outputs show up.
        fn read_output(&mut self, resources: &MockResources) -> Vec<f32> {
            let len = resources.count * resources.kernel.output_stride();
            (0..len).map(|i| i as f32).collect()
        }

        fn poll(&mut self) {}
    }

    fn twinkle_buffers(count: usize) -> TwinkleBuffers {
        TwinkleBuffers::new(vec![1.0; count * 3], vec![0.0; count * 2])
    }

    fn wind_buffers(count: usize) -> WindBuffers {
        WindBuffers::new(vec![0.0; count * 3], vec![0.0; count * 3], vec![1.0; count * 2])
    }

    fn wind_uniforms(count: usize) -> WindUniforms {
        WindUniforms {
            count: count as u32,
            ..Default::default()
        }
    }

    fn resolve(backend: &GpuBackend<MockDevice>, result: Result<(), String>) {
        backend
            .device()
            .pending
            .as_ref()
            .expect("a readback should be pending")
            .resolve(result);
    }

    #[test]
    fn test_dispatch_then_read_on_next_update() {
        let mut backend = GpuBackend::new(MockDevice::default());
        let handle = backend.acquire(Kernel::Twinkle);
        let mut buffers = twinkle_buffers(100);
        let uniforms = TwinkleUniforms::new(0.0, 100);

        assert!(backend.readback_state(&handle).is_some_and(|s| s.is_idle()));
        assert_eq!(backend.update_twinkle(&handle, &mut buffers, &uniforms), UpdateOutcome::Dispatched);
        assert!(matches!(backend.readback_state(&handle), Some(ReadbackState::Dispatched)));
        assert_eq!(backend.device().maps, 0);

        assert_eq!(backend.update_twinkle(&handle, &mut buffers, &uniforms), UpdateOutcome::Skipped);
        assert!(matches!(backend.readback_state(&handle), Some(ReadbackState::Reading(_))));
        assert_eq!(backend.device().maps, 1);
    }

    #[test]
    fn test_second_update_while_pending_is_noop() {
        let mut backend = GpuBackend::new(MockDevice::default());
        let handle = backend.acquire(Kernel::Twinkle);
        let mut buffers = twinkle_buffers(100);
        let uniforms = TwinkleUniforms::new(0.0, 100);

        backend.update_twinkle(&handle, &mut buffers, &uniforms);
        backend.update_twinkle(&handle, &mut buffers, &uniforms);
        assert_eq!(backend.device().dispatches, vec![2]);
        let writes = backend.device().uniform_writes;
        let uploads = backend.device().uploads.len();

        for _ in 0..3 {
            assert_eq!(backend.update_twinkle(&handle, &mut buffers, &uniforms), UpdateOutcome::Skipped);
        }
        assert_eq!(backend.device().dispatches.len(), 1);
        assert_eq!(backend.device().uniform_writes, writes);
        assert_eq!(backend.device().uploads.len(), uploads);
        assert_eq!(backend.device().maps, 1);

        resolve(&backend, Ok(()));
        assert_eq!(backend.update_twinkle(&handle, &mut buffers, &uniforms), UpdateOutcome::Dispatched);
        assert_eq!(backend.device().dispatches.len(), 2);
    }

    #[test]
    fn test_twinkle_readback_lands_in_colors() {
        let mut backend = GpuBackend::new(MockDevice::completing());
        let handle = backend.acquire(Kernel::Twinkle);
        let mut buffers = twinkle_buffers(10);
        let uniforms = TwinkleUniforms::new(0.0, 10);

        backend.update_twinkle(&handle, &mut buffers, &uniforms);
        buffers.dirty = false;

        assert_eq!(backend.update_twinkle(&handle, &mut buffers, &uniforms), UpdateOutcome::Dispatched);
        assert!(buffers.dirty);
        let expected: Vec<f32> = (0..30).map(|i| i as f32).collect();
        assert_eq!(buffers.colors, expected);
        assert_eq!(buffers.base_colors, vec![1.0; 30]);
        assert_eq!(backend.device().dispatches.len(), 2);
    }

    #[test]
    fn test_wind_readback_splits_positions_and_lifetimes() {
        let mut backend = GpuBackend::new(MockDevice::completing());
        let handle = backend.acquire(Kernel::SolarWind);
        let mut buffers = wind_buffers(2);

        backend.update_wind(&handle, &mut buffers, &wind_uniforms(2));
        buffers.dirty = false;
        backend.update_wind(&handle, &mut buffers, &wind_uniforms(2));

        assert!(buffers.dirty);
        assert_eq!(buffers.positions, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(buffers.lifetimes, vec![6.0, 7.0, 8.0, 9.0]);
        assert_eq!(buffers.velocities, vec![0.0; 6]);
    }

    #[test]
    fn test_static_inputs_upload_once() {
        let mut backend = GpuBackend::new(MockDevice::completing());
        let handle = backend.acquire(Kernel::SolarWind);
        let mut buffers = wind_buffers(10);

        for _ in 0..3 {
            assert_eq!(backend.update_wind(&handle, &mut buffers, &wind_uniforms(10)), UpdateOutcome::Dispatched);
        }

        let device = backend.device();
        assert_eq!(device.uploads_of(1), 1);
        assert_eq!(device.uploads_of(2), 3);
        assert_eq!(device.uploads_of(3), 3);
        assert_eq!(device.created, 1);
    }

    #[test]
    fn test_uploads_never_exceed_element_count() {
        let mut backend = GpuBackend::new(MockDevice::default());
        let handle = backend.acquire(Kernel::Twinkle);
        let mut buffers = TwinkleBuffers {
            base_colors: vec![1.0; 12],
            phases: vec![0.0; 4],
            colors: vec![1.0; 12],
            dirty: false,
        };

        backend.update_twinkle(&handle, &mut buffers, &TwinkleUniforms::new(0.0, 2));
        assert_eq!(backend.device().uploads, vec![(1, 6), (2, 4)]);
    }

    #[test]
    fn test_readback_error_returns_to_idle() {
        let mut backend = GpuBackend::new(MockDevice {
            map_result: Some(Err("Buffer is already mapped".into())),
            ..Default::default()
        });
        let handle = backend.acquire(Kernel::Twinkle);
        let mut buffers = twinkle_buffers(4);
        let uniforms = TwinkleUniforms::new(0.0, 4);

        backend.update_twinkle(&handle, &mut buffers, &uniforms);
        buffers.dirty = false;

        assert_eq!(backend.update_twinkle(&handle, &mut buffers, &uniforms), UpdateOutcome::Dispatched);
        assert!(!buffers.dirty);
        assert!(buffers.colors.iter().all(|&c| c == 1.0));
        assert_eq!(backend.reported.len(), 1);

        backend.update_twinkle(&handle, &mut buffers, &uniforms);
        assert_eq!(backend.device().dispatches.len(), 3);
        assert_eq!(backend.reported.len(), 1);
    }

    #[test]
    fn test_count_change_recreates_resources() {
        let mut backend = GpuBackend::new(MockDevice::completing());
        let handle = backend.acquire(Kernel::Twinkle);
        let uniforms = TwinkleUniforms::new(0.0, 0);

        let mut small = twinkle_buffers(8);
        backend.update_twinkle(&handle, &mut small, &uniforms);

        let mut large = twinkle_buffers(200);
        backend.update_twinkle(&handle, &mut large, &uniforms);
        assert_eq!(backend.device().created, 2);
        assert_eq!(backend.device().dispatches, vec![1, 4]);
        // Static inputs are re-uploaded into the new buffers.
        assert_eq!(backend.device().uploads_of(1), 2);
    }

    #[test]
    fn test_stale_result_of_other_size_is_dropped() {
        let mut backend = GpuBackend::new(MockDevice::completing());
        let handle = backend.acquire(Kernel::Twinkle);
        let uniforms = TwinkleUniforms::new(0.0, 0);

        backend.update_twinkle(&handle, &mut twinkle_buffers(8), &uniforms);

        let mut other = twinkle_buffers(3);
        other.dirty = false;
        backend.update_twinkle(&handle, &mut other, &uniforms);
        assert!(!other.dirty);
        assert_eq!(other.colors, vec![1.0; 9]);
    }

    #[test]
    fn test_resource_failure_degrades_to_cpu() {
        let mut backend = GpuBackend::new(MockDevice {
            fail_create: true,
            ..Default::default()
        });
        let handle = backend.acquire(Kernel::Twinkle);
        let mut buffers = TwinkleBuffers::new(vec![1.0; 3], vec![0.0, 1.0]);
        buffers.dirty = false;

        let outcome = backend.update_twinkle(&handle, &mut buffers, &TwinkleUniforms::new(0.0, 1));
        assert_eq!(outcome, UpdateOutcome::Applied);
        assert!(buffers.dirty);
        assert!(backend.is_degraded(&handle));

        backend.device_mut().fail_create = false;
        backend.update_twinkle(&handle, &mut buffers, &TwinkleUniforms::new(1.0, 1));
        assert_eq!(backend.device().created, 0);
    }

    #[test]
    fn test_release_forgets_effect() {
        let mut backend = GpuBackend::new(MockDevice::default());
        let handle = backend.acquire(Kernel::Twinkle);
        let mut buffers = twinkle_buffers(2);
        backend.update_twinkle(&handle, &mut buffers, &TwinkleUniforms::new(0.0, 2));

        let stale = EffectHandle::new(handle.id().raw(), handle.kernel());
        backend.release(handle);
        assert_eq!(backend.effect_count(), 0);
        assert!(backend.readback_state(&stale).is_none());
        assert_eq!(
            backend.update_twinkle(&stale, &mut buffers, &TwinkleUniforms::new(0.0, 2)),
            UpdateOutcome::Skipped
        );
    }

    #[test]
    fn test_error_class_ignores_detail() {
        assert_eq!(
            error_class("Failed to map GPU buffer: Buffer is already mapped: staging"),
            "Failed to map GPU buffer: Buffer is already mapped"
        );
        assert_eq!(error_class("plain"), "plain");
    }
}
