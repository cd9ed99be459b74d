//! One effect bound to one render target.
//!
//! [`EffectSession`] owns everything a running effect needs: the effect
//! state, the compute backend, the render target and the loop state. A host
//! creates one per surface and drives it through
//! `start / pause / resume / dispose` plus one [`frame`](EffectSession::frame)
//! call per display refresh.

use std::time::Instant;

use glam::Vec3;

use crate::compute::{probe_backend, BackendKind, ComputeBackend, CpuBackend};
use crate::config::{Environment, Preset};
use crate::effects::Effect;
use crate::error::RenderError;
use crate::render::RenderTarget;
use crate::render_loop::{LoopState, RenderLoop};

pub struct EffectSession<T: RenderTarget> {
    effect: Effect,
    backend: Box<dyn ComputeBackend>,
    /// `None` once disposed.
    target: Option<T>,
    render_loop: RenderLoop,
    environment: Environment,
    extent: f32,
}

impl<T: RenderTarget> EffectSession<T> {
    /// Create a session, probing for the best compute backend if the
    /// preset offloads any work.
    ///
    /// Returns `None` on low-capability hosts or without a render target;
    /// the surface then simply stays empty.
    pub fn new(preset: Preset, target: Option<T>, environment: Environment) -> Option<Self> {
        if !Self::can_run(&target, &environment) {
            return None;
        }
        let backend: Box<dyn ComputeBackend> = if preset.uses_compute() {
            probe_backend(&BackendKind::PROBE_ORDER)
        } else {
            Box::new(CpuBackend::new())
        };
        Self::with_backend(preset, target, environment, backend)
    }

    /// Like [`new`](Self::new) with an explicit backend.
    pub fn with_backend(
        preset: Preset,
        target: Option<T>,
        environment: Environment,
        mut backend: Box<dyn ComputeBackend>,
    ) -> Option<Self> {
        if !Self::can_run(&target, &environment) {
            return None;
        }
        let mut target = target?;
        let (width, height) = environment.viewport;
        target.resize(width, height);

        let effect = Effect::new(&preset, backend.as_mut());
        log::info!(
            "{} session: {} points on {} backend",
            effect.name(),
            effect.len(),
            backend.kind()
        );

        Some(Self {
            effect,
            backend,
            target: Some(target),
            render_loop: RenderLoop::new(),
            environment,
            extent: preset.extent(),
        })
    }

    fn can_run(target: &Option<T>, environment: &Environment) -> bool {
        if environment.low_capability {
            log::info!("low-capability host, effect disabled");
            return false;
        }
        if target.is_none() {
            log::info!("no render target, effect disabled");
            return false;
        }
        true
    }

    pub fn start(&mut self) {
        if self.render_loop.start() {
            log::info!("{} started", self.effect.name());
        }
    }

    pub fn pause(&mut self) {
        if self.render_loop.pause() {
            log::debug!("{} paused", self.effect.name());
        }
    }

    pub fn resume(&mut self) {
        if self.render_loop.resume() {
            log::debug!("{} resumed", self.effect.name());
        }
    }

    /// Pause and free all backend and render resources.
    pub fn dispose(&mut self) {
        if !self.render_loop.dispose() {
            return;
        }
        self.effect.release(self.backend.as_mut());
        if let Some(mut target) = self.target.take() {
            target.release();
        }
        log::info!("{} disposed", self.effect.name());
    }

    /// Page/window visibility changed.
    pub fn set_visibility(&mut self, visible: bool) {
        if visible {
            self.resume();
        } else {
            self.pause();
        }
    }

    /// Run one frame at `now`: advance the effect, upload changed data and
    /// draw.
    ///
    /// Returns `Ok(false)` when the loop is not running and nothing was done.
    pub fn frame(&mut self, now: Instant) -> Result<bool, RenderError> {
        let Some(delta_time) = self.render_loop.begin_frame(now) else {
            return Ok(false);
        };
        let Some(target) = self.target.as_mut() else {
            return Ok(false);
        };

        self.effect.update(delta_time, self.backend.as_mut());
        if let Some(frame) = self.effect.take_frame() {
            target.upload(frame.positions, frame.colors);
        }
        target.draw()?;

        if self.render_loop.mark_rendered() {
            log::info!("{} loaded", self.effect.name());
        }
        Ok(true)
    }

    /// Pointer position in physical pixels, or `None` when it left the surface.
    pub fn set_pointer(&mut self, pointer: Option<(f32, f32)>) {
        let world = pointer.map(|(x, y)| pointer_to_world(x, y, self.environment.viewport, self.extent));
        self.effect.set_pointer(world);
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.environment.viewport = (width, height);
        if let Some(target) = self.target.as_mut() {
            target.resize(width, height);
        }
    }

    /// Whether the first frame has been drawn.
    pub fn is_loaded(&self) -> bool {
        self.render_loop.is_loaded()
    }

    pub fn state(&self) -> LoopState {
        self.render_loop.state()
    }

    pub fn is_running(&self) -> bool {
        self.render_loop.is_running()
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub fn effect(&self) -> &Effect {
        &self.effect
    }

    pub fn render_loop(&self) -> &RenderLoop {
        &self.render_loop
    }

    pub fn target(&self) -> Option<&T> {
        self.target.as_ref()
    }

    pub fn target_mut(&mut self) -> Option<&mut T> {
        self.target.as_mut()
    }
}

impl<T: RenderTarget> Drop for EffectSession<T> {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Map a pixel position onto the `z = 0` plane of a volume spanning
/// `-extent..=extent` vertically, widened by the aspect ratio.
pub fn pointer_to_world(x: f32, y: f32, viewport: (u32, u32), extent: f32) -> Vec3 {
    let width = viewport.0.max(1) as f32;
    let height = viewport.1.max(1) as f32;
    let ndc_x = x / width * 2.0 - 1.0;
    let ndc_y = 1.0 - y / height * 2.0;
    Vec3::new(ndc_x * extent * width / height, ndc_y * extent, 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ClusterConfig, SimulationConfig};
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingTarget {
        size: (u32, u32),
        uploads: usize,
        last_points: usize,
        draws: usize,
        released: bool,
        fail_draws: bool,
    }

    impl RenderTarget for RecordingTarget {
        fn resize(&mut self, width: u32, height: u32) {
            self.size = (width, height);
        }

        fn upload(&mut self, positions: &[f32], colors: &[f32]) {
            assert_eq!(positions.len(), colors.len());
            self.uploads += 1;
            self.last_points = positions.len() / 3;
        }

        fn draw(&mut self) -> Result<(), RenderError> {
            if self.fail_draws {
                return Err(wgpu::SurfaceError::Timeout.into());
            }
            self.draws += 1;
            Ok(())
        }

        fn release(&mut self) {
            self.released = true;
        }
    }

    fn preset() -> Preset {
        Preset::Flocking(
            SimulationConfig::default()
                .with_agent_count(64)
                .with_clusters(ClusterConfig::disabled()),
        )
    }

    fn session(target: RecordingTarget) -> EffectSession<RecordingTarget> {
        EffectSession::with_backend(
            preset(),
            Some(target),
            Environment::new((800, 600), false),
            Box::new(CpuBackend::new()),
        )
        .expect("session should initialize")
    }

    #[test]
    fn test_low_capability_disables_effect() {
        let env = Environment::new((800, 600), true);
        let session =
            EffectSession::with_backend(preset(), Some(RecordingTarget::default()), env, Box::new(CpuBackend::new()));
        assert!(session.is_none());
    }

    #[test]
    fn test_flocking_session_stays_on_cpu() {
        let env = Environment::new((800, 600), false);
        let session = EffectSession::new(preset(), Some(RecordingTarget::default()), env)
            .expect("session should initialize");
        assert_eq!(session.backend_kind(), BackendKind::Cpu);
    }

    #[test]
    fn test_missing_target_disables_effect() {
        let env = Environment::new((800, 600), false);
        let session = EffectSession::<RecordingTarget>::with_backend(preset(), None, env, Box::new(CpuBackend::new()));
        assert!(session.is_none());
    }

    #[test]
    fn test_frames_only_run_while_started() {
        let mut session = session(RecordingTarget::default());
        assert_eq!(session.target().map(|t| t.size), Some((800, 600)));
        let now = Instant::now();

        assert!(!session.frame(now).unwrap());
        assert!(!session.is_loaded());

        session.start();
        assert!(session.frame(now).unwrap());
        assert!(session.frame(now + Duration::from_millis(16)).unwrap());
        assert!(session.is_loaded());

        let target = session.target().unwrap();
        assert_eq!(target.draws, 2);
        assert_eq!(target.uploads, 2);
        assert_eq!(target.last_points, 64);
    }

    #[test]
    fn test_visibility_pauses_and_resumes() {
        let mut session = session(RecordingTarget::default());
        session.start();
        session.set_visibility(false);
        assert_eq!(session.state(), LoopState::Paused);
        assert!(!session.frame(Instant::now()).unwrap());

        session.set_visibility(true);
        assert!(session.is_running());
        assert!(session.frame(Instant::now()).unwrap());
    }

    #[test]
    fn test_failed_draw_is_not_loaded() {
        let mut session = session(RecordingTarget {
            fail_draws: true,
            ..Default::default()
        });
        session.start();
        assert!(session.frame(Instant::now()).is_err());
        assert!(!session.is_loaded());
    }

    #[test]
    fn test_dispose_releases_target() {
        let mut session = session(RecordingTarget::default());
        session.start();
        session.frame(Instant::now()).unwrap();
        session.dispose();

        assert_eq!(session.state(), LoopState::Disposed);
        assert!(session.target().is_none());
        assert!(!session.frame(Instant::now()).unwrap());
        session.start();
        assert_eq!(session.state(), LoopState::Disposed);
    }

    #[test]
    fn test_pointer_maps_to_world() {
        let center = pointer_to_world(400.0, 300.0, (800, 600), 15.0);
        assert!(center.length() < 1e-5);
        let top_left = pointer_to_world(0.0, 0.0, (800, 600), 15.0);
        assert!((top_left.y - 15.0).abs() < 1e-5);
        assert!((top_left.x + 20.0).abs() < 1e-5);
    }

    #[test]
    fn test_pointer_reaches_flock() {
        let mut session = session(RecordingTarget::default());
        session.set_pointer(Some((400.0, 300.0)));
        match session.effect() {
            Effect::Flock(e) => assert!(e.flock().pointer().is_some()),
            _ => unreachable!(),
        }
        session.set_pointer(None);
        match session.effect() {
            Effect::Flock(e) => assert!(e.flock().pointer().is_none()),
            _ => unreachable!(),
        }
    }
}
