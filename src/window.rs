//! Windowed host.
//!
//! Drives an [`EffectSession`] from a winit event loop: redraw requests are
//! the frame callback, occlusion is the visibility signal, the cursor feeds
//! pointer attraction.

use std::sync::Arc;
use std::time::Instant;

use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use crate::config::{Environment, Preset};
use crate::effects::Effect;
use crate::error::{GpuError, RenderError, SessionError};
use crate::gpu::PointRenderer;
use crate::render::RenderTarget;
use crate::session::EffectSession;

/// Turntable speed for the non-interactive effects, radians per second.
const ORBIT_SPEED: f32 = 0.03;

struct App {
    preset: Preset,
    window: Option<Arc<Window>>,
    session: Option<EffectSession<PointRenderer>>,
    error: Option<SessionError>,
}

impl App {
    fn new(preset: Preset) -> Self {
        Self {
            preset,
            window: None,
            session: None,
            error: None,
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: SessionError) {
        self.error = Some(error);
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window_attrs = Window::default_attributes()
            .with_title("flockfx")
            .with_inner_size(winit::dpi::LogicalSize::new(1280, 720));

        let window = match event_loop.create_window(window_attrs) {
            Ok(window) => Arc::new(window),
            Err(e) => return self.fail(event_loop, e.into()),
        };
        let size = window.inner_size();

        let renderer = pollster::block_on(PointRenderer::new(window.clone(), self.preset.extent()));
        let environment = Environment::detect((size.width, size.height));
        self.session = start_session(self.preset.clone(), renderer, environment);

        window.request_redraw();
        self.window = Some(window);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let Some(session) = &mut self.session else {
            if matches!(event, WindowEvent::CloseRequested) {
                event_loop.exit();
            }
            return;
        };

        match event {
            WindowEvent::CloseRequested => {
                session.dispose();
                event_loop.exit();
            }
            WindowEvent::Resized(physical_size) => {
                session.resize(physical_size.width, physical_size.height);
            }
            WindowEvent::Occluded(occluded) => {
                session.set_visibility(!occluded);
                if !occluded {
                    if let Some(window) = &self.window {
                        window.request_redraw();
                    }
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                session.set_pointer(Some((position.x as f32, position.y as f32)));
            }
            WindowEvent::CursorLeft { .. } => {
                session.set_pointer(None);
            }
            WindowEvent::RedrawRequested => {
                match session.frame(Instant::now()) {
                    Ok(_) => {}
                    Err(RenderError::Surface(wgpu::SurfaceError::OutOfMemory)) => {
                        log::error!("surface out of memory, closing");
                        session.dispose();
                        event_loop.exit();
                        return;
                    }
                    Err(e) => log::debug!("frame skipped: {}", e),
                }

                if !matches!(session.effect(), Effect::Flock(_)) {
                    let delta = session.render_loop().clock().delta();
                    if let Some(renderer) = session.target_mut() {
                        renderer.camera.orbit(delta, ORBIT_SPEED);
                    }
                }

                if session.is_running() {
                    if let Some(window) = &self.window {
                        window.request_redraw();
                    }
                }
            }
            _ => {}
        }
    }
}

/// Build and start a session. A renderer that failed to initialize counts
/// as a missing target: the window stays blank.
fn start_session<T: RenderTarget>(
    preset: Preset,
    renderer: Result<T, GpuError>,
    environment: Environment,
) -> Option<EffectSession<T>> {
    let target = renderer
        .map_err(|e| log::warn!("renderer unavailable: {}", e))
        .ok();
    let mut session = EffectSession::new(preset, target, environment)?;
    session.start();
    Some(session)
}

/// Open a window and run `preset` until it is closed.
pub fn run(preset: Preset) -> Result<(), SessionError> {
    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Wait);

    let mut app = App::new(preset);
    event_loop.run_app(&mut app)?;

    match app.error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ClusterConfig, SimulationConfig};
    use crate::render_loop::LoopState;

    struct NullTarget;

    impl RenderTarget for NullTarget {
        fn resize(&mut self, _width: u32, _height: u32) {}

        fn upload(&mut self, _positions: &[f32], _colors: &[f32]) {}

        fn draw(&mut self) -> Result<(), RenderError> {
            Ok(())
        }

        fn release(&mut self) {}
    }

    fn preset() -> Preset {
        Preset::Flocking(
            SimulationConfig::default()
                .with_agent_count(16)
                .with_clusters(ClusterConfig::disabled()),
        )
    }

    #[test]
    fn test_renderer_failure_leaves_window_blank() {
        let env = Environment::new((640, 480), false);
        let session = start_session::<NullTarget>(preset(), Err(GpuError::NoAdapter), env);
        assert!(session.is_none());
    }

    #[test]
    fn test_session_starts_running() {
        let env = Environment::new((640, 480), false);
        let session = start_session(preset(), Ok(NullTarget), env).expect("session should initialize");
        assert_eq!(session.state(), LoopState::Running);
    }
}
