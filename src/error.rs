//! Error types for flockfx.
//!
//! None of these are fatal to the host: GPU initialization errors downgrade
//! the compute backend, readback errors drop a frame's update, and a missing
//! render target disables the effect.

use std::fmt;

/// Errors that can occur during GPU initialization or readback.
#[derive(Debug)]
pub enum GpuError {
    /// Failed to create a surface for rendering.
    SurfaceCreation(wgpu::CreateSurfaceError),
    /// No compatible GPU adapter found.
    NoAdapter,
    /// Failed to create GPU device.
    DeviceCreation(wgpu::RequestDeviceError),
    /// The adapter cannot run compute shaders.
    MissingComputeSupport,
    /// Buffer allocation failed or exceeded device limits.
    Allocation(String),
    /// Failed to map buffer for reading.
    BufferMapping(String),
}

impl fmt::Display for GpuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GpuError::SurfaceCreation(e) => write!(f, "Failed to create GPU surface: {}", e),
            GpuError::NoAdapter => write!(f, "No compatible GPU adapter found"),
            GpuError::DeviceCreation(e) => write!(f, "Failed to create GPU device: {}", e),
            GpuError::MissingComputeSupport => write!(f, "GPU adapter does not support compute shaders"),
            GpuError::Allocation(msg) => write!(f, "Failed to allocate GPU buffers: {}", msg),
            GpuError::BufferMapping(msg) => write!(f, "Failed to map GPU buffer: {}", msg),
        }
    }
}

impl std::error::Error for GpuError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GpuError::SurfaceCreation(e) => Some(e),
            GpuError::DeviceCreation(e) => Some(e),
            _ => None,
        }
    }
}

impl From<wgpu::CreateSurfaceError> for GpuError {
    fn from(e: wgpu::CreateSurfaceError) -> Self {
        GpuError::SurfaceCreation(e)
    }
}

impl From<wgpu::RequestDeviceError> for GpuError {
    fn from(e: wgpu::RequestDeviceError) -> Self {
        GpuError::DeviceCreation(e)
    }
}

/// Errors from presenting a frame.
#[derive(Debug)]
pub enum RenderError {
    /// The surface could not provide a texture this frame.
    Surface(wgpu::SurfaceError),
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::Surface(e) => write!(f, "Failed to acquire surface texture: {}", e),
        }
    }
}

impl std::error::Error for RenderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RenderError::Surface(e) => Some(e),
        }
    }
}

impl From<wgpu::SurfaceError> for RenderError {
    fn from(e: wgpu::SurfaceError) -> Self {
        RenderError::Surface(e)
    }
}

/// Errors that can occur when running a windowed session.
#[derive(Debug)]
pub enum SessionError {
    /// Failed to create event loop.
    EventLoop(winit::error::EventLoopError),
    /// Failed to create window.
    Window(winit::error::OsError),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::EventLoop(e) => write!(f, "Failed to create event loop: {}", e),
            SessionError::Window(e) => write!(f, "Failed to create window: {}", e),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::EventLoop(e) => Some(e),
            SessionError::Window(e) => Some(e),
        }
    }
}

impl From<winit::error::EventLoopError> for SessionError {
    fn from(e: winit::error::EventLoopError) -> Self {
        SessionError::EventLoop(e)
    }
}

impl From<winit::error::OsError> for SessionError {
    fn from(e: winit::error::OsError) -> Self {
        SessionError::Window(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_buffer_mapping_message() {
        let e = GpuError::BufferMapping("already mapped".into());
        assert_eq!(e.to_string(), "Failed to map GPU buffer: already mapped");
        assert!(e.source().is_none());
    }

    #[test]
    fn test_session_error_wraps_event_loop() {
        let e = SessionError::from(winit::error::EventLoopError::RecreationAttempt);
        assert!(e.to_string().starts_with("Failed to create event loop"));
        assert!(e.source().is_some());
    }
}
