//! The display side of a session.
//!
//! An [`EffectSession`](crate::session::EffectSession) only talks to a
//! [`RenderTarget`]. [`PointRenderer`](crate::gpu::PointRenderer) is the wgpu
//! implementation; tests use a recording target.

use crate::error::RenderError;

/// Something an effect can be drawn onto.
pub trait RenderTarget {
    /// The surface changed size, in physical pixels.
    fn resize(&mut self, width: u32, height: u32);

    /// Replace the instance data. Both slices hold three floats per point.
    fn upload(&mut self, positions: &[f32], colors: &[f32]);

    /// Draw the last uploaded data.
    fn draw(&mut self) -> Result<(), RenderError>;

    /// Free every graphics resource. The target is unusable afterwards.
    fn release(&mut self);
}

impl<T: RenderTarget + ?Sized> RenderTarget for Box<T> {
    fn resize(&mut self, width: u32, height: u32) {
        (**self).resize(width, height)
    }

    fn upload(&mut self, positions: &[f32], colors: &[f32]) {
        (**self).upload(positions, colors)
    }

    fn draw(&mut self) -> Result<(), RenderError> {
        (**self).draw()
    }

    fn release(&mut self) {
        (**self).release()
    }
}
