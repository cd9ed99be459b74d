//! Orbit camera framing an effect's volume.

use glam::{Mat4, Vec3};

/// Vertical field of view in degrees.
const FOV_Y: f32 = 45.0;

pub struct Camera {
    /// Horizontal rotation angle in radians.
    pub yaw: f32,
    /// Vertical rotation angle in radians.
    pub pitch: f32,
    /// Distance from the target point.
    pub distance: f32,
    /// Point the camera orbits around.
    pub target: Vec3,
}

impl Camera {
    /// Head-on camera far enough back that `-extent..=extent` fills the
    /// view vertically.
    pub fn framing(extent: f32) -> Self {
        let half_fov = (FOV_Y * 0.5).to_radians();
        Self {
            yaw: 0.0,
            pitch: 0.0,
            distance: extent / half_fov.tan() + extent,
            target: Vec3::ZERO,
        }
    }

    /// The camera's world position.
    pub fn position(&self) -> Vec3 {
        let x = self.distance * self.pitch.cos() * self.yaw.sin();
        let y = self.distance * self.pitch.sin();
        let z = self.distance * self.pitch.cos() * self.yaw.cos();
        self.target + Vec3::new(x, y, z)
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position(), self.target, Vec3::Y)
    }

    pub fn view_proj(&self, aspect: f32) -> Mat4 {
        let far = self.distance * 4.0;
        Mat4::perspective_rh(FOV_Y.to_radians(), aspect.max(f32::EPSILON), 0.1, far) * self.view_matrix()
    }

    /// Slow turntable motion.
    pub fn orbit(&mut self, delta_time: f32, speed: f32) {
        self.yaw = (self.yaw + delta_time * speed) % std::f32::consts::TAU;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_framing_keeps_volume_in_view() {
        let camera = Camera::framing(15.0);
        let view_proj = camera.view_proj(1.0);
        for corner in [Vec3::new(15.0, 15.0, 0.0), Vec3::new(-15.0, -15.0, 0.0)] {
            let clip = view_proj * corner.extend(1.0);
            let ndc = clip.truncate() / clip.w;
            assert!(ndc.x.abs() <= 1.0 && ndc.y.abs() <= 1.0);
        }
    }

    #[test]
    fn test_orbit_wraps_yaw() {
        let mut camera = Camera::framing(1.0);
        camera.orbit(100.0, 1.0);
        assert!(camera.yaw.abs() < std::f32::consts::TAU);
    }
}
