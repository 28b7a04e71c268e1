use glam::{Mat4, Vec3};

/// A fixed perspective camera.
///
/// Defaults to the overlay setup: five units back on +Z, looking down -Z,
/// 60 degree vertical field of view and an infinite far plane.
#[derive(Clone, Copy, Debug)]
pub struct Camera {
    pub position: Vec3,
    pub forward: Vec3,
    pub up: Vec3,
    pub yfov: f32, // radians
    pub znear: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 5.0),
            forward: Vec3::NEG_Z,
            up: Vec3::Y,
            yfov: std::f32::consts::FRAC_PI_3,
            znear: 0.05,
        }
    }
}

impl Camera {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn at(mut self, x: f32, y: f32, z: f32) -> Self {
        self.position = Vec3::new(x, y, z);
        self
    }

    pub fn with_fov(mut self, fov_degrees: f32) -> Self {
        self.yfov = fov_degrees.to_radians();
        self
    }

    pub fn with_znear(mut self, znear: f32) -> Self {
        self.znear = znear;
        self
    }

    /// World to camera space.
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_to_rh(self.position, self.forward, self.up)
    }

    /// Camera to clip space, `[0, 1]` depth, far plane at infinity.
    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_infinite_rh(self.yfov, aspect, self.znear)
    }

    pub fn view_projection(&self, aspect: f32) -> Mat4 {
        self.projection_matrix(aspect) * self.view_matrix()
    }
}
