//! The single scene the overlay renders: one mesh, one light, one camera.

use glam::Vec3;

use crate::camera::Camera;
use crate::geometry::RawGeometry;

/// A light infinitely far away, shining along `direction`.
#[derive(Clone, Copy, Debug)]
pub struct DirectionalLight {
    pub direction: Vec3,
    pub color: Vec3,
    pub intensity: f32,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            direction: Vec3::NEG_Z,
            color: Vec3::ONE,
            intensity: 3.0,
        }
    }
}

impl DirectionalLight {
    /// Flat two-sided Lambert term for a surface with normal `normal`.
    ///
    /// `normal` must already face the viewer. The result is clamped to
    /// displayable range.
    pub fn shade(&self, base_color: Vec3, normal: Vec3) -> Vec3 {
        let lambert = normal.dot(-self.direction.normalize_or_zero()).max(0.0);
        (base_color * self.color * self.intensity * lambert).clamp(Vec3::ZERO, Vec3::ONE)
    }
}

/// Everything a renderer needs besides the per-frame model matrix.
#[derive(Clone, Debug)]
pub struct Scene {
    pub geometry: RawGeometry,
    pub camera: Camera,
    pub light: DirectionalLight,
    /// Linear RGB albedo of the mesh.
    pub base_color: Vec3,
}

impl Scene {
    pub fn new(geometry: RawGeometry) -> Self {
        Self {
            geometry,
            camera: Camera::default(),
            light: DirectionalLight::default(),
            base_color: Vec3::splat(0.4),
        }
    }

    pub fn with_camera(mut self, camera: Camera) -> Self {
        self.camera = camera;
        self
    }

    pub fn with_light(mut self, light: DirectionalLight) -> Self {
        self.light = light;
        self
    }

    pub fn with_base_color(mut self, color: Vec3) -> Self {
        self.base_color = color;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn facing_surface_saturates_under_default_light() {
        let light = DirectionalLight::default();
        let lit = light.shade(Vec3::splat(0.4), Vec3::Z);
        assert_eq!(lit, Vec3::ONE);
    }

    #[test]
    fn grazing_and_averted_surfaces_are_dark() {
        let light = DirectionalLight::default();
        assert_eq!(light.shade(Vec3::ONE, Vec3::X), Vec3::ZERO);
        assert_eq!(light.shade(Vec3::ONE, Vec3::NEG_Z), Vec3::ZERO);
    }
}
