//! The renderer seam.
//!
//! A [`SceneRenderer`] turns a model matrix into a color image and a depth
//! buffer the size of the background. The session does not care whether the
//! pixels came from the GPU ([`GpuRenderer`](crate::GpuRenderer)) or the CPU
//! ([`SoftwareRenderer`](crate::SoftwareRenderer)).

use glam::Mat4;
use image::{ImageBuffer, Luma, RgbImage};
use serde::{Deserialize, Serialize};

use crate::error::RenderError;

/// Linear camera-space depth per pixel; `0.0` where nothing was drawn.
pub type DepthImage = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Color and depth produced by one render.
#[derive(Clone, Debug)]
pub struct RenderOutput {
    pub color: RgbImage,
    pub depth: DepthImage,
}

impl RenderOutput {
    /// A black frame with no geometry.
    pub fn empty(width: u32, height: u32) -> Self {
        Self {
            color: RgbImage::new(width, height),
            depth: DepthImage::new(width, height),
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.color.dimensions()
    }
}

/// Renders the scene's single mesh under a given model matrix.
pub trait SceneRenderer {
    /// Output size in pixels.
    fn size(&self) -> (u32, u32);

    fn render(&mut self, model: Mat4) -> Result<RenderOutput, RenderError>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

impl<R: SceneRenderer + ?Sized> SceneRenderer for Box<R> {
    fn size(&self) -> (u32, u32) {
        (**self).size()
    }

    fn render(&mut self, model: Mat4) -> Result<RenderOutput, RenderError> {
        (**self).render(model)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

/// Which [`SceneRenderer`] the app builds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RendererKind {
    #[default]
    Gpu,
    Software,
}
