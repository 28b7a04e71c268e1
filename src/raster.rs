//! CPU rasterizer producing the same color and depth buffers as the GPU path.
//!
//! Triangles are transformed to clip space, projected to pixel coordinates and
//! filled by testing pixel centers against barycentric edge functions. Depth is
//! interpolated as `1/w` so the stored value is the perspective-correct
//! distance along the view axis, matching the GPU depth target.
//!
//! Triangles with a vertex at or behind the near plane are dropped rather than
//! clipped.

use glam::{Mat3, Mat4, Vec2, Vec3, Vec4Swizzles};
use image::{Luma, Rgb};

use crate::error::RenderError;
use crate::render::{RenderOutput, SceneRenderer};
use crate::scene::Scene;

/// Renders a [`Scene`] on the CPU.
pub struct SoftwareRenderer {
    scene: Scene,
    width: u32,
    height: u32,
}

impl SoftwareRenderer {
    pub fn new(scene: Scene, width: u32, height: u32) -> Self {
        Self {
            scene,
            width,
            height,
        }
    }
}

struct ScreenVertex {
    pos: Vec2,
    inv_w: f32,
}

fn edge(a: Vec2, b: Vec2, p: Vec2) -> f32 {
    (b - a).perp_dot(p - a)
}

fn to_rgb(color: Vec3) -> Rgb<u8> {
    let c = (color.clamp(Vec3::ZERO, Vec3::ONE) * 255.0).round();
    Rgb([c.x as u8, c.y as u8, c.z as u8])
}

impl SceneRenderer for SoftwareRenderer {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn name(&self) -> &'static str {
        "software"
    }

    fn render(&mut self, model: Mat4) -> Result<RenderOutput, RenderError> {
        let (width, height) = (self.width, self.height);
        let mut out = RenderOutput::empty(width, height);
        if width == 0 || height == 0 {
            return Ok(out);
        }

        let scene = &self.scene;
        let aspect = width as f32 / height as f32;
        let mvp = scene.camera.view_projection(aspect) * model;
        let normal_matrix = Mat3::from_mat4(model).inverse().transpose();
        let (wf, hf) = (width as f32, height as f32);

        for tri in scene.geometry.triangles() {
            let clip = tri.map(|v| mvp * Vec3::from(v.position).extend(1.0));
            if clip.iter().any(|c| c.w <= scene.camera.znear) {
                continue;
            }

            let screen = clip.map(|c| {
                let ndc = c.xy() / c.w;
                ScreenVertex {
                    pos: Vec2::new((ndc.x * 0.5 + 0.5) * wf, (0.5 - ndc.y * 0.5) * hf),
                    inv_w: 1.0 / c.w,
                }
            });

            let area = edge(screen[0].pos, screen[1].pos, screen[2].pos);
            if area.abs() <= f32::EPSILON {
                continue;
            }
            // Pixel rows grow downward, so counter-clockwise triangles have
            // negative area here.
            let front_facing = area < 0.0;

            let mut normal = (normal_matrix * Vec3::from(tri[0].normal)).normalize_or_zero();
            if !front_facing {
                normal = -normal;
            }
            let color = to_rgb(scene.light.shade(scene.base_color, normal));

            let min = screen[0].pos.min(screen[1].pos).min(screen[2].pos);
            let max = screen[0].pos.max(screen[1].pos).max(screen[2].pos);
            if max.x < 0.0 || max.y < 0.0 || min.x >= wf || min.y >= hf {
                continue;
            }
            let x0 = min.x.floor().max(0.0) as u32;
            let y0 = min.y.floor().max(0.0) as u32;
            let x1 = (max.x.ceil() as u32).min(width - 1);
            let y1 = (max.y.ceil() as u32).min(height - 1);

            for y in y0..=y1 {
                for x in x0..=x1 {
                    let p = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
                    let b0 = edge(screen[1].pos, screen[2].pos, p) / area;
                    let b1 = edge(screen[2].pos, screen[0].pos, p) / area;
                    let b2 = edge(screen[0].pos, screen[1].pos, p) / area;
                    if b0 < 0.0 || b1 < 0.0 || b2 < 0.0 {
                        continue;
                    }

                    let inv_w = b0 * screen[0].inv_w + b1 * screen[1].inv_w + b2 * screen[2].inv_w;
                    if inv_w <= 0.0 {
                        continue;
                    }
                    let depth = 1.0 / inv_w;

                    let stored = out.depth.get_pixel(x, y).0[0];
                    if stored == 0.0 || depth < stored {
                        out.depth.put_pixel(x, y, Luma([depth]));
                        out.color.put_pixel(x, y, color);
                    }
                }
            }
        }

        Ok(out)
    }
}
