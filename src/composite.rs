//! Depth-masked compositing of a render over the background.
//!
//! Alpha is binary: a pixel belongs to the mesh exactly when its depth is
//! positive. Blending runs in `f32` and is truncated back to 8 bits, so fully
//! opaque and fully transparent pixels come through unchanged.

use image::RgbImage;

use crate::error::RenderError;
use crate::render::{DepthImage, RenderOutput};

/// `1.0` where the mesh covers the pixel, else `0.0`.
pub fn alpha(depth: f32) -> f32 {
    if depth > 0.0 { 1.0 } else { 0.0 }
}

/// Per-pixel alpha for a depth buffer, row-major.
pub fn alpha_mask(depth: &DepthImage) -> Vec<f32> {
    depth.pixels().map(|p| alpha(p.0[0])).collect()
}

/// Blends one channel: `src * a + dst * (1 - a)`, truncated to `u8`.
pub fn blend_channel(src: u8, dst: u8, a: f32) -> u8 {
    let value = f32::from(src) * a + f32::from(dst) * (1.0 - a);
    value.clamp(0.0, 255.0) as u8
}

/// Composites `rendered` over `background` using `mask`.
///
/// All three must share the background's dimensions.
pub fn composite(
    rendered: &RgbImage,
    mask: &[f32],
    background: &RgbImage,
) -> Result<RgbImage, RenderError> {
    let expected = background.dimensions();
    if rendered.dimensions() != expected {
        return Err(RenderError::SizeMismatch {
            expected,
            actual: rendered.dimensions(),
        });
    }
    if mask.len() != (expected.0 as usize) * (expected.1 as usize) {
        return Err(RenderError::SizeMismatch {
            expected,
            actual: (mask.len() as u32, 1),
        });
    }

    let mut out = RgbImage::new(expected.0, expected.1);
    for (((o, s), d), &a) in out
        .pixels_mut()
        .zip(rendered.pixels())
        .zip(background.pixels())
        .zip(mask)
    {
        for c in 0..3 {
            o.0[c] = blend_channel(s.0[c], d.0[c], a);
        }
    }
    Ok(out)
}

/// Derives the mask from `output.depth` and composites in one step.
pub fn composite_output(
    output: &RenderOutput,
    background: &RgbImage,
) -> Result<(Vec<f32>, RgbImage), RenderError> {
    if output.depth.dimensions() != background.dimensions() {
        return Err(RenderError::SizeMismatch {
            expected: background.dimensions(),
            actual: output.depth.dimensions(),
        });
    }
    let mask = alpha_mask(&output.depth);
    let image = composite(&output.color, &mask, background)?;
    Ok((mask, image))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb};

    fn checker(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 40) as u8, (y * 60) as u8, ((x + y) * 17) as u8])
        })
    }

    #[test]
    fn mask_is_binary_and_follows_depth_sign() {
        let depth = DepthImage::from_raw(5, 1, vec![0.0, 1e-6, 4.5, -1.0, 0.0]).unwrap();
        assert_eq!(alpha_mask(&depth), vec![0.0, 1.0, 1.0, 0.0, 0.0]);

        for d in [-3.0_f32, -0.0, 0.0, 1e-30, 0.5, 1e9] {
            let a = alpha(d);
            assert!(a == 0.0 || a == 1.0);
            assert_eq!(a == 1.0, d > 0.0);
        }
    }

    #[test]
    fn opaque_pixels_take_render_and_clear_pixels_keep_background() {
        let rendered = RgbImage::from_pixel(4, 3, Rgb([200, 17, 99]));
        let background = checker(4, 3);
        let depth = DepthImage::from_fn(4, 3, |x, _| Luma([if x < 2 { 3.0 } else { 0.0 }]));

        let (mask, out) = composite_output(
            &RenderOutput {
                color: rendered.clone(),
                depth,
            },
            &background,
        )
        .unwrap();

        assert_eq!(mask.len(), 12);
        for (x, y, px) in out.enumerate_pixels() {
            if x < 2 {
                assert_eq!(px, rendered.get_pixel(x, y));
            } else {
                assert_eq!(px, background.get_pixel(x, y));
            }
        }
    }

    #[test]
    fn fractional_alpha_truncates() {
        assert_eq!(blend_channel(255, 0, 0.5), 127);
        assert_eq!(blend_channel(10, 20, 1.0), 10);
        assert_eq!(blend_channel(10, 20, 0.0), 20);
    }

    #[test]
    fn mismatched_sizes_are_rejected() {
        let rendered = RgbImage::new(4, 4);
        let background = RgbImage::new(4, 3);
        let err = composite(&rendered, &[0.0; 12], &background).unwrap_err();
        assert!(matches!(err, RenderError::SizeMismatch { expected: (4, 3), .. }));

        let err = composite(&background, &[0.0; 5], &background).unwrap_err();
        assert!(matches!(err, RenderError::SizeMismatch { .. }));
    }
}
