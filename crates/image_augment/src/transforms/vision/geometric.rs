//! Geometric distortion: affine transform construction and the warp & crop stage.
//!
//! Every call draws a fresh `GeometricSample` (shear, rotation, scale, aspect), turns it
//! into a centered `WarpPlan`, warps the source onto a canvas of the planned size and cuts
//! the target region out of it.
//!
//! ```text
//!  source ──warp──▶ canvas (scale · source, clamped) ──crop──▶ region ──resize──▶ target
//! ```

use crate::error::AugmentError;
use crate::params::{AugmentConfig, CropPolicy, RotationPolicy};
use crate::transforms::vision::crop::CropWindow;
use anyhow::{anyhow, Result};
use image::{
    imageops::{self, FilterType},
    Rgb, RgbImage,
};
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};
use rand::Rng;

// ============================================================================
// AffineTransform
// ============================================================================

/// A 2x3 matrix mapping source pixel coordinates to destination coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineTransform {
    pub matrix: [[f32; 3]; 2],
}

impl AffineTransform {
    pub fn identity() -> Self {
        Self {
            matrix: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
        }
    }

    pub fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        let [[a, b, c], [d, e, f]] = self.matrix;
        (a * x + b * y + c, d * x + e * y + f)
    }

    /// Determinant of the linear part; zero means the transform collapses the image.
    pub fn determinant(&self) -> f32 {
        let [[a, b, _], [d, e, _]] = self.matrix;
        a * e - b * d
    }

    fn to_projection(self) -> Option<Projection> {
        let [[a, b, c], [d, e, f]] = self.matrix;
        Projection::from_matrix([a, b, c, d, e, f, 0.0, 0.0, 1.0])
    }
}

// ============================================================================
// GeometricSample
// ============================================================================

/// The random parameters of one geometric distortion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeometricSample {
    pub shear: f32,
    /// Degrees.
    pub angle: i32,
    pub scale: f32,
    /// Width-to-height stretch, around 1.
    pub ratio: f32,
}

impl GeometricSample {
    /// Draws shear, rotation, scale and aspect ratio, in that order.
    pub fn draw<R: Rng>(config: &AugmentConfig, rng: &mut R) -> Self {
        let p = config.params();
        let shear = symmetric(rng, p.max_shear_ratio);
        let angle = match config.rotation_policy() {
            RotationPolicy::Fixed(angle) => *angle,
            RotationPolicy::List(angles) if !angles.is_empty() => {
                angles[rng.random_range(0..angles.len())]
            }
            RotationPolicy::List(_) => 0,
            RotationPolicy::Range(max) => rng.random_range(-*max..=*max),
        };
        let scale =
            rng.random::<f32>() * (p.max_random_scale - p.min_random_scale) + p.min_random_scale;
        let ratio = 1.0 + symmetric(rng, p.max_aspect_ratio);
        Self {
            shear,
            angle,
            scale,
            ratio,
        }
    }
}

/// Uniform in `[-max, max]`.
fn symmetric<R: Rng>(rng: &mut R, max: f32) -> f32 {
    rng.random::<f32>() * max * 2.0 - max
}

/// Largest canvas side, in pixels, that a warp renders.
pub const MAX_CANVAS_SIDE: u32 = 1 << 16;

// ============================================================================
// WarpPlan
// ============================================================================

/// An affine transform together with the canvas it renders into.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WarpPlan {
    pub transform: AffineTransform,
    pub width: u32,
    pub height: u32,
}

impl WarpPlan {
    /// Composes shear, rotation and anisotropic scaling, and translates so the source
    /// center lands on the canvas center.
    ///
    /// Each canvas side is `scale * source side`, clamped to `[min_img_size, max_img_size]`
    /// and truncated to whole pixels. The transform is non-degenerate whenever
    /// `sample.scale > 0`; callers are expected to guarantee that.
    pub fn build(
        sample: &GeometricSample,
        src_width: u32,
        src_height: u32,
        min_img_size: f32,
        max_img_size: f32,
    ) -> Self {
        let radians = (sample.angle as f32).to_radians();
        let (a, b) = (radians.cos(), radians.sin());
        let hs = 2.0 * sample.scale / (1.0 + sample.ratio);
        let ws = sample.ratio * hs;
        let s = sample.shear;

        let (src_w, src_h) = (src_width as f32, src_height as f32);
        let new_width = (sample.scale * src_w).min(max_img_size).max(min_img_size);
        let new_height = (sample.scale * src_h).min(max_img_size).max(min_img_size);

        let m00 = hs * a - s * b * ws;
        let m01 = hs * b + s * a * ws;
        let m10 = -b * ws;
        let m11 = a * ws;
        let mapped_w = m00 * src_w + m01 * src_h;
        let mapped_h = m10 * src_w + m11 * src_h;

        Self {
            transform: AffineTransform {
                matrix: [
                    [m00, m01, (new_width - mapped_w) / 2.0],
                    [m10, m11, (new_height - mapped_h) / 2.0],
                ],
            },
            width: (new_width as u32).max(1),
            height: (new_height as u32).max(1),
        }
    }

    /// Renders `src` into `canvas` with bilinear sampling, padding with `fill_value`.
    ///
    /// `canvas` is reallocated only when its size differs from the plan.
    pub fn warp_into(&self, src: &RgbImage, fill_value: u8, canvas: &mut RgbImage) -> Result<()> {
        let projection = self
            .transform
            .to_projection()
            .ok_or_else(|| anyhow!("Degenerate affine transform: {:?}", self.transform))?;
        if self.width > MAX_CANVAS_SIDE || self.height > MAX_CANVAS_SIDE {
            return Err(AugmentError::CanvasTooLarge {
                width: self.width,
                height: self.height,
                max: MAX_CANVAS_SIDE,
            }
            .into());
        }
        if canvas.dimensions() != (self.width, self.height) {
            *canvas = RgbImage::new(self.width, self.height);
        }
        warp_into(
            src,
            &projection,
            Interpolation::Bilinear,
            Rgb([fill_value; 3]),
            canvas,
        );
        Ok(())
    }
}

// ============================================================================
// Warp & crop stage
// ============================================================================

/// Picks the crop region of the warped canvas.
///
/// - `RandomSize { min, max }`: a square of side uniform in `[min, max]`; the canvas must
///   be at least `max` on both sides.
/// - `ToTarget`: exactly the target spatial shape.
///
/// The offset is random when `rand_crop` is set, centered otherwise.
pub fn select_crop<R: Rng>(
    config: &AugmentConfig,
    canvas: &RgbImage,
    rng: &mut R,
) -> Result<CropWindow, AugmentError> {
    let random = config.params().rand_crop;
    match config.crop_policy() {
        CropPolicy::RandomSize { min, max } => {
            let (width, height) = canvas.dimensions();
            if width < max || height < max {
                return Err(AugmentError::Undersized {
                    height: height as usize,
                    width: width as usize,
                    need_height: max as usize,
                    need_width: max as usize,
                });
            }
            let side = rng.random_range(min..=max) as usize;
            CropWindow::place(canvas, side, side, random, rng)
        }
        CropPolicy::ToTarget => {
            let target = config.target();
            CropWindow::place(canvas, target.height, target.width, random, rng)
        }
    }
}

/// Warps `src` with a freshly sampled transform and returns the target-sized region.
///
/// `canvas` is scratch space reused across calls.
pub fn warp_and_crop<R: Rng>(
    config: &AugmentConfig,
    src: &RgbImage,
    canvas: &mut RgbImage,
    rng: &mut R,
) -> Result<RgbImage> {
    let p = config.params();
    let sample = GeometricSample::draw(config, rng);
    let plan = WarpPlan::build(
        &sample,
        src.width(),
        src.height(),
        p.min_img_size,
        p.max_img_size,
    );
    plan.warp_into(src, p.fill_value, canvas)?;

    let window = select_crop(config, canvas, rng)?;
    let region = window.crop_image(canvas);
    let target = config.target();
    let (target_w, target_h) = (target.width as u32, target.height as u32);
    if region.dimensions() == (target_w, target_h) {
        Ok(region)
    } else {
        Ok(imageops::resize(
            &region,
            target_w,
            target_h,
            FilterType::Triangle,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{AugmentParams, TargetShape};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn config(params: AugmentParams) -> AugmentConfig {
        AugmentConfig::new(params).expect("valid test config")
    }

    fn neutral_sample() -> GeometricSample {
        GeometricSample {
            shear: 0.0,
            angle: 0,
            scale: 1.0,
            ratio: 1.0,
        }
    }

    #[test]
    fn test_neutral_sample_builds_identity() {
        let plan = WarpPlan::build(&neutral_sample(), 40, 30, 0.0, 1e10);
        assert_eq!(plan.transform, AffineTransform::identity());
        assert_eq!((plan.width, plan.height), (40, 30));
    }

    #[test]
    fn test_source_center_maps_to_canvas_center() {
        let sample = GeometricSample {
            shear: 0.15,
            angle: 33,
            scale: 1.4,
            ratio: 0.8,
        };
        let plan = WarpPlan::build(&sample, 64, 48, 0.0, 1e10);
        let (cx, cy) = plan.transform.apply(32.0, 24.0);
        assert!((cx - 64.0 * 1.4 / 2.0).abs() < 1e-3, "cx = {cx}");
        assert!((cy - 48.0 * 1.4 / 2.0).abs() < 1e-3, "cy = {cy}");
    }

    #[test]
    fn test_transform_is_non_degenerate_for_positive_scale() {
        for &(scale, ratio, shear, angle) in &[(0.5, 1.2, 0.3, 90), (2.0, 0.7, -0.4, -45)] {
            let sample = GeometricSample {
                shear,
                angle,
                scale,
                ratio,
            };
            let plan = WarpPlan::build(&sample, 10, 10, 0.0, 1e10);
            let hs = 2.0 * scale / (1.0 + ratio);
            let det = plan.transform.determinant();
            assert!((det - hs * ratio * hs).abs() < 1e-4);
            assert!(det.abs() > 0.0);
        }
    }

    #[test]
    fn test_canvas_size_is_clamped() {
        let sample = GeometricSample {
            scale: 3.0,
            ..neutral_sample()
        };
        let plan = WarpPlan::build(&sample, 20, 10, 40.0, 50.0);
        assert_eq!((plan.width, plan.height), (50, 40));
    }

    #[test]
    fn test_oversized_canvas_is_rejected_before_allocation() {
        let plan = WarpPlan::build(&neutral_sample(), 10, 10, 1e12, 1e12);
        assert_eq!((plan.width, plan.height), (u32::MAX, u32::MAX));

        let src = RgbImage::new(10, 10);
        let mut canvas = RgbImage::new(1, 1);
        let err = plan.warp_into(&src, 0, &mut canvas).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AugmentError>(),
            Some(AugmentError::CanvasTooLarge { .. })
        ));
        assert_eq!(canvas.dimensions(), (1, 1));
    }

    #[test]
    fn test_draw_respects_rotation_policy() {
        let mut rng = StdRng::seed_from_u64(3);
        let listed = config(AugmentParams::builder().rotate_list(vec![0, 90, 270]).build());
        let ranged = config(AugmentParams::builder().max_rotate_angle(15).build());
        let fixed = config(AugmentParams::builder().rotate(12).build());
        for _ in 0..100 {
            assert!([0, 90, 270].contains(&GeometricSample::draw(&listed, &mut rng).angle));
            assert!((-15..=15).contains(&GeometricSample::draw(&ranged, &mut rng).angle));
            assert_eq!(GeometricSample::draw(&fixed, &mut rng).angle, 12);
        }
    }

    #[test]
    fn test_draw_stays_within_ranges() {
        let cfg = config(
            AugmentParams::builder()
                .max_shear_ratio(0.2)
                .random_scale(0.8, 1.3)
                .max_aspect_ratio(0.25)
                .build(),
        );
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..200 {
            let s = GeometricSample::draw(&cfg, &mut rng);
            assert!((-0.2..=0.2).contains(&s.shear));
            assert!((0.8..=1.3).contains(&s.scale));
            assert!((0.75..=1.25).contains(&s.ratio));
        }
    }

    #[test]
    fn test_warp_fills_outside_with_fill_value() -> Result<()> {
        let src = RgbImage::from_pixel(10, 10, Rgb([0, 0, 0]));
        let mut sample = neutral_sample();
        sample.angle = 45;
        let plan = WarpPlan::build(&sample, 10, 10, 0.0, 1e10);
        let mut canvas = RgbImage::new(1, 1);
        plan.warp_into(&src, 200, &mut canvas)?;
        assert_eq!(canvas.dimensions(), (10, 10));
        assert_eq!(canvas.get_pixel(0, 0), &Rgb([200, 200, 200]));
        assert_eq!(canvas.get_pixel(5, 5), &Rgb([0, 0, 0]));
        Ok(())
    }

    #[test]
    fn test_fixed_crop_size_extracts_exact_square() -> Result<()> {
        let cfg = config(
            AugmentParams::builder()
                .input_shape(TargetShape::new(3, 8, 8))
                .crop_size_range(12, 12)
                .max_rotate_angle(20)
                .build(),
        );
        let canvas = RgbImage::new(30, 20);
        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let window = select_crop(&cfg, &canvas, &mut rng)?;
            assert_eq!((window.height, window.width), (12, 12));
        }
        Ok(())
    }

    #[test]
    fn test_warp_and_crop_produces_target_shape() -> Result<()> {
        let cfg = config(
            AugmentParams::builder()
                .input_shape(TargetShape::new(3, 16, 12))
                .max_rotate_angle(30)
                .max_shear_ratio(0.1)
                .random_scale(0.9, 1.1)
                .build(),
        );
        let src = RgbImage::from_pixel(40, 40, Rgb([10, 20, 30]));
        let mut canvas = RgbImage::new(1, 1);
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..10 {
            let out = warp_and_crop(&cfg, &src, &mut canvas, &mut rng)?;
            assert_eq!(out.dimensions(), (12, 16));
        }

        let resized = config(
            AugmentParams::builder()
                .input_shape(TargetShape::new(3, 16, 12))
                .crop_size_range(20, 30)
                .build(),
        );
        let out = warp_and_crop(&resized, &src, &mut canvas, &mut rng)?;
        assert_eq!(out.dimensions(), (12, 16));
        Ok(())
    }

    #[test]
    fn test_canvas_smaller_than_max_crop_is_rejected() {
        let cfg = config(
            AugmentParams::builder()
                .input_shape(TargetShape::new(3, 8, 8))
                .crop_size_range(10, 40)
                .build(),
        );
        let src = RgbImage::new(32, 32);
        let mut canvas = RgbImage::new(1, 1);
        let mut rng = StdRng::seed_from_u64(0);
        let err = warp_and_crop(&cfg, &src, &mut canvas, &mut rng).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AugmentError>(),
            Some(AugmentError::Undersized { need_height: 40, .. })
        ));
    }
}
