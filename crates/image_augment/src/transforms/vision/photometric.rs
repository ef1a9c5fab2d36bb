use crate::error::AugmentError;
use crate::mean::MeanImage;
use crate::params::AugmentConfig;
use crate::transforms::vision::augmentation::flip_horizontal;
use crate::transforms::vision::crop::CropWindow;
use anyhow::Result;
use ndarray::{Array3, ArrayView3, Axis};
use rand::Rng;
use std::sync::Arc;

// ============================================================================
// MeanPolicy
// ============================================================================

/// What is subtracted from each tensor before jitter.
#[derive(Debug, Clone)]
pub enum MeanPolicy {
    /// No mean is available: no subtraction and no contrast/illumination jitter.
    None,
    /// One scalar per tensor channel.
    PerChannel([f32; 3]),
    /// A dataset mean image, shaped like either the input or the target.
    FullImage(Arc<MeanImage>),
}

impl MeanPolicy {
    /// Per-channel means win over a mean image; without either nothing is subtracted.
    pub fn select(config: &AugmentConfig, mean: Option<Arc<MeanImage>>) -> Self {
        match (config.channel_means(), mean) {
            (Some(means), _) => MeanPolicy::PerChannel(means),
            (None, Some(mean)) => MeanPolicy::FullImage(mean),
            (None, None) => MeanPolicy::None,
        }
    }
}

// ============================================================================
// Normalizer
// ============================================================================

/// Tensor-domain stage: crop to the target shape, subtract the mean, jitter contrast and
/// illumination, mirror, and scale.
///
/// # Mathematical Operation:
/// ```text
/// out = mirror?(crop(input - mean) * contrast + illumination) * scale
/// contrast     ~ U[1 - max_random_contrast, 1 + max_random_contrast]
/// illumination ~ U[-max_random_illumination, max_random_illumination]
/// ```
///
/// A single-channel target skips everything but the final scale.
#[derive(Debug, Clone)]
pub struct Normalizer {
    config: Arc<AugmentConfig>,
    mean: MeanPolicy,
}

impl Normalizer {
    pub fn new(config: Arc<AugmentConfig>, mean: Option<Arc<MeanImage>>) -> Self {
        let mean = MeanPolicy::select(&config, mean);
        Self { config, mean }
    }

    pub fn mean_policy(&self) -> &MeanPolicy {
        &self.mean
    }

    /// Normalizes `data` into `out`, reallocating `out` only when its shape changes.
    ///
    /// Random draws happen in a fixed order: crop offsets (only when there is slack and
    /// `rand_crop` is set), contrast, illumination, mirror coin.
    pub fn apply<R: Rng>(
        &self,
        data: ArrayView3<'_, f32>,
        out: &mut Array3<f32>,
        rng: &mut R,
    ) -> Result<()> {
        let p = self.config.params();
        let target = self.config.target();
        let (channels, height, width) = data.dim();

        if channels != target.channels {
            return Err(AugmentError::ChannelMismatch {
                input: channels,
                target: target.channels,
            }
            .into());
        }

        if target.channels == 1 {
            resize_to(out, data.dim());
            out.assign(&data);
            scale_in_place(out, p.scale);
            return Ok(());
        }

        let window = CropWindow::place(&data, target.height, target.width, p.rand_crop, rng)?
            .with_offset(
                &data,
                p.crop_y_start.filter(|_| height != target.height),
                p.crop_x_start.filter(|_| width != target.width),
            )?;

        let contrast = 1.0 + symmetric(rng, p.max_random_contrast);
        let illumination = symmetric(rng, p.max_random_illumination);
        let flip = self.config.mirror_policy().should_flip(rng);

        resize_to(out, (channels, target.height, target.width));
        out.assign(&window.view(data));

        match &self.mean {
            MeanPolicy::None => {}
            MeanPolicy::PerChannel(means) => {
                for (c, &m) in means.iter().enumerate().take(channels) {
                    let mut plane = out.index_axis_mut(Axis(0), c);
                    plane -= m;
                }
                jitter(out, contrast, illumination);
            }
            MeanPolicy::FullImage(mean) => {
                let mean_dims = mean.dims();
                if mean_dims == [channels, height, width] {
                    *out -= &window.view(mean.view());
                } else if mean_dims == target.dims() {
                    *out -= &mean.view();
                } else {
                    return Err(AugmentError::MeanShapeMismatch {
                        mean: mean_dims,
                        input: [channels, height, width],
                        target: target.dims(),
                    }
                    .into());
                }
                jitter(out, contrast, illumination);
            }
        }

        if flip {
            flip_horizontal(out);
        }
        scale_in_place(out, p.scale);
        Ok(())
    }
}

fn resize_to(out: &mut Array3<f32>, dim: (usize, usize, usize)) {
    if out.dim() != dim {
        *out = Array3::zeros(dim);
    }
}

fn jitter(out: &mut Array3<f32>, contrast: f32, illumination: f32) {
    if contrast != 1.0 || illumination != 0.0 {
        out.mapv_inplace(|v| v * contrast + illumination);
    }
}

fn scale_in_place(out: &mut Array3<f32>, scale: f32) {
    if scale != 1.0 {
        out.mapv_inplace(|v| v * scale);
    }
}

fn symmetric<R: Rng>(rng: &mut R, max: f32) -> f32 {
    rng.random::<f32>() * max * 2.0 - max
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{AugmentParams, TargetShape};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn normalizer(params: AugmentParams, mean: Option<MeanImage>) -> Normalizer {
        let config = AugmentConfig::new(params).expect("valid test config");
        Normalizer::new(Arc::new(config), mean.map(Arc::new))
    }

    fn ramp(dim: (usize, usize, usize)) -> Array3<f32> {
        Array3::from_shape_fn(dim, |(c, y, x)| (c * 100 + y * 10 + x) as f32)
    }

    fn target(h: usize, w: usize) -> AugmentParams {
        AugmentParams::builder()
            .input_shape(TargetShape::new(3, h, w))
            .rand_crop(false)
            .build()
    }

    #[test]
    fn test_single_channel_only_scales() -> Result<()> {
        let norm = normalizer(
            AugmentParams::builder()
                .input_shape(TargetShape::new(1, 2, 2))
                .channel_means(50.0, 50.0, 50.0)
                .mirror(true)
                .max_random_contrast(0.5)
                .scale(0.5)
                .build(),
            None,
        );
        let data = ramp((1, 4, 5));
        let mut out = Array3::zeros((0, 0, 0));
        norm.apply(data.view(), &mut out, &mut StdRng::seed_from_u64(0))?;
        assert_eq!(out, data.mapv(|v| v * 0.5));
        Ok(())
    }

    #[test]
    fn test_single_channel_target_rejects_colour_input() {
        let norm = normalizer(
            AugmentParams::builder()
                .input_shape(TargetShape::new(1, 2, 2))
                .build(),
            None,
        );
        let mut out = Array3::zeros((0, 0, 0));
        let err = norm
            .apply(ramp((3, 4, 4)).view(), &mut out, &mut StdRng::seed_from_u64(0))
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AugmentError>(),
            Some(AugmentError::ChannelMismatch { input: 3, target: 1 })
        ));
    }

    #[test]
    fn test_centered_crop_without_mean() -> Result<()> {
        let norm = normalizer(
            AugmentParams {
                max_random_contrast: 0.9,
                max_random_illumination: 30.0,
                ..target(2, 2)
            },
            None,
        );
        let data = ramp((3, 5, 6));
        let mut out = Array3::zeros((0, 0, 0));
        norm.apply(data.view(), &mut out, &mut StdRng::seed_from_u64(9))?;

        // Offsets (3/2, 4/2); jitter ignored on the no-mean branch.
        assert_eq!(out.dim(), (3, 2, 2));
        assert_eq!(out[[0, 0, 0]], 12.0);
        assert_eq!(out[[2, 1, 1]], 223.0);
        Ok(())
    }

    #[test]
    fn test_fixed_offsets_override_centering() -> Result<()> {
        let norm = normalizer(
            AugmentParams::builder()
                .input_shape(TargetShape::new(3, 2, 2))
                .crop_start(0, 4)
                .build(),
            None,
        );
        let data = ramp((3, 5, 6));
        let mut out = Array3::zeros((0, 0, 0));
        norm.apply(data.view(), &mut out, &mut StdRng::seed_from_u64(1))?;
        assert_eq!(out[[0, 0, 0]], 4.0);
        assert_eq!(out[[0, 1, 1]], 15.0);
        Ok(())
    }

    #[test]
    fn test_per_channel_mean_subtraction() -> Result<()> {
        let norm = normalizer(
            AugmentParams {
                mean_r: 1.0,
                mean_g: 100.0,
                mean_b: 200.0,
                ..target(3, 3)
            },
            None,
        );
        assert!(matches!(norm.mean_policy(), MeanPolicy::PerChannel(_)));
        let data = ramp((3, 3, 3));
        let mut out = Array3::zeros((0, 0, 0));
        norm.apply(data.view(), &mut out, &mut StdRng::seed_from_u64(2))?;
        assert_eq!(out[[0, 0, 0]], -1.0);
        assert_eq!(out[[1, 2, 2]], 22.0);
        assert_eq!(out[[2, 1, 0]], 10.0);
        Ok(())
    }

    #[test]
    fn test_input_shaped_mean_is_cropped_with_the_data() -> Result<()> {
        let data = ramp((3, 4, 4));
        let mean = MeanImage::new(data.clone());
        let norm = normalizer(target(2, 2), Some(mean));
        let mut out = Array3::ones((1, 1, 1));
        norm.apply(data.view(), &mut out, &mut StdRng::seed_from_u64(3))?;
        assert_eq!(out, Array3::<f32>::zeros((3, 2, 2)));
        Ok(())
    }

    #[test]
    fn test_target_shaped_mean_is_subtracted_after_crop() -> Result<()> {
        let data = ramp((3, 4, 4));
        let mean = MeanImage::new(Array3::from_elem((3, 2, 2), 5.0));
        let norm = normalizer(target(2, 2), Some(mean));
        let mut out = Array3::zeros((0, 0, 0));
        norm.apply(data.view(), &mut out, &mut StdRng::seed_from_u64(4))?;
        assert_eq!(out[[0, 0, 0]], 11.0 - 5.0);
        assert_eq!(out[[1, 1, 1]], 122.0 - 5.0);
        Ok(())
    }

    #[test]
    fn test_mismatched_mean_shape_is_rejected() {
        let mean = MeanImage::new(Array3::zeros((3, 7, 7)));
        let norm = normalizer(target(2, 2), Some(mean));
        let mut out = Array3::zeros((0, 0, 0));
        let err = norm
            .apply(ramp((3, 4, 4)).view(), &mut out, &mut StdRng::seed_from_u64(0))
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AugmentError>(),
            Some(AugmentError::MeanShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_jitter_applies_with_mean() -> Result<()> {
        let norm = normalizer(
            AugmentParams {
                mean_r: 1.0,
                max_random_contrast: 0.5,
                max_random_illumination: 10.0,
                ..target(2, 2)
            },
            None,
        );
        let data = Array3::from_elem((3, 2, 2), 11.0);
        let mut out = Array3::zeros((0, 0, 0));
        norm.apply(data.view(), &mut out, &mut StdRng::seed_from_u64(6))?;

        // Channel 1 and 2 see the same affine jitter of 11.0.
        let v = out[[1, 0, 0]];
        assert!(out.index_axis(Axis(0), 2).iter().all(|&x| x == v));
        assert!((11.0 * 0.5 - 10.0..=11.0 * 1.5 + 10.0).contains(&v));
        Ok(())
    }

    #[test]
    fn test_always_mirror_flips_columns() -> Result<()> {
        let data = ramp((3, 2, 3));
        let plain = normalizer(target(2, 3), None);
        let mirrored = normalizer(
            AugmentParams {
                mirror: true,
                ..target(2, 3)
            },
            None,
        );
        let (mut a, mut b) = (Array3::zeros((0, 0, 0)), Array3::zeros((0, 0, 0)));
        plain.apply(data.view(), &mut a, &mut StdRng::seed_from_u64(1))?;
        mirrored.apply(data.view(), &mut b, &mut StdRng::seed_from_u64(1))?;
        flip_horizontal(&mut a);
        assert_eq!(a, b);
        Ok(())
    }

    #[test]
    fn test_channel_mismatch_and_undersized_input() {
        let norm = normalizer(target(4, 4), None);
        let mut out = Array3::zeros((0, 0, 0));
        let mut rng = StdRng::seed_from_u64(0);

        let err = norm
            .apply(ramp((4, 8, 8)).view(), &mut out, &mut rng)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AugmentError>(),
            Some(AugmentError::ChannelMismatch { input: 4, target: 3 })
        ));

        let err = norm
            .apply(ramp((3, 3, 8)).view(), &mut out, &mut rng)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AugmentError>(),
            Some(AugmentError::Undersized { .. })
        ));
    }
}
