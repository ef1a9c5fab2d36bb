//! src/augmenter.rs
//!
//! The per-image augmentation engine.
//!
//! An [`ImageAugmenter`] owns a validated configuration, the selected mean policy and the
//! scratch buffers reused across calls. Every call takes `&mut self`, so one engine serves
//! one thread at a time; parallel pipelines build one engine per worker, each driven by
//! its own seeded generator (see [`crate::rng::worker_rng`]).
//!
//! ```ignore
//! let config = Arc::new(AugmentConfig::new(params)?);
//! let mean = prepare_mean(&config, &decoded_image_source("./train", 224, 224, ChannelOrder::Rgb))?;
//! let mut augmenter = ImageAugmenter::new(config, mean);
//!
//! let mut rng = worker_rng(42, epoch, worker_id);
//! let mut out = Array3::zeros((0, 0, 0));
//! augmenter.process(ImageInput::Encoded(&jpeg_bytes), &mut out, &mut rng)?;
//! ```

use crate::dataset::DataSource;
use crate::error::AugmentError;
use crate::mean::MeanImage;
use crate::params::AugmentConfig;
use crate::transforms::vision::conversion::{image_to_tensor, tensor_to_image};
use crate::transforms::vision::geometric;
use crate::transforms::vision::io::decode_image;
use crate::transforms::vision::photometric::{MeanPolicy, Normalizer};
use anyhow::Result;
use image::RgbImage;
use ndarray::{Array3, ArrayView3};
use rand::Rng;
use std::borrow::Cow;
use std::sync::Arc;
use tracing::{debug, info};

/// A pixel input to [`ImageAugmenter::process`].
#[derive(Debug, Clone, Copy)]
pub enum ImageInput<'a> {
    /// An encoded buffer (JPEG, PNG, ...) decoded by the engine.
    Encoded(&'a [u8]),
    /// An already decoded RGB pixel grid.
    Decoded(&'a RgbImage),
}

/// Loads or computes the dataset mean image when `mean_img` is configured.
///
/// `source` is streamed only when the artifact does not exist yet.
pub fn prepare_mean<S>(config: &AugmentConfig, source: &S) -> Result<Option<Arc<MeanImage>>>
where
    S: DataSource<Array3<f32>> + ?Sized,
{
    match &config.params().mean_img {
        Some(path) => Ok(Some(Arc::new(MeanImage::load_or_compute(path, source)?))),
        None => Ok(None),
    }
}

pub struct ImageAugmenter {
    config: Arc<AugmentConfig>,
    normalizer: Normalizer,
    canvas: RgbImage,
    pixels: RgbImage,
    staging: Array3<f32>,
}

impl ImageAugmenter {
    pub fn new(config: Arc<AugmentConfig>, mean: Option<Arc<MeanImage>>) -> Self {
        let normalizer = Normalizer::new(Arc::clone(&config), mean);
        let mean_kind = match normalizer.mean_policy() {
            MeanPolicy::None => "none",
            MeanPolicy::PerChannel(_) => "per-channel",
            MeanPolicy::FullImage(_) => "full-image",
        };
        info!(
            target_shape = ?config.target().dims(),
            geometric = config.needs_geometric(),
            mean = mean_kind,
            "Created image augmenter"
        );
        Self {
            config,
            normalizer,
            canvas: RgbImage::new(0, 0),
            pixels: RgbImage::new(0, 0),
            staging: Array3::zeros((0, 0, 0)),
        }
    }

    pub fn config(&self) -> &AugmentConfig {
        &self.config
    }

    /// Augments one image into `out`, which is resized to the output shape as needed.
    ///
    /// The geometric stage runs first (when configured) and yields a target-sized pixel
    /// grid; the normalization stage then produces the final tensor.
    pub fn process<R: Rng>(
        &mut self,
        input: ImageInput<'_>,
        out: &mut Array3<f32>,
        rng: &mut R,
    ) -> Result<()> {
        let image = match input {
            ImageInput::Encoded(bytes) => Cow::Owned(decode_image(bytes)?),
            ImageInput::Decoded(image) => Cow::Borrowed(image),
        };
        let order = self.config.params().channel_order;

        if self.runs_geometric() {
            let cropped = self.warp_and_crop(&image, rng)?;
            image_to_tensor(&cropped, order, &mut self.staging);
        } else {
            image_to_tensor(&image, order, &mut self.staging);
        }
        self.normalizer.apply(self.staging.view(), out, rng)
    }

    /// Augments an existing `[C, H, W]` tensor in the configured channel order.
    ///
    /// When the geometric stage runs the tensor is rounded to 8-bit pixels for the warp.
    pub fn process_tensor<R: Rng>(
        &mut self,
        data: ArrayView3<'_, f32>,
        out: &mut Array3<f32>,
        rng: &mut R,
    ) -> Result<()> {
        if !self.runs_geometric() {
            return self.normalizer.apply(data, out, rng);
        }

        let (channels, _, _) = data.dim();
        let target = self.config.target();
        if channels != target.channels {
            return Err(AugmentError::ChannelMismatch {
                input: channels,
                target: target.channels,
            }
            .into());
        }
        let order = self.config.params().channel_order;
        tensor_to_image(data, order, &mut self.pixels)?;
        let cropped = geometric::warp_and_crop(&self.config, &self.pixels, &mut self.canvas, rng)?;
        image_to_tensor(&cropped, order, &mut self.staging);
        self.normalizer.apply(self.staging.view(), out, rng)
    }

    /// Runs only the geometric stage: warp with a freshly sampled transform, then crop
    /// (and resize) to the target spatial shape.
    pub fn warp_and_crop<R: Rng>(&mut self, image: &RgbImage, rng: &mut R) -> Result<RgbImage> {
        debug!(
            width = image.width(),
            height = image.height(),
            "Warping image"
        );
        geometric::warp_and_crop(&self.config, image, &mut self.canvas, rng)
    }

    fn runs_geometric(&self) -> bool {
        // A single-channel target passes the input through unchanged apart from scaling.
        self.config.needs_geometric() && self.config.target().channels != 1
    }
}
