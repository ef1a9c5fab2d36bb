//! src/mean.rs
//!
//! Dataset mean image: accumulation, persistence and load-or-compute.
//!
//! The mean image is stored as a safetensors file holding a single F32 tensor named
//! `mean_img` of shape `[C, H, W]`, with the number of averaged images in the metadata.
//!
//! ```ignore
//! let mean = MeanImage::load_or_compute("data/mean.safetensors", &source)?;
//! let augmenter = ImageAugmenter::new(config, Some(Arc::new(mean)));
//! ```

use crate::dataset::DataSource;
use crate::error::AugmentError;
use anyhow::{bail, Context, Result};
use bytemuck::{cast_slice, pod_collect_to_vec};
use ndarray::{Array3, ArrayView3, Zip};
use safetensors::{
    serialize_to_file,
    tensor::{Dtype, TensorView},
    SafeTensors,
};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Instant;
use tracing::info;

/// Name of the tensor inside the artifact.
const TENSOR_NAME: &str = "mean_img";
/// Progress is logged after this many accumulated images.
const PROGRESS_INTERVAL: usize = 1000;

// ============================================================================
// MeanImage
// ============================================================================

/// Per-pixel, per-channel average of a dataset, shaped `[C, H, W]`.
#[derive(Debug, Clone, PartialEq)]
pub struct MeanImage {
    data: Array3<f32>,
}

impl MeanImage {
    pub fn new(data: Array3<f32>) -> Self {
        Self { data }
    }

    pub fn view(&self) -> ArrayView3<'_, f32> {
        self.data.view()
    }

    pub fn dims(&self) -> [usize; 3] {
        let (c, h, w) = self.data.dim();
        [c, h, w]
    }

    pub fn into_inner(self) -> Array3<f32> {
        self.data
    }

    /// Reads a mean image artifact.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path)
            .with_context(|| format!("Failed to read mean image: {}", path.display()))?;
        let tensors = SafeTensors::deserialize(&bytes)
            .with_context(|| format!("Failed to parse mean image: {}", path.display()))?;
        let view = tensors
            .tensor(TENSOR_NAME)
            .with_context(|| format!("No '{}' tensor in {}", TENSOR_NAME, path.display()))?;

        if view.dtype() != Dtype::F32 {
            bail!(
                "Mean image must be stored as F32 (found {:?}) in {}",
                view.dtype(),
                path.display()
            );
        }
        let dims = match view.shape() {
            &[c, h, w] => (c, h, w),
            other => bail!(
                "Mean image must be 3-dimensional [C, H, W] (found {:?}) in {}",
                other,
                path.display()
            ),
        };
        let values: Vec<f32> = pod_collect_to_vec(view.data());
        let data = Array3::from_shape_vec(dims, values)
            .with_context(|| format!("Corrupt mean image data in {}", path.display()))?;

        info!(path = %path.display(), shape = ?dims, "Loaded mean image");
        Ok(Self { data })
    }

    /// Writes the mean image, recording how many images it averages.
    pub fn save(&self, path: impl AsRef<Path>, image_count: usize) -> Result<()> {
        let path = path.as_ref();
        let values = self.data.as_standard_layout();
        let slice = values
            .as_slice()
            .context("Mean image is not contiguous after standard layout conversion")?;
        let view = TensorView::new(Dtype::F32, self.data.shape().to_vec(), cast_slice(slice))?;
        let metadata = Some(HashMap::from([(
            "image_count".to_string(),
            image_count.to_string(),
        )]));
        serialize_to_file([(TENSOR_NAME, view)], &metadata, path)
            .with_context(|| format!("Failed to write mean image: {}", path.display()))?;
        Ok(())
    }

    /// Loads the artifact at `path`, or computes it with one pass over `source` and saves
    /// it there when the file does not exist.
    pub fn load_or_compute<S>(path: impl AsRef<Path>, source: &S) -> Result<Self>
    where
        S: DataSource<Array3<f32>> + ?Sized,
    {
        let path = path.as_ref();
        if path.exists() {
            return Self::load(path);
        }
        info!(
            path = %path.display(),
            "Mean image not found; computing it over the dataset, this will take some time"
        );
        let (mean, count) = compute_mean_image(source.stream()?)?;
        mean.save(path, count)?;
        info!(path = %path.display(), images = count, "Saved mean image");
        Ok(mean)
    }
}

// ============================================================================
// MeanAccumulator
// ============================================================================

/// Running element-wise sum of same-shaped images.
///
/// Sums are kept in `f64` so a dataset of identical integer-valued images averages back to
/// exactly that image.
#[derive(Debug, Default)]
pub struct MeanAccumulator {
    sum: Option<Array3<f64>>,
    count: usize,
}

impl MeanAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Adds one image. The first image fixes the shape of all later ones.
    pub fn push(&mut self, image: ArrayView3<'_, f32>) -> Result<(), AugmentError> {
        match self.sum.as_mut() {
            None => self.sum = Some(image.mapv(f64::from)),
            Some(sum) => {
                if sum.dim() != image.dim() {
                    let (ec, eh, ew) = sum.dim();
                    let (fc, fh, fw) = image.dim();
                    return Err(AugmentError::ShapeMismatch {
                        expected: [ec, eh, ew],
                        found: [fc, fh, fw],
                    });
                }
                Zip::from(sum).and(&image).for_each(|s, &v| *s += f64::from(v));
            }
        }
        self.count += 1;
        Ok(())
    }

    /// Divides the sum by the number of images.
    pub fn finish(self) -> Result<MeanImage, AugmentError> {
        let sum = self.sum.ok_or(AugmentError::EmptyDataset)?;
        let count = self.count as f64;
        Ok(MeanImage::new(sum.mapv(|s| (s / count) as f32)))
    }
}

/// Streams every image once and returns the mean together with the image count.
///
/// An empty stream is an `EmptyDataset` error.
pub fn compute_mean_image<I>(images: I) -> Result<(MeanImage, usize)>
where
    I: IntoIterator<Item = Result<Array3<f32>>>,
{
    let start = Instant::now();
    let mut accumulator = MeanAccumulator::new();
    for image in images {
        let image = image.with_context(|| {
            format!(
                "Failed to read image {} while computing the mean image",
                accumulator.count() + 1
            )
        })?;
        accumulator.push(image.view())?;
        if accumulator.count() % PROGRESS_INTERVAL == 0 {
            info!(
                images = accumulator.count(),
                elapsed_secs = start.elapsed().as_secs(),
                "Mean image progress"
            );
        }
    }
    let count = accumulator.count();
    Ok((accumulator.finish()?, count))
}
