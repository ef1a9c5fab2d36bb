//! Randomized geometric and photometric image augmentation producing fixed-shape tensors.
//!
//! Each image goes through an optional affine warp with a random or centered crop, then
//! a normalization stage (crop to target, mean subtraction, contrast and illumination
//! jitter, mirroring, scaling). A dataset mean image can be computed once and persisted.

pub mod augmenter;
pub mod dataset;
pub mod error;
pub mod mean;
pub mod params;
pub mod readers;
pub mod rng;
pub mod transforms;

pub use augmenter::{prepare_mean, ImageAugmenter, ImageInput};
pub use dataset::{DataSource, TransformedSource};
pub use error::AugmentError;
pub use mean::{compute_mean_image, MeanAccumulator, MeanImage};
pub use params::{AugmentConfig, AugmentParams, CropPolicy, RotationPolicy, TargetShape};
pub use rng::{worker_rng, worker_seed};
pub use transforms::vision::{ChannelOrder, MirrorPolicy};
