//! src/error.rs
//!
//! Failure taxonomy of the augmentation engine.
//!
//! Operations return `anyhow::Result`; the variants below are raised through it so a
//! driver can decide whether to skip an image or abort:
//!
//! ```ignore
//! match augmenter.process(ImageInput::Encoded(&bytes), &mut out, &mut rng) {
//!     Err(e) if matches!(e.downcast_ref(), Some(AugmentError::Undersized { .. })) => skip(),
//!     other => other?,
//! }
//! ```

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AugmentError {
    /// A key/value configuration pair could not be parsed.
    #[error("Invalid value {value:?} for parameter `{key}`: {reason}")]
    InvalidParam {
        key: String,
        value: String,
        reason: String,
    },

    /// Settings that parse but contradict each other.
    #[error("Invalid augmentation config: {0}")]
    Config(String),

    #[error("Channel mismatch: input has {input} channels but the target shape expects {target}")]
    ChannelMismatch { input: usize, target: usize },

    /// Input (or warped canvas) smaller than the region that must be cut from it.
    #[error(
        "Input of {height}x{width} is smaller than the requested {need_height}x{need_width} region"
    )]
    Undersized {
        height: usize,
        width: usize,
        need_height: usize,
        need_width: usize,
    },

    /// The warped canvas would exceed the largest side the engine renders.
    #[error("Warped canvas of {width}x{height} exceeds the maximum side of {max} pixels")]
    CanvasTooLarge { width: u32, height: u32, max: u32 },

    /// A fixed crop offset places the window past the input edge.
    #[error("Crop window at ({y}, {x}) of size {height}x{width} exceeds input of {src_height}x{src_width}")]
    CropOutOfBounds {
        y: usize,
        x: usize,
        height: usize,
        width: usize,
        src_height: usize,
        src_width: usize,
    },

    #[error("Mean image shape {mean:?} matches neither the input {input:?} nor the target {target:?}")]
    MeanShapeMismatch {
        mean: [usize; 3],
        input: [usize; 3],
        target: [usize; 3],
    },

    /// Dataset images of differing shape fed to the mean accumulator.
    #[error("Image shape {found:?} differs from the accumulated shape {expected:?}")]
    ShapeMismatch {
        expected: [usize; 3],
        found: [usize; 3],
    },

    #[error("Cannot compute a mean image: the dataset yielded no images")]
    EmptyDataset,
}

impl AugmentError {
    pub(crate) fn invalid_param(
        key: impl Into<String>,
        value: impl Into<String>,
        reason: impl ToString,
    ) -> Self {
        Self::InvalidParam {
            key: key.into(),
            value: value.into(),
            reason: reason.to_string(),
        }
    }
}
