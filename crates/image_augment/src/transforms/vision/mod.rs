//! src/transforms/vision/mod.rs
//!
//! Image augmentation stages.
//!
//! # Module Organization
//!
//! ```text
//! transforms/vision/
//! ├── geometric.rs     → Affine transform sampling, warp onto a canvas, crop selection
//! ├── crop.rs          → Crop windows shared by pixel grids and tensors
//! ├── photometric.rs   → Mean subtraction, contrast/illumination jitter, scaling
//! ├── augmentation.rs  → Mirror policy and horizontal flip
//! ├── conversion.rs    → Pixel grid ↔ tensor conversion with channel ordering
//! └── io.rs            → Image decoding and the decoded image source
//! ```
//!
//! The stages run in that order inside [`crate::augmenter::ImageAugmenter`]: the
//! geometric stage produces a target-sized pixel grid, which is converted to a tensor and
//! handed to the photometric stage.

pub mod augmentation;
pub mod conversion;
pub mod crop;
pub mod geometric;
pub mod io;
pub mod photometric;

pub use augmentation::{flip_horizontal, MirrorPolicy};
pub use conversion::{image_to_tensor, tensor_to_image, ChannelOrder};
pub use crop::{CropWindow, Croppable};
pub use geometric::{select_crop, warp_and_crop, AffineTransform, GeometricSample, WarpPlan};
pub use io::{decode_image, decoded_image_source, load_image, DecodedImageSource, LoadImage, ToTensor};
pub use photometric::{MeanPolicy, Normalizer};
