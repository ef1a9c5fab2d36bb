//! src/params.rs
//!
//! Configuration for the augmentation engine.
//!
//! `AugmentParams` is the raw parameter set: plain data, deserializable from JSON and
//! parseable from string key/value pairs. `AugmentConfig` validates it once and derives
//! the policies the per-image path branches on, so no raw field is re-inspected per call.
//!
//! Example:
//! ```ignore
//! let params = AugmentParams::builder()
//!     .input_shape(TargetShape::new(3, 224, 224))
//!     .max_rotate_angle(10)
//!     .crop_size_range(200, 256)
//!     .rand_mirror(true)
//!     .build();
//! let config = Arc::new(AugmentConfig::new(params)?);
//! ```
//!
//! From key/value pairs (unrecognized keys are handed back):
//! ```ignore
//! let (params, rest) = AugmentParams::from_kwargs([
//!     ("rand_crop", "1"),
//!     ("rotate_list", "0,90,180,270"),
//!     ("batch_size", "128"),
//! ])?;
//! assert_eq!(rest, vec![("batch_size".to_string(), "128".to_string())]);
//! ```

use crate::error::AugmentError;
use crate::transforms::vision::augmentation::MirrorPolicy;
use crate::transforms::vision::conversion::ChannelOrder;
use crate::transforms::vision::geometric::MAX_CANVAS_SIDE;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

// ============================================================================
// TargetShape
// ============================================================================

/// The `(channels, height, width)` every augmented tensor must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[usize; 3]", into = "[usize; 3]")]
pub struct TargetShape {
    pub channels: usize,
    pub height: usize,
    pub width: usize,
}

impl TargetShape {
    pub fn new(channels: usize, height: usize, width: usize) -> Self {
        Self {
            channels,
            height,
            width,
        }
    }

    pub fn dims(&self) -> [usize; 3] {
        [self.channels, self.height, self.width]
    }
}

impl Default for TargetShape {
    fn default() -> Self {
        Self::new(3, 224, 224)
    }
}

impl From<[usize; 3]> for TargetShape {
    fn from([channels, height, width]: [usize; 3]) -> Self {
        Self::new(channels, height, width)
    }
}

impl From<TargetShape> for [usize; 3] {
    fn from(shape: TargetShape) -> Self {
        shape.dims()
    }
}

/// Accepts `3,224,224` and `(3,224,224)`.
impl FromStr for TargetShape {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let inner = s.trim().trim_start_matches('(').trim_end_matches(')');
        let dims = inner
            .split(',')
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(|d| d.parse::<usize>().map_err(|e| e.to_string()))
            .collect::<Result<Vec<_>, _>>()?;
        match dims.as_slice() {
            &[c, h, w] => Ok(Self::new(c, h, w)),
            _ => Err(format!("expected 3 dimensions, got {}", dims.len())),
        }
    }
}

// ============================================================================
// AugmentParams
// ============================================================================

/// All augmentation knobs, as supplied by the surrounding configuration layer.
///
/// Every field has a default, so a JSON document may set any subset of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AugmentParams {
    /// Random crop offsets; centered offsets when false.
    pub rand_crop: bool,
    /// Fixed row offset of the tensor-domain crop.
    pub crop_y_start: Option<usize>,
    /// Fixed column offset of the tensor-domain crop.
    pub crop_x_start: Option<usize>,
    /// Rotation is drawn from `[-max_rotate_angle, max_rotate_angle]` degrees.
    pub max_rotate_angle: i32,
    pub max_aspect_ratio: f32,
    pub max_shear_ratio: f32,
    pub min_crop_size: Option<u32>,
    pub max_crop_size: Option<u32>,
    pub min_random_scale: f32,
    pub max_random_scale: f32,
    /// Lower clamp on each side of the warped canvas.
    pub min_img_size: f32,
    /// Upper clamp on each side of the warped canvas.
    pub max_img_size: f32,
    /// Fixed rotation in degrees; when positive it beats `rotate_list` and the random range.
    pub rotate: Option<i32>,
    /// Discrete rotation angles in degrees, picked uniformly when non-empty.
    pub rotate_list: Vec<i32>,
    /// Padding value written to every channel outside the warped image.
    pub fill_value: u8,
    pub mirror: bool,
    pub rand_mirror: bool,
    /// Location of the persisted mean image.
    pub mean_img: Option<PathBuf>,
    pub mean_r: f32,
    pub mean_g: f32,
    pub mean_b: f32,
    pub input_shape: TargetShape,
    pub max_random_contrast: f32,
    pub max_random_illumination: f32,
    /// Final multiplier applied to every output element.
    pub scale: f32,
    /// Channel order of the tensors going in and out of the engine.
    pub channel_order: ChannelOrder,
}

impl Default for AugmentParams {
    fn default() -> Self {
        Self {
            rand_crop: true,
            crop_y_start: None,
            crop_x_start: None,
            max_rotate_angle: 0,
            max_aspect_ratio: 0.0,
            max_shear_ratio: 0.0,
            min_crop_size: None,
            max_crop_size: None,
            min_random_scale: 1.0,
            max_random_scale: 1.0,
            min_img_size: 0.0,
            max_img_size: 1e10,
            rotate: None,
            rotate_list: Vec::new(),
            fill_value: 255,
            mirror: false,
            rand_mirror: false,
            mean_img: None,
            mean_r: 0.0,
            mean_g: 0.0,
            mean_b: 0.0,
            input_shape: TargetShape::default(),
            max_random_contrast: 0.0,
            max_random_illumination: 0.0,
            scale: 1.0,
            channel_order: ChannelOrder::default(),
        }
    }
}

impl AugmentParams {
    pub fn builder() -> AugmentParamsBuilder {
        AugmentParamsBuilder::default()
    }

    /// Builds parameters from string key/value pairs.
    ///
    /// Returns the parameters together with the pairs whose key is not an augmentation
    /// parameter, in their original order. Negative integers mean "unset" for the crop offsets,
    /// crop sizes and `rotate`.
    pub fn from_kwargs<I, K, V>(kwargs: I) -> Result<(Self, Vec<(String, String)>)>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut params = Self::default();
        let mut unknown = Vec::new();
        for (key, value) in kwargs {
            let (key, value) = (key.into(), value.into());
            if !params.set(&key, &value)? {
                unknown.push((key, value));
            }
        }
        Ok((params, unknown))
    }

    /// Sets one parameter from its string form. Returns `Ok(false)` for unknown keys.
    pub fn set(&mut self, key: &str, value: &str) -> Result<bool, AugmentError> {
        let v = value.trim();
        match key {
            "rand_crop" => self.rand_crop = parse_bool(key, v)?,
            "crop_y_start" => self.crop_y_start = parse_optional(key, v)?,
            "crop_x_start" => self.crop_x_start = parse_optional(key, v)?,
            "max_rotate_angle" => self.max_rotate_angle = parse_value(key, v)?,
            "max_aspect_ratio" => self.max_aspect_ratio = parse_value(key, v)?,
            "max_shear_ratio" => self.max_shear_ratio = parse_value(key, v)?,
            "min_crop_size" => self.min_crop_size = parse_optional(key, v)?,
            "max_crop_size" => self.max_crop_size = parse_optional(key, v)?,
            "min_random_scale" => self.min_random_scale = parse_value(key, v)?,
            "max_random_scale" => self.max_random_scale = parse_value(key, v)?,
            "min_img_size" => self.min_img_size = parse_value(key, v)?,
            "max_img_size" => self.max_img_size = parse_value(key, v)?,
            "rotate" => self.rotate = parse_optional(key, v)?,
            "rotate_list" => self.rotate_list = parse_list(key, v)?,
            "fill_value" => self.fill_value = parse_value(key, v)?,
            "mirror" => self.mirror = parse_bool(key, v)?,
            "rand_mirror" => self.rand_mirror = parse_bool(key, v)?,
            "mean_img" => self.mean_img = (!v.is_empty()).then(|| PathBuf::from(v)),
            "mean_r" => self.mean_r = parse_value(key, v)?,
            "mean_g" => self.mean_g = parse_value(key, v)?,
            "mean_b" => self.mean_b = parse_value(key, v)?,
            "input_shape" => self.input_shape = parse_value(key, v)?,
            "max_random_contrast" => self.max_random_contrast = parse_value(key, v)?,
            "max_random_illumination" => self.max_random_illumination = parse_value(key, v)?,
            "scale" => self.scale = parse_value(key, v)?,
            "channel_order" => self.channel_order = parse_value(key, v)?,
            _ => return Ok(false),
        }
        Ok(true)
    }
}

fn parse_value<T>(key: &str, value: &str) -> Result<T, AugmentError>
where
    T: FromStr,
    T::Err: Display,
{
    value
        .parse()
        .map_err(|e| AugmentError::invalid_param(key, value, e))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, AugmentError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" => Ok(true),
        "0" | "false" => Ok(false),
        _ => Err(AugmentError::invalid_param(
            key,
            value,
            "expected 0, 1, true or false",
        )),
    }
}

/// Negative integers are the "unset" sentinel.
fn parse_optional<T>(key: &str, value: &str) -> Result<Option<T>, AugmentError>
where
    T: TryFrom<i64>,
{
    let raw: i64 = parse_value(key, value)?;
    if raw < 0 {
        return Ok(None);
    }
    T::try_from(raw)
        .map(Some)
        .map_err(|_| AugmentError::invalid_param(key, value, "value out of range"))
}

fn parse_list(key: &str, value: &str) -> Result<Vec<i32>, AugmentError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| parse_value(key, item))
        .collect()
}

/// Builder for `AugmentParams` with method chaining.
#[derive(Default)]
pub struct AugmentParamsBuilder {
    params: AugmentParams,
}

impl AugmentParamsBuilder {
    pub fn input_shape(mut self, shape: TargetShape) -> Self {
        self.params.input_shape = shape;
        self
    }

    pub fn rand_crop(mut self, enabled: bool) -> Self {
        self.params.rand_crop = enabled;
        self
    }

    /// Fixed tensor-domain crop offsets (row, column).
    pub fn crop_start(mut self, y: usize, x: usize) -> Self {
        self.params.crop_y_start = Some(y);
        self.params.crop_x_start = Some(x);
        self
    }

    /// Enables the randomized-size square crop.
    pub fn crop_size_range(mut self, min: u32, max: u32) -> Self {
        self.params.min_crop_size = Some(min);
        self.params.max_crop_size = Some(max);
        self
    }

    pub fn max_rotate_angle(mut self, degrees: i32) -> Self {
        self.params.max_rotate_angle = degrees;
        self
    }

    pub fn rotate(mut self, degrees: i32) -> Self {
        self.params.rotate = Some(degrees);
        self
    }

    pub fn rotate_list(mut self, angles: Vec<i32>) -> Self {
        self.params.rotate_list = angles;
        self
    }

    pub fn max_shear_ratio(mut self, ratio: f32) -> Self {
        self.params.max_shear_ratio = ratio;
        self
    }

    pub fn max_aspect_ratio(mut self, ratio: f32) -> Self {
        self.params.max_aspect_ratio = ratio;
        self
    }

    pub fn random_scale(mut self, min: f32, max: f32) -> Self {
        self.params.min_random_scale = min;
        self.params.max_random_scale = max;
        self
    }

    pub fn img_size_bounds(mut self, min: f32, max: f32) -> Self {
        self.params.min_img_size = min;
        self.params.max_img_size = max;
        self
    }

    pub fn fill_value(mut self, value: u8) -> Self {
        self.params.fill_value = value;
        self
    }

    pub fn mirror(mut self, enabled: bool) -> Self {
        self.params.mirror = enabled;
        self
    }

    pub fn rand_mirror(mut self, enabled: bool) -> Self {
        self.params.rand_mirror = enabled;
        self
    }

    pub fn mean_img(mut self, path: impl Into<PathBuf>) -> Self {
        self.params.mean_img = Some(path.into());
        self
    }

    /// Per-channel means, given in red, green, blue order.
    pub fn channel_means(mut self, r: f32, g: f32, b: f32) -> Self {
        self.params.mean_r = r;
        self.params.mean_g = g;
        self.params.mean_b = b;
        self
    }

    pub fn max_random_contrast(mut self, ratio: f32) -> Self {
        self.params.max_random_contrast = ratio;
        self
    }

    pub fn max_random_illumination(mut self, value: f32) -> Self {
        self.params.max_random_illumination = value;
        self
    }

    pub fn scale(mut self, factor: f32) -> Self {
        self.params.scale = factor;
        self
    }

    pub fn channel_order(mut self, order: ChannelOrder) -> Self {
        self.params.channel_order = order;
        self
    }

    pub fn build(self) -> AugmentParams {
        self.params
    }
}

// ============================================================================
// AugmentConfig
// ============================================================================

/// How the pixel-domain crop after the warp picks its region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CropPolicy {
    /// Cut the target spatial shape directly out of the canvas.
    ToTarget,
    /// Cut a square of random side in `[min, max]`, then resize to the target shape.
    RandomSize { min: u32, max: u32 },
}

/// Where the rotation angle of each call comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RotationPolicy {
    Fixed(i32),
    List(Vec<i32>),
    /// Uniform in `[-max, max]` degrees.
    Range(i32),
}

/// Validated parameters plus the policies derived from them.
///
/// Immutable once built; share one instance between engines with `Arc`.
#[derive(Debug, Clone)]
pub struct AugmentConfig {
    params: AugmentParams,
    crop: CropPolicy,
    rotation: RotationPolicy,
    mirror: MirrorPolicy,
    channel_means: Option<[f32; 3]>,
    needs_geometric: bool,
}

impl AugmentConfig {
    pub fn new(params: AugmentParams) -> Result<Self> {
        validate(&params)?;

        let crop = match (params.min_crop_size, params.max_crop_size) {
            (Some(min), Some(max)) => CropPolicy::RandomSize { min, max },
            _ => CropPolicy::ToTarget,
        };

        let rotation = if let Some(angle) = params.rotate.filter(|&angle| angle > 0) {
            RotationPolicy::Fixed(angle)
        } else if !params.rotate_list.is_empty() {
            RotationPolicy::List(params.rotate_list.clone())
        } else {
            RotationPolicy::Range(params.max_rotate_angle)
        };

        let mirror = if params.rand_mirror {
            MirrorPolicy::Random
        } else if params.mirror {
            MirrorPolicy::Always
        } else {
            MirrorPolicy::Never
        };

        let rgb = [params.mean_r, params.mean_g, params.mean_b];
        let channel_means = rgb
            .iter()
            .any(|&m| m > 0.0)
            .then(|| params.channel_order.reorder(rgb));

        let needs_geometric = match &rotation {
            RotationPolicy::Fixed(angle) => *angle != 0,
            RotationPolicy::List(_) => true,
            RotationPolicy::Range(max) => *max > 0,
        } || params.max_shear_ratio > 0.0
            || matches!(crop, CropPolicy::RandomSize { .. });

        Ok(Self {
            params,
            crop,
            rotation,
            mirror,
            channel_means,
            needs_geometric,
        })
    }

    pub fn params(&self) -> &AugmentParams {
        &self.params
    }

    pub fn target(&self) -> TargetShape {
        self.params.input_shape
    }

    pub fn crop_policy(&self) -> CropPolicy {
        self.crop
    }

    pub fn rotation_policy(&self) -> &RotationPolicy {
        &self.rotation
    }

    pub fn mirror_policy(&self) -> MirrorPolicy {
        self.mirror
    }

    /// Per-channel means in tensor channel order, when any of them is positive.
    pub fn channel_means(&self) -> Option<[f32; 3]> {
        self.channel_means
    }

    /// Whether the warp & crop stage runs. Decided from configuration alone: rotation,
    /// shear or a crop-size range enable it; scale and aspect ranges only shape the warp
    /// once it runs.
    pub fn needs_geometric(&self) -> bool {
        self.needs_geometric
    }
}

fn validate(p: &AugmentParams) -> Result<(), AugmentError> {
    let fail = |msg: String| Err(AugmentError::Config(msg));

    let shape = p.input_shape;
    if shape.channels != 1 && shape.channels != 3 {
        return fail(format!(
            "input_shape must have 1 or 3 channels (got {})",
            shape.channels
        ));
    }
    if shape.height == 0 || shape.width == 0 {
        return fail(format!(
            "input_shape must have non-zero spatial dimensions (got {}x{})",
            shape.height, shape.width
        ));
    }

    match (p.min_crop_size, p.max_crop_size) {
        (None, None) => {}
        (Some(min), Some(max)) => {
            if min == 0 {
                return fail("min_crop_size must be at least 1".into());
            }
            if max < min {
                return fail(format!(
                    "max_crop_size ({max}) is smaller than min_crop_size ({min})"
                ));
            }
        }
        _ => return fail("min_crop_size and max_crop_size must be set together".into()),
    }

    if !(p.min_random_scale > 0.0 && p.min_random_scale <= p.max_random_scale) {
        return fail(format!(
            "random scale range must satisfy 0 < min <= max (got [{}, {}])",
            p.min_random_scale, p.max_random_scale
        ));
    }
    if p.min_img_size > p.max_img_size {
        return fail(format!(
            "min_img_size ({}) exceeds max_img_size ({})",
            p.min_img_size, p.max_img_size
        ));
    }
    if !(p.min_img_size <= MAX_CANVAS_SIDE as f32) {
        return fail(format!(
            "min_img_size must not exceed {MAX_CANVAS_SIDE} (got {})",
            p.min_img_size
        ));
    }
    if p.max_rotate_angle < 0 {
        return fail(format!(
            "max_rotate_angle must be non-negative (got {})",
            p.max_rotate_angle
        ));
    }
    if !(0.0..1.0).contains(&p.max_aspect_ratio) {
        return fail(format!(
            "max_aspect_ratio must be in [0, 1) (got {})",
            p.max_aspect_ratio
        ));
    }
    for (name, value) in [
        ("max_shear_ratio", p.max_shear_ratio),
        ("max_random_contrast", p.max_random_contrast),
        ("max_random_illumination", p.max_random_illumination),
    ] {
        if !(value >= 0.0) {
            return fail(format!("{name} must be non-negative (got {value})"));
        }
    }
    Ok(())
}
