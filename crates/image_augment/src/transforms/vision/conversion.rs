use anyhow::{ensure, Result};
use image::RgbImage;
use ndarray::{Array3, ArrayView3};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

// ============================================================================
// ChannelOrder
// ============================================================================

/// Channel order of the engine's tensors.
///
/// Pixel grids inside the engine are always `RgbImage` (R, G, B). A tensor in `Rgb` order
/// holds red in channel 0; in `Bgr` order it holds blue in channel 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelOrder {
    #[default]
    Rgb,
    Bgr,
}

impl ChannelOrder {
    /// Maps a tensor channel to its pixel channel, and a pixel channel to its tensor
    /// channel. The mapping is its own inverse, so ingress and egress share it.
    #[inline]
    pub fn permute(self, channel: usize) -> usize {
        match self {
            ChannelOrder::Rgb => channel,
            ChannelOrder::Bgr => 2 - channel,
        }
    }

    /// Reorders a red, green, blue triple into tensor channel order.
    pub fn reorder<T: Copy>(self, rgb: [T; 3]) -> [T; 3] {
        [0, 1, 2].map(|c| rgb[self.permute(c)])
    }
}

impl FromStr for ChannelOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rgb" => Ok(ChannelOrder::Rgb),
            "bgr" => Ok(ChannelOrder::Bgr),
            other => Err(format!("unknown channel order '{other}' (expected rgb or bgr)")),
        }
    }
}

// ============================================================================
// Pixel grid <-> tensor
// ============================================================================

/// Writes `img` into `out` as a `[3, H, W]` tensor of raw 0..=255 values.
///
/// `out` is reallocated only when its shape differs from the image.
pub fn image_to_tensor(img: &RgbImage, order: ChannelOrder, out: &mut Array3<f32>) {
    let (width, height) = (img.width() as usize, img.height() as usize);
    if out.dim() != (3, height, width) {
        *out = Array3::zeros((3, height, width));
    }
    let raw = img.as_raw();
    for c in 0..3 {
        let src_channel = order.permute(c);
        let mut plane = out.index_axis_mut(ndarray::Axis(0), c);
        for ((y, x), value) in plane.indexed_iter_mut() {
            *value = raw[(y * width + x) * 3 + src_channel] as f32;
        }
    }
}

/// Writes a `[3, H, W]` tensor into `out`, rounding and saturating to 0..=255.
///
/// `out` is reallocated only when its dimensions differ from the tensor.
pub fn tensor_to_image(
    tensor: ArrayView3<'_, f32>,
    order: ChannelOrder,
    out: &mut RgbImage,
) -> Result<()> {
    let (channels, height, width) = tensor.dim();
    ensure!(
        channels == 3,
        "Pixel conversion needs a 3-channel tensor (got {} channels)",
        channels
    );
    if out.dimensions() != (width as u32, height as u32) {
        *out = RgbImage::new(width as u32, height as u32);
    }
    for (x, y, pixel) in out.enumerate_pixels_mut() {
        let (x, y) = (x as usize, y as usize);
        for (pixel_channel, sample) in pixel.0.iter_mut().enumerate() {
            let value = tensor[[order.permute(pixel_channel), y, x]];
            *sample = value.round().clamp(0.0, 255.0) as u8;
        }
    }
    Ok(())
}
