//! One cropping primitive for both representations the engine handles: the pixel grid
//! after the warp and the `[C, H, W]` tensor during normalization.

use crate::error::AugmentError;
use image::{imageops, RgbImage};
use ndarray::{s, Array3, ArrayView3};
use rand::Rng;

/// A 2-D buffer with channels that a `CropWindow` can be cut from.
pub trait Croppable {
    /// `(height, width)`
    fn spatial_dims(&self) -> (usize, usize);
}

impl Croppable for RgbImage {
    fn spatial_dims(&self) -> (usize, usize) {
        (self.height() as usize, self.width() as usize)
    }
}

impl Croppable for Array3<f32> {
    fn spatial_dims(&self) -> (usize, usize) {
        let (_, h, w) = self.dim();
        (h, w)
    }
}

impl Croppable for ArrayView3<'_, f32> {
    fn spatial_dims(&self) -> (usize, usize) {
        let (_, h, w) = self.dim();
        (h, w)
    }
}

/// A rectangular region, in rows and columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropWindow {
    pub y: usize,
    pub x: usize,
    pub height: usize,
    pub width: usize,
}

impl CropWindow {
    /// Places a `height x width` window inside `src`.
    ///
    /// With `random` the offset is uniform over every valid position; otherwise the slack
    /// is split evenly (integer division) and the random source is left untouched. No
    /// random draws happen when the window already covers `src`.
    pub fn place<B, R>(
        src: &B,
        height: usize,
        width: usize,
        random: bool,
        rng: &mut R,
    ) -> Result<Self, AugmentError>
    where
        B: Croppable + ?Sized,
        R: Rng,
    {
        let (src_h, src_w) = src.spatial_dims();
        if src_h < height || src_w < width {
            return Err(AugmentError::Undersized {
                height: src_h,
                width: src_w,
                need_height: height,
                need_width: width,
            });
        }
        let (slack_y, slack_x) = (src_h - height, src_w - width);
        let (y, x) = if random && (slack_y > 0 || slack_x > 0) {
            (rng.random_range(0..=slack_y), rng.random_range(0..=slack_x))
        } else {
            (slack_y / 2, slack_x / 2)
        };
        Ok(Self {
            y,
            x,
            height,
            width,
        })
    }

    /// Replaces the row and/or column offset, checking the window still fits in `src`.
    pub fn with_offset<B>(
        mut self,
        src: &B,
        y: Option<usize>,
        x: Option<usize>,
    ) -> Result<Self, AugmentError>
    where
        B: Croppable + ?Sized,
    {
        self.y = y.unwrap_or(self.y);
        self.x = x.unwrap_or(self.x);
        let (src_h, src_w) = src.spatial_dims();
        if self.y + self.height > src_h || self.x + self.width > src_w {
            return Err(AugmentError::CropOutOfBounds {
                y: self.y,
                x: self.x,
                height: self.height,
                width: self.width,
                src_height: src_h,
                src_width: src_w,
            });
        }
        Ok(self)
    }

    /// Copies the window out of a pixel grid.
    pub fn crop_image(&self, img: &RgbImage) -> RgbImage {
        imageops::crop_imm(
            img,
            self.x as u32,
            self.y as u32,
            self.width as u32,
            self.height as u32,
        )
        .to_image()
    }

    /// Borrows the window of a `[C, H, W]` tensor across all channels.
    pub fn view<'a>(&self, tensor: ArrayView3<'a, f32>) -> ArrayView3<'a, f32> {
        tensor.slice_move(s![
            ..,
            self.y..self.y + self.height,
            self.x..self.x + self.width
        ])
    }
}
