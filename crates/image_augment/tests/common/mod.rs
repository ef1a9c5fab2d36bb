#![allow(dead_code)]

use image_augment::{AugmentConfig, AugmentParams, DataSource, ImageAugmenter, MeanImage};

use anyhow::{bail, Result};
use image::{ImageFormat, Rgb, RgbImage};
use ndarray::Array3;
use std::io::Cursor;
use std::sync::Arc;

/// Test data source that yields predefined tensors.
pub struct TestImageSource {
    pub images: Vec<Array3<f32>>,
}

impl DataSource<Array3<f32>> for TestImageSource {
    fn stream(&self) -> Result<Box<dyn Iterator<Item = Result<Array3<f32>>> + Send>> {
        Ok(Box::new(self.images.clone().into_iter().map(Ok)))
    }
}

/// A source whose stream must never be opened.
pub struct UnreachableSource;

impl DataSource<Array3<f32>> for UnreachableSource {
    fn stream(&self) -> Result<Box<dyn Iterator<Item = Result<Array3<f32>>> + Send>> {
        bail!("dataset was streamed although a mean image exists")
    }
}

/// An image whose every pixel differs from its neighbours.
pub fn gradient_image(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            (x * 7 % 256) as u8,
            (y * 11 % 256) as u8,
            ((x * 3 + y * 5) % 256) as u8,
        ])
    })
}

pub fn png_bytes(image: &RgbImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
}

pub fn build_augmenter(params: AugmentParams, mean: Option<MeanImage>) -> Result<ImageAugmenter> {
    let config = Arc::new(AugmentConfig::new(params)?);
    Ok(ImageAugmenter::new(config, mean.map(Arc::new)))
}

/// A fresh, empty output tensor.
pub fn empty() -> Array3<f32> {
    Array3::zeros((0, 0, 0))
}
