use crate::dataset::TransformedSource;
use crate::readers::ImageDirSource;
use crate::transforms::vision::conversion::{image_to_tensor, ChannelOrder};
use crate::transforms::{Chain, Transform};
use anyhow::{Context, Result};
use image::imageops::{self, FilterType};
use image::{ImageReader, RgbImage};
use ndarray::Array3;
use std::path::{Path, PathBuf};

/// Extensions picked up by [`decoded_image_source`].
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "webp", "tiff"];

/// Decodes an encoded image buffer (any format the `image` crate recognizes) into RGB.
///
/// Grayscale and alpha inputs are converted; the format is guessed from the content.
pub fn decode_image(bytes: &[u8]) -> Result<RgbImage> {
    let image = image::load_from_memory(bytes)
        .with_context(|| format!("Failed to decode image buffer ({} bytes)", bytes.len()))?;
    Ok(image.into_rgb8())
}

/// Reads an image file from disk as RGB.
pub fn load_image(path: &Path) -> Result<RgbImage> {
    let image = ImageReader::open(path)
        .with_context(|| format!("Failed to open image: {}", path.display()))?
        .with_guessed_format()
        .with_context(|| format!("Failed to read image: {}", path.display()))?
        .decode()
        .with_context(|| format!("Failed to decode image: {}", path.display()))?;
    Ok(image.into_rgb8())
}

// ============================================================================
// LoadImage
// ============================================================================

/// Loads an image file as an `RgbImage`.
///
/// # Example
/// ```ignore
/// let image = LoadImage.apply(PathBuf::from("photo.jpg"))?;
/// println!("{:?}", image.dimensions());
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadImage;

impl Transform<PathBuf, RgbImage> for LoadImage {
    fn apply(&self, path: PathBuf) -> Result<RgbImage> {
        load_image(&path)
    }
}

// ============================================================================
// ToTensor
// ============================================================================

/// Resizes an image to a fixed `height x width` and converts it to a `[3, H, W]` tensor
/// of raw 0..255 values in the given channel order.
#[derive(Debug, Clone, Copy)]
pub struct ToTensor {
    height: u32,
    width: u32,
    order: ChannelOrder,
}

impl ToTensor {
    pub fn new(height: u32, width: u32, order: ChannelOrder) -> Self {
        Self {
            height,
            width,
            order,
        }
    }
}

impl Transform<RgbImage, Array3<f32>> for ToTensor {
    fn apply(&self, image: RgbImage) -> Result<Array3<f32>> {
        let image = if image.dimensions() == (self.width, self.height) {
            image
        } else {
            imageops::resize(&image, self.width, self.height, FilterType::Triangle)
        };
        let mut tensor = Array3::zeros((3, self.height as usize, self.width as usize));
        image_to_tensor(&image, self.order, &mut tensor);
        Ok(tensor)
    }
}

// ============================================================================
// Decoded image source
// ============================================================================

pub type DecodedImageSource =
    TransformedSource<ImageDirSource, Chain<LoadImage, ToTensor, RgbImage>, PathBuf>;

/// Streams every image under `dir` (recursively) as a `[3, height, width]` tensor, the
/// input the mean image accumulator expects.
pub fn decoded_image_source(
    dir: impl Into<PathBuf>,
    height: u32,
    width: u32,
    order: ChannelOrder,
) -> DecodedImageSource {
    TransformedSource::new(
        ImageDirSource::new(dir, IMAGE_EXTENSIONS, true),
        LoadImage.then(ToTensor::new(height, width, order)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::DataSource;
    use image::{ImageFormat, Rgb};
    use std::io::Cursor;
    use tempfile::tempdir;

    fn png_bytes(image: &RgbImage) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
        Ok(bytes)
    }

    #[test]
    fn test_decode_png_buffer() -> Result<()> {
        let image = RgbImage::from_fn(5, 3, |x, y| Rgb([x as u8 * 10, y as u8 * 20, 7]));
        let decoded = decode_image(&png_bytes(&image)?)?;
        assert_eq!(decoded, image);
        Ok(())
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(decode_image(b"definitely not an image").is_err());
    }

    #[test]
    fn test_to_tensor_resizes() -> Result<()> {
        let image = RgbImage::from_pixel(10, 6, Rgb([200, 100, 50]));
        let tensor = ToTensor::new(4, 8, ChannelOrder::Bgr).apply(image)?;
        assert_eq!(tensor.dim(), (3, 4, 8));
        // Uniform colour survives resizing; BGR puts blue first.
        assert!(tensor.index_axis(ndarray::Axis(0), 0).iter().all(|&v| v == 50.0));
        assert!(tensor.index_axis(ndarray::Axis(0), 2).iter().all(|&v| v == 200.0));
        Ok(())
    }

    #[test]
    fn test_decoded_image_source_streams_tensors() -> Result<()> {
        let dir = tempdir()?;
        RgbImage::from_pixel(12, 9, Rgb([1, 2, 3])).save(dir.path().join("a.png"))?;
        RgbImage::from_pixel(7, 7, Rgb([4, 5, 6])).save(dir.path().join("b.png"))?;
        std::fs::write(dir.path().join("notes.txt"), "skip me")?;

        let source = decoded_image_source(dir.path(), 6, 5, ChannelOrder::Rgb);
        let tensors: Vec<Array3<f32>> = source.stream()?.collect::<Result<_>>()?;
        assert_eq!(tensors.len(), 2);
        assert!(tensors.iter().all(|t| t.dim() == (3, 6, 5)));
        Ok(())
    }
}
