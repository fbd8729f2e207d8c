//! # Raster Module
//!
//! The owned pixel buffer that flows between preprocessing stages, and the
//! bounds-checked conversions to and from the `image` crate buffers used by the
//! individual algorithms.
//!
//! An [`Image`] is row-major with one (grayscale/binary) or three (RGB) interleaved
//! channels. A zero-sized image is a legal value: stages return it to signal that
//! no output could be produced, and every consumer checks [`Image::is_empty`]
//! before using it as an input.

use image::{DynamicImage, GrayImage, RgbImage};

use crate::preprocessing::types::PreprocessingError;

/// Owned row-major raster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    width: u32,
    height: u32,
    channels: u8,
    data: Vec<u8>,
}

impl Image {
    /// Creates the zero-sized image used as the "no output" signal.
    pub fn empty() -> Self {
        Self {
            width: 0,
            height: 0,
            channels: 1,
            data: Vec::new(),
        }
    }

    /// Builds an image from a raw row-major buffer.
    ///
    /// # Errors
    ///
    /// Returns `PreprocessingError::InvalidInput` if `channels` is not 1 or 3, or
    /// if the buffer length does not equal `width * height * channels`.
    ///
    /// # Examples
    ///
    /// ```
    /// use docscan::raster::Image;
    ///
    /// let img = Image::from_raw(2, 2, 1, vec![0, 255, 255, 0]).unwrap();
    /// assert_eq!(img.dimensions(), (2, 2));
    /// assert!(Image::from_raw(2, 2, 1, vec![0; 3]).is_err());
    /// ```
    pub fn from_raw(
        width: u32,
        height: u32,
        channels: u8,
        data: Vec<u8>,
    ) -> Result<Self, PreprocessingError> {
        if channels != 1 && channels != 3 {
            return Err(PreprocessingError::InvalidInput {
                message: format!("unsupported channel count {}, expected 1 or 3", channels),
            });
        }

        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(channels as usize))
            .ok_or_else(|| PreprocessingError::InvalidInput {
                message: format!("image dimensions {}x{} overflow", width, height),
            })?;

        if data.len() != expected {
            return Err(PreprocessingError::InvalidInput {
                message: format!(
                    "buffer holds {} bytes, expected {} for {}x{}x{}",
                    data.len(),
                    expected,
                    width,
                    height,
                    channels
                ),
            });
        }

        Ok(Self {
            width,
            height,
            channels,
            data,
        })
    }

    /// Wraps a single-channel buffer.
    pub fn from_gray(image: GrayImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            channels: 1,
            data: image.into_raw(),
        }
    }

    /// Wraps a three-channel buffer.
    pub fn from_rgb(image: RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            channels: 3,
            data: image.into_raw(),
        }
    }

    /// Converts a decoded image, keeping a single channel when the source has no colour.
    pub fn from_dynamic(image: DynamicImage) -> Self {
        if image.color().has_color() {
            Self::from_rgb(image.to_rgb8())
        } else {
            Self::from_gray(image.to_luma8())
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.data
    }

    /// True when the image has no pixels.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn is_grayscale(&self) -> bool {
        self.channels == 1
    }

    /// Copies the pixels into a single-channel buffer, converting colour images
    /// with the standard luma weights.
    ///
    /// # Errors
    ///
    /// Returns `PreprocessingError::InvalidInput` if the internal buffer does not
    /// match the recorded dimensions.
    pub fn to_gray_image(&self) -> Result<GrayImage, PreprocessingError> {
        match self.channels {
            1 => GrayImage::from_raw(self.width, self.height, self.data.clone()).ok_or_else(|| {
                PreprocessingError::InvalidInput {
                    message: "grayscale buffer does not match its dimensions".to_string(),
                }
            }),
            _ => {
                let rgb = RgbImage::from_raw(self.width, self.height, self.data.clone())
                    .ok_or_else(|| PreprocessingError::InvalidInput {
                        message: "colour buffer does not match its dimensions".to_string(),
                    })?;
                Ok(DynamicImage::ImageRgb8(rgb).to_luma8())
            }
        }
    }

    /// Returns a single-channel copy of this image.
    pub fn grayscale(&self) -> Result<Image, PreprocessingError> {
        if self.is_grayscale() {
            return Ok(self.clone());
        }
        Ok(Self::from_gray(self.to_gray_image()?))
    }
}

impl Default for Image {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<GrayImage> for Image {
    fn from(image: GrayImage) -> Self {
        Self::from_gray(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb};

    #[test]
    fn test_from_raw_rejects_bad_channel_count() {
        let result = Image::from_raw(2, 2, 4, vec![0; 16]);
        assert!(matches!(
            result,
            Err(PreprocessingError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_from_raw_rejects_short_buffer() {
        let result = Image::from_raw(4, 4, 3, vec![0; 47]);
        assert!(matches!(
            result,
            Err(PreprocessingError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_empty_image_is_valid_value() {
        let img = Image::empty();
        assert!(img.is_empty());
        assert_eq!(img.dimensions(), (0, 0));
        let gray = img.to_gray_image().expect("empty buffer converts");
        assert_eq!(gray.dimensions(), (0, 0));
    }

    #[test]
    fn test_gray_roundtrip_preserves_pixels() {
        let mut gray = GrayImage::new(3, 2);
        gray.put_pixel(2, 1, Luma([77]));
        let img = Image::from_gray(gray.clone());
        assert_eq!(img.channels(), 1);
        assert_eq!(img.to_gray_image().unwrap(), gray);
    }

    #[test]
    fn test_colour_image_converts_to_single_channel() {
        let mut rgb = RgbImage::new(4, 4);
        for pixel in rgb.pixels_mut() {
            *pixel = Rgb([255, 255, 255]);
        }
        let img = Image::from_rgb(rgb);
        assert_eq!(img.channels(), 3);

        let gray = img.grayscale().unwrap();
        assert!(gray.is_grayscale());
        assert_eq!(gray.dimensions(), (4, 4));
        assert!(gray.as_bytes().iter().all(|&v| v == 255));
    }

    #[test]
    fn test_from_dynamic_keeps_gray_single_channel() {
        let img = Image::from_dynamic(DynamicImage::ImageLuma8(GrayImage::new(5, 5)));
        assert!(img.is_grayscale());
    }
}
