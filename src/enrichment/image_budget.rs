//! Keeps an image payload under an oracle's encoded-size ceiling.

use super::oracle::ImagePayload;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageResult};
use tracing::{debug, info};

const JPEG_MEDIA_TYPE: &str = "image/jpeg";

/// Length of the base64 text for `raw_len` bytes.
pub fn base64_len(raw_len: usize) -> usize {
    raw_len.div_ceil(3) * 4
}

#[derive(Debug, Clone)]
pub struct ImageBudget {
    /// Ceiling on the base64-encoded size.
    pub max_encoded_bytes: usize,
    /// Longest side after downscaling.
    pub max_dimension: u32,
    pub start_quality: u8,
    pub min_quality: u8,
    pub quality_step: u8,
}

impl ImageBudget {
    pub fn new(max_encoded_bytes: usize, max_dimension: u32) -> Self {
        Self {
            max_encoded_bytes,
            max_dimension,
            start_quality: 75,
            min_quality: 30,
            quality_step: 10,
        }
    }

    pub fn fits(&self, payload: &ImagePayload) -> bool {
        base64_len(payload.bytes.len()) <= self.max_encoded_bytes
    }

    /// Returns `payload` unchanged when it already fits; otherwise
    /// downscales and re-encodes as JPEG at decreasing quality until it fits
    /// or the quality floor is reached. The floor result is returned even
    /// when still over budget.
    pub fn fit(&self, payload: ImagePayload) -> ImageResult<ImagePayload> {
        if self.fits(&payload) {
            return Ok(payload);
        }
        let original_len = payload.bytes.len();
        let image = image::load_from_memory(&payload.bytes)?;
        let image = if image.width() > self.max_dimension || image.height() > self.max_dimension {
            image.thumbnail(self.max_dimension, self.max_dimension)
        } else {
            image
        };

        let mut quality = self.start_quality;
        let mut bytes = encode_jpeg(&image, quality)?;
        while base64_len(bytes.len()) > self.max_encoded_bytes && quality > self.min_quality {
            quality = quality
                .saturating_sub(self.quality_step)
                .max(self.min_quality);
            bytes = encode_jpeg(&image, quality)?;
            debug!(
                "Quality reduced to {}% ({:.1} KB)",
                quality,
                bytes.len() as f64 / 1024.0
            );
        }

        info!(
            "Resized image from {:.1} KB to {:.1} KB at quality {}",
            original_len as f64 / 1024.0,
            bytes.len() as f64 / 1024.0,
            quality
        );
        Ok(ImagePayload {
            bytes,
            media_type: JPEG_MEDIA_TYPE.to_string(),
        })
    }
}

fn encode_jpeg(image: &DynamicImage, quality: u8) -> ImageResult<Vec<u8>> {
    let mut out = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut out, quality);
    encoder.encode_image(&image.to_rgb8())?;
    Ok(out)
}
