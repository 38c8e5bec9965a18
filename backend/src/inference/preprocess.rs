use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;

use crate::error::AnalysisError;

/// Side length the classifier was trained on.
pub const CLASSIFIER_INPUT_SIZE: u32 = 225;

/// An upload decoded once and shared by every stage of a request.
pub struct DecodedScan {
    /// Full resolution RGB raster, used for detection and annotation.
    pub raster: RgbImage,
    /// `(1, 225, 225, 3)` NHWC tensor with values in `[0, 1]`.
    pub tensor: Array4<f32>,
}

pub fn decode_scan(bytes: &[u8]) -> Result<DecodedScan, AnalysisError> {
    let raster = decode_raster(bytes)?;
    let tensor = classifier_tensor(&raster);
    Ok(DecodedScan { raster, tensor })
}

pub fn decode_raster(bytes: &[u8]) -> Result<RgbImage, AnalysisError> {
    if bytes.is_empty() {
        return Err(AnalysisError::Decode("empty upload".into()));
    }
    let image =
        image::load_from_memory(bytes).map_err(|e| AnalysisError::Decode(e.to_string()))?;
    Ok(image.to_rgb8())
}

/// Stretches the raster to the classifier's square input; aspect ratio is not preserved.
pub fn classifier_tensor(raster: &RgbImage) -> Array4<f32> {
    let size = CLASSIFIER_INPUT_SIZE;
    let resized = imageops::resize(raster, size, size, FilterType::CatmullRom);

    let mut tensor = Array4::<f32>::zeros((1, size as usize, size as usize, 3));
    for (x, y, pixel) in resized.enumerate_pixels() {
        for channel in 0..3 {
            tensor[[0, y as usize, x as usize, channel]] = pixel[channel] as f32 / 255.0;
        }
    }
    tensor
}
