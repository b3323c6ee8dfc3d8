use image::imageops::{self, FilterType};
use image::RgbImage;
use sanitation_core::{SanitationError, SanitationResult};

pub const RESIZE_SHORT_SIDE: u32 = 256;
pub const CROP_SIZE: u32 = 224;
pub const CHANNEL_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const CHANNEL_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Normalized CHW tensor, 3 channels.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    data: Vec<f32>,
    height: usize,
    width: usize,
}

impl ImageTensor {
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn channel(&self, channel: usize) -> &[f32] {
        let plane = self.height * self.width;
        &self.data[channel * plane..(channel + 1) * plane]
    }
}

pub fn decode_image(bytes: &[u8]) -> SanitationResult<RgbImage> {
    if bytes.is_empty() {
        return Err(SanitationError::image_decode("empty upload"));
    }

    let rgb = image::load_from_memory(bytes)
        .map(|img| img.to_rgb8())
        .map_err(|err| SanitationError::image_decode(err.to_string()))?;

    if rgb.width() == 0 || rgb.height() == 0 {
        return Err(SanitationError::image_decode("image has no pixels"));
    }
    Ok(rgb)
}

/// Resize short side to 256, center-crop 224x224, scale to [0, 1] and
/// normalize per channel.
pub fn preprocess(bytes: &[u8]) -> SanitationResult<ImageTensor> {
    let rgb = decode_image(bytes)?;
    Ok(preprocess_rgb(&rgb))
}

/// Equivalent to resizing the short side to 256 and cropping the central
/// 224 square, but the crop is taken in source pixels first so the work is
/// bounded by the crop, whatever the aspect ratio. `rgb` must be non-empty.
pub fn preprocess_rgb(rgb: &RgbImage) -> ImageTensor {
    let (width, height) = rgb.dimensions();
    let (left, top, side) = center_crop_region(width, height);
    let region = imageops::crop_imm(rgb, left, top, side, side).to_image();
    let cropped = imageops::resize(&region, CROP_SIZE, CROP_SIZE, FilterType::Triangle);

    let plane = (CROP_SIZE * CROP_SIZE) as usize;
    let mut data = vec![0.0_f32; plane * 3];
    for (idx, pixel) in cropped.pixels().enumerate() {
        for channel in 0..3 {
            let value = pixel[channel] as f32 / 255.0;
            data[channel * plane + idx] = (value - CHANNEL_MEAN[channel]) / CHANNEL_STD[channel];
        }
    }

    ImageTensor {
        data,
        height: CROP_SIZE as usize,
        width: CROP_SIZE as usize,
    }
}

/// Source-space square `(left, top, side)` that lands on the 224 crop after
/// a 256 short-side resize.
fn center_crop_region(width: u32, height: u32) -> (u32, u32, u32) {
    let short = width.min(height).max(1);
    let side = ((short as f64 * CROP_SIZE as f64 / RESIZE_SHORT_SIDE as f64).round() as u32)
        .clamp(1, short);
    (
        center_offset(width, side),
        center_offset(height, side),
        side,
    )
}

fn center_offset(full: u32, crop: u32) -> u32 {
    ((full.saturating_sub(crop)) as f64 / 2.0).round() as u32
}
