use image::{codecs::jpeg::JpegEncoder, ImageResult, Rgb, RgbImage};
use leafcam_core::ImageTensor;
use std::path::Path;

use crate::{gradcam::Heatmap, helpers::base64_encode};

/// Weight of the original image in the blend. The heatmap gets the remainder.
pub const ORIGINAL_WEIGHT: f32 = 0.6;
pub const HEATMAP_WEIGHT: f32 = 1.0 - ORIGINAL_WEIGHT;

const JPEG_QUALITY: u8 = 95;

/// An 8-bit RGB rendering of a Grad-CAM explanation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayImage(RgbImage);

impl OverlayImage {
	#[must_use]
	pub fn width(&self) -> u32 {
		self.0.width()
	}

	#[must_use]
	pub fn height(&self) -> u32 {
		self.0.height()
	}

	#[must_use]
	pub const fn as_image(&self) -> &RgbImage {
		&self.0
	}

	/// Encode as a JPEG.
	///
	/// # Errors
	///
	/// Returns an error if encoding fails.
	pub fn to_jpeg(&self) -> ImageResult<Vec<u8>> {
		let mut bytes = Vec::new();
		JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY).encode_image(&self.0)?;

		Ok(bytes)
	}

	/// Encode as a base64 JPEG string.
	///
	/// # Errors
	///
	/// Returns an error if encoding fails.
	pub fn to_base64_jpeg(&self) -> ImageResult<String> {
		Ok(base64_encode(self.to_jpeg()?))
	}

	/// Save to disk, picking the format from the extension.
	///
	/// # Errors
	///
	/// Returns an error if the format is unsupported or the file cannot be written.
	pub fn save(&self, path: &Path) -> ImageResult<()> {
		self.0.save(path)
	}
}

/// Jet colour ramp: 0 is dark blue, through cyan and yellow, to dark red at 255.
#[must_use]
pub fn jet(level: u8) -> Rgb<u8> {
	let x = f32::from(level) / 255.0;
	let channel = |offset: f32| {
		let value = (1.5 - 4.0f32.mul_add(x, -offset).abs()).clamp(0.0, 1.0);

		#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
		let value = (value * 255.0).round() as u8;
		value
	};

	Rgb([channel(3.0), channel(2.0), channel(1.0)])
}

/// Convert a tensor's raw pixel values to an 8-bit RGB image, replicating grayscale.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn tensor_to_rgb(tensor: &ImageTensor) -> RgbImage {
	let tensor = tensor.to_rgb();
	let pixels = tensor.image();
	let (height, width, _) = pixels.dim();

	RgbImage::from_fn(width as u32, height as u32, |x, y| {
		let (x, y) = (x as usize, y as usize);

		Rgb([0, 1, 2].map(|c| to_u8(pixels[[y, x, c]])))
	})
}

/// Blend `original` with the jet-coloured `heatmap`. Both must share the same extent.
#[must_use]
pub fn composite(original: &RgbImage, heatmap: &Heatmap) -> OverlayImage {
	let levels = heatmap.to_luma8();

	OverlayImage(RgbImage::from_fn(
		original.width(),
		original.height(),
		|x, y| {
			let base = original.get_pixel(x, y);
			let level = if x < levels.width() && y < levels.height() {
				levels.get_pixel(x, y).0[0]
			} else {
				0
			};
			let colour = jet(level);

			Rgb([0, 1, 2].map(|c| {
				to_u8(ORIGINAL_WEIGHT.mul_add(f32::from(base[c]), HEATMAP_WEIGHT * f32::from(colour[c])))
			}))
		},
	))
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_u8(value: f32) -> u8 {
	if value.is_finite() {
		value.round().clamp(0.0, 255.0) as u8
	} else {
		0
	}
}
