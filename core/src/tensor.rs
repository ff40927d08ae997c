use ndarray::{Array4, ArrayView3, Axis};

use crate::{Error, Result};

/// A single image laid out as `(1, height, width, channels)`.
///
/// Pixel values are raw intensities in `[0, 255]`; any model-specific scaling
/// happens inside the model. Only 1 (grayscale) and 3 (RGB) channel images are
/// representable.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor(Array4<f32>);

impl ImageTensor {
	/// Wrap an existing array.
	///
	/// # Errors
	///
	/// Returns [`Error::Shape`] if the batch dimension is not 1, the image is empty, or the channel count is neither 1 nor 3.
	pub fn new(array: Array4<f32>) -> Result<Self> {
		let (batch, height, width, channels) = array.dim();

		if batch != 1 {
			return Err(Error::Shape(format!(
				"expected a batch of exactly one image, got {batch}"
			)));
		}

		if height == 0 || width == 0 {
			return Err(Error::Shape(format!("image is empty ({height}x{width})")));
		}

		if channels != 1 && channels != 3 {
			return Err(Error::Shape(format!(
				"expected 1 or 3 channels, got {channels}"
			)));
		}

		Ok(Self(array))
	}

	/// Build a tensor from interleaved `height * width * channels` pixel values.
	///
	/// # Errors
	///
	/// Returns [`Error::Shape`] if the buffer length does not match the dimensions.
	pub fn from_pixels(
		height: usize,
		width: usize,
		channels: usize,
		pixels: Vec<f32>,
	) -> Result<Self> {
		let array = Array4::from_shape_vec((1, height, width, channels), pixels)
			.map_err(|e| Error::Shape(e.to_string()))?;

		Self::new(array)
	}

	#[must_use]
	pub fn height(&self) -> usize {
		self.0.dim().1
	}

	#[must_use]
	pub fn width(&self) -> usize {
		self.0.dim().2
	}

	#[must_use]
	pub fn channels(&self) -> usize {
		self.0.dim().3
	}

	#[must_use]
	pub const fn as_array(&self) -> &Array4<f32> {
		&self.0
	}

	/// The image with the batch dimension stripped, `(height, width, channels)`.
	#[must_use]
	pub fn image(&self) -> ArrayView3<'_, f32> {
		self.0.index_axis(Axis(0), 0)
	}

	/// Expand a grayscale tensor to three identical channels. RGB tensors are returned unchanged.
	#[must_use]
	pub fn to_rgb(&self) -> Self {
		if self.channels() == 3 {
			return self.clone();
		}

		let (_, height, width, _) = self.0.dim();
		Self(Array4::from_shape_fn((1, height, width, 3), |(b, y, x, _)| {
			self.0[[b, y, x, 0]]
		}))
	}

	/// Pixel values in row-major `(1, height, width, channels)` order.
	#[must_use]
	pub fn to_vec(&self) -> Vec<f32> {
		self.0.iter().copied().collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn rejects_batches_larger_than_one() {
		let err = ImageTensor::new(Array4::zeros((2, 4, 4, 3))).unwrap_err();

		assert!(matches!(err, Error::Shape(_)));
	}

	#[test]
	fn rejects_unsupported_channel_counts() {
		assert!(ImageTensor::new(Array4::zeros((1, 4, 4, 4))).is_err());
		assert!(ImageTensor::new(Array4::zeros((1, 4, 4, 1))).is_ok());
	}

	#[test]
	fn from_pixels_checks_buffer_length() {
		assert!(ImageTensor::from_pixels(2, 2, 3, vec![0.0; 11]).is_err());

		let tensor = ImageTensor::from_pixels(2, 3, 3, vec![0.0; 18]).unwrap();
		assert_eq!((tensor.height(), tensor.width(), tensor.channels()), (2, 3, 3));
	}

	#[test]
	fn grayscale_is_replicated_across_channels() {
		let gray = ImageTensor::from_pixels(1, 2, 1, vec![10.0, 200.0]).unwrap();
		let rgb = gray.to_rgb();

		assert_eq!(rgb.channels(), 3);
		assert_eq!(rgb.to_vec(), vec![10.0, 10.0, 10.0, 200.0, 200.0, 200.0]);
	}
}
