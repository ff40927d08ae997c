use image::{imageops::FilterType, io::Reader as ImageReader, DynamicImage};
use leafcam_core::{Error, ImageTensor, Result, TrainedModel};
use std::{io, path::Path};

/// Decodes image files into model-ready tensors.
///
/// Images are converted to RGB and resized with bilinear interpolation to exactly the model's
/// input size, ignoring aspect ratio. Pixel values stay in `[0, 255]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preprocessor {
	height: usize,
	width: usize,
}

impl Preprocessor {
	#[must_use]
	pub const fn new(height: usize, width: usize) -> Self {
		Self { height, width }
	}

	#[must_use]
	pub fn for_model(model: &dyn TrainedModel) -> Self {
		let (height, width) = model.input_shape();

		Self::new(height, width)
	}

	#[must_use]
	pub const fn shape(&self) -> (usize, usize) {
		(self.height, self.width)
	}

	/// Load and preprocess an image file.
	///
	/// # Errors
	///
	/// Returns [`Error::NotFound`] if the path does not exist, or [`Error::Decode`] if the file is not a readable image.
	pub fn preprocess(&self, path: &Path) -> Result<ImageTensor> {
		let image = Self::decode(path)?;
		tracing::debug!(
			"Decoded {} ({}x{}), resizing to {}x{}",
			path.display(),
			image.width(),
			image.height(),
			self.width,
			self.height
		);

		self.to_tensor(&image)
	}

	/// Resize an already decoded image.
	///
	/// # Errors
	///
	/// Returns [`Error::Shape`] if the target size is zero.
	pub fn to_tensor(&self, image: &DynamicImage) -> Result<ImageTensor> {
		let width = u32::try_from(self.width).map_err(|e| Error::Shape(e.to_string()))?;
		let height = u32::try_from(self.height).map_err(|e| Error::Shape(e.to_string()))?;

		let rgb = image.to_rgb32f();
		let resized = image::imageops::resize(&rgb, width, height, FilterType::Triangle);

		let pixels = resized.into_raw().into_iter().map(|v| v * 255.0).collect();

		ImageTensor::from_pixels(self.height, self.width, 3, pixels)
	}

	fn decode(path: &Path) -> Result<DynamicImage> {
		let reader = ImageReader::open(path).map_err(|e| match e.kind() {
			io::ErrorKind::NotFound => Error::NotFound(path.to_path_buf()),
			_ => Error::Io(e),
		})?;

		let decode_error = |reason: String| Error::Decode {
			path: path.to_path_buf(),
			reason,
		};

		reader
			.with_guessed_format()
			.map_err(|e| decode_error(e.to_string()))?
			.decode()
			.map_err(|e| decode_error(e.to_string()))
	}
}
