//! Gradient-weighted class activation mapping.
//!
//! The target class score is backpropagated to a convolutional layer, the gradients are averaged
//! per channel, and the channel-weighted sum of that layer's activations shows where the model
//! looked. Only positive evidence is kept, normalised to `[0, 1]` and stretched over the input.

use image::{imageops::FilterType, ImageBuffer, Luma};
use leafcam_core::{Error, ImageTensor, LayerTrace, Result, TargetClass, TrainedModel};
use ndarray::{Array1, Array2, Axis};
use std::sync::Arc;

use crate::overlay::{composite, tensor_to_rgb, OverlayImage};

/// Layer explained by default. The last convolution of the custom branch.
pub const DEFAULT_TARGET_LAYER: &str = "conv2d_2";

/// Importance scores in `[0, 1]`, indexed `(row, column)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Heatmap(Array2<f32>);

impl Heatmap {
	/// Normalise a raw activation map: negatives and non-finite values become zero, then
	/// everything is divided by the maximum. A map with no positive value stays all zero.
	#[must_use]
	pub fn normalize(mut map: Array2<f32>) -> Self {
		map.mapv_inplace(|v| if v.is_finite() { v.max(0.0) } else { 0.0 });

		let max = map.fold(0.0_f32, |max, &v| max.max(v));
		if max > 0.0 {
			map.mapv_inplace(|v| v / max);
		} else {
			map.fill(0.0);
		}

		Self(map)
	}

	#[must_use]
	pub fn height(&self) -> usize {
		self.0.nrows()
	}

	#[must_use]
	pub fn width(&self) -> usize {
		self.0.ncols()
	}

	#[must_use]
	pub const fn values(&self) -> &Array2<f32> {
		&self.0
	}

	/// Bilinear resize to `width` x `height`.
	#[must_use]
	pub fn resize(&self, width: u32, height: u32) -> Self {
		let (rows, cols) = self.0.dim();
		let (Ok(src_width), Ok(src_height)) = (u32::try_from(cols), u32::try_from(rows)) else {
			return Self(Array2::zeros((height as usize, width as usize)));
		};

		let Some(buffer) = ImageBuffer::<Luma<f32>, Vec<f32>>::from_raw(
			src_width,
			src_height,
			self.0.iter().copied().collect(),
		) else {
			return Self(Array2::zeros((height as usize, width as usize)));
		};

		let resized = image::imageops::resize(&buffer, width, height, FilterType::Triangle);
		let values = Array2::from_shape_vec((height as usize, width as usize), resized.into_raw())
			.unwrap_or_else(|_| Array2::zeros((height as usize, width as usize)));

		Self(values.mapv(|v| if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 }))
	}

	/// Quantise to 8 bits, truncating.
	#[must_use]
	#[allow(clippy::cast_possible_truncation)]
	pub fn to_luma8(&self) -> ImageBuffer<Luma<u8>, Vec<u8>> {
		let (rows, cols) = self.0.dim();

		ImageBuffer::from_fn(cols as u32, rows as u32, |x, y| {
			#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
			let level = (self.0[[y as usize, x as usize]] * 255.0) as u8;
			Luma([level])
		})
	}
}

/// Collapse a layer trace into a normalised heatmap at the layer's resolution.
///
/// # Errors
///
/// Returns [`Error::Shape`] if the activations and gradients disagree in shape.
pub fn class_activation_map(trace: &LayerTrace) -> Result<Heatmap> {
	if trace.activations.dim() != trace.gradients.dim() {
		return Err(Error::Shape(format!(
			"activations {:?} and gradients {:?} differ",
			trace.activations.dim(),
			trace.gradients.dim()
		)));
	}

	let (batch, height, width, channels) = trace.activations.dim();
	if batch == 0 || height == 0 || width == 0 || channels == 0 {
		return Ok(Heatmap(Array2::zeros((height, width))));
	}

	let weights = channel_weights(trace);
	let activations = trace.activations.index_axis(Axis(0), 0);
	let map = (&activations * &weights).sum_axis(Axis(2));

	Ok(Heatmap::normalize(map))
}

/// Mean gradient per channel over the batch and both spatial axes.
fn channel_weights(trace: &LayerTrace) -> Array1<f32> {
	let (_, _, _, channels) = trace.gradients.dim();
	let gradients = trace
		.gradients
		.mapv(|g| if g.is_finite() { g } else { 0.0 });

	gradients
		.into_shape_with_order((trace.gradients.len() / channels, channels))
		.ok()
		.and_then(|flat| flat.mean_axis(Axis(0)))
		.unwrap_or_else(|| Array1::zeros(channels))
}

#[derive(Debug, Clone)]
pub struct Explanation {
	/// Output index the heatmap explains
	pub class_index: usize,
	/// Heatmap at the input image's resolution
	pub heatmap: Heatmap,
	/// Input image blended with the coloured heatmap
	pub overlay: OverlayImage,
}

/// Grad-CAM against a fixed layer of a shared model.
#[derive(Clone)]
pub struct GradCam {
	model: Arc<dyn TrainedModel>,
	layer: String,
}

impl GradCam {
	pub fn new(model: Arc<dyn TrainedModel>, layer: impl Into<String>) -> Self {
		Self {
			model,
			layer: layer.into(),
		}
	}

	#[must_use]
	pub fn layer(&self) -> &str {
		&self.layer
	}

	/// Explain the model's most probable class.
	///
	/// # Errors
	///
	/// Returns [`Error::LayerNotFound`] if the configured layer does not exist, or any error raised by the model.
	pub fn explain(&self, image: &ImageTensor) -> Result<OverlayImage> {
		Ok(self.explain_target(image, TargetClass::Top)?.overlay)
	}

	/// Explain an arbitrary target class.
	///
	/// # Errors
	///
	/// Returns [`Error::LayerNotFound`] if the configured layer does not exist, or any error raised by the model.
	pub fn explain_target(&self, image: &ImageTensor, target: TargetClass) -> Result<Explanation> {
		let trace = self.model.trace(image, &self.layer, target)?;
		let cam = class_activation_map(&trace)?;
		tracing::debug!(
			"Computed {}x{} activation map on {} for class {}",
			cam.height(),
			cam.width(),
			self.layer,
			trace.class_index
		);

		let original = tensor_to_rgb(image);
		let heatmap = cam.resize(original.width(), original.height());
		let overlay = composite(&original, &heatmap);

		Ok(Explanation {
			class_index: trace.class_index,
			heatmap,
			overlay,
		})
	}
}

/// Grad-CAM overlay of `model`'s top class on `layer`.
///
/// # Errors
///
/// Returns [`Error::LayerNotFound`] if `layer` does not exist, or any error raised by the model.
pub fn explain(model: Arc<dyn TrainedModel>, image: &ImageTensor, layer: &str) -> Result<OverlayImage> {
	GradCam::new(model, layer).explain(image)
}
