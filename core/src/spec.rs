use ndarray::Array4;

use crate::{ImageTensor, Result};

/// Which output the explanation should be computed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TargetClass {
	/// The most probable class, as resolved by [`crate::top_class`].
	#[default]
	Top,
	/// A fixed output index.
	Index(usize),
}

/// Everything recorded by a single forward and backward pass through a named layer.
#[derive(Debug, Clone)]
pub struct LayerTrace {
	/// Output of the traced layer, `(1, h, w, c)`.
	pub activations: Array4<f32>,
	/// Gradient of the target class score with respect to `activations`, `(1, h, w, c)`.
	pub gradients: Array4<f32>,
	/// Model output from the same pass.
	pub probabilities: Vec<f32>,
	/// The class the gradients were computed for.
	pub class_index: usize,
}

/// A loaded, read-only image classifier.
///
/// Implementations must not mutate their parameters during inference. Calls may arrive from any
/// thread; implementations that cannot run concurrently are expected to serialize internally.
pub trait TrainedModel: Send + Sync {
	/// Spatial input size as `(height, width)`.
	fn input_shape(&self) -> (usize, usize);

	/// Length of the probability vector returned by [`TrainedModel::forward`].
	fn num_classes(&self) -> usize;

	/// Names of the layers that can be traced, in graph order.
	fn layer_names(&self) -> Vec<String>;

	/// Run inference on a single image
	///
	/// # Errors
	///
	/// Returns an error if the image does not match the model's input shape or inference fails.
	fn forward(&self, image: &ImageTensor) -> Result<Vec<f32>>;

	/// Run one forward pass recording `layer`, then backpropagate the target class score to it.
	///
	/// # Errors
	///
	/// Returns [`crate::Error::LayerNotFound`] if `layer` is not one of [`TrainedModel::layer_names`],
	/// or [`crate::Error::Inference`] if the target class is out of range or the pass fails.
	fn trace(&self, image: &ImageTensor, layer: &str, target: TargetClass) -> Result<LayerTrace>;
}
