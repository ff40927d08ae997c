use burn::{
	backend::{Autodiff, NdArray},
	config::Config,
	module::{AutodiffModule, Module},
	record::{FullPrecisionSettings, NamedMpkFileRecorder},
	tensor::{
		backend::{AutodiffBackend, Backend as BackendTrait},
		Tensor, TensorData,
	},
};
use leafcam_core::{
	top_class, Error, ImageTensor, LayerTrace, Result, TargetClass, TrainedModel,
};
use ndarray::Array4;
use std::{
	path::Path,
	sync::{Mutex, MutexGuard},
};

use super::ensemble::{CottonEnsemble, CottonEnsembleConfig, LayerId};

/// CPU backend with gradient tracking.
pub type Backend = Autodiff<NdArray>;

type Recorder = NamedMpkFileRecorder<FullPrecisionSettings>;

struct Views<B: AutodiffBackend> {
	autodiff: CottonEnsemble<B>,
	inference: CottonEnsemble<B::InnerBackend>,
}

/// A [`CottonEnsemble`] exposed through [`TrainedModel`].
pub struct BurnClassifier<B: AutodiffBackend = Backend> {
	views: Mutex<Views<B>>,
	config: CottonEnsembleConfig,
	layers: Vec<(String, LayerId)>,
	device: B::Device,
}

impl<B: AutodiffBackend> BurnClassifier<B> {
	pub fn new(config: CottonEnsembleConfig, model: CottonEnsemble<B>, device: B::Device) -> Self {
		let inference = model.valid();

		Self {
			layers: config.layers(),
			views: Mutex::new(Views {
				autodiff: model,
				inference,
			}),
			config,
			device,
		}
	}

	/// A model with freshly initialised weights.
	pub fn init(config: CottonEnsembleConfig, device: B::Device) -> Self {
		let model = config.init::<B>(&device);

		Self::new(config, model, device)
	}

	/// Load an architecture description (JSON) and its trained weights (MessagePack).
	///
	/// # Errors
	///
	/// Returns [`Error::NotFound`] if either file is missing, or [`Error::ModelLoad`] if they cannot be parsed
	/// or do not match each other.
	pub fn load(config_path: &Path, weights_path: &Path, device: B::Device) -> Result<Self> {
		for path in [config_path, weights_path] {
			if !path.exists() {
				return Err(Error::NotFound(path.to_path_buf()));
			}
		}

		let config = CottonEnsembleConfig::load(config_path).map_err(|e| {
			Error::ModelLoad(format!("invalid config {}: {e}", config_path.display()))
		})?;

		let model = config
			.init::<B>(&device)
			.load_file(weights_path, &Recorder::new(), &device)
			.map_err(|e| {
				Error::ModelLoad(format!("invalid weights {}: {e}", weights_path.display()))
			})?;

		tracing::debug!(
			"Loaded {} class model ({}x{}) from {}",
			config.num_classes,
			config.height,
			config.width,
			weights_path.display()
		);

		Ok(Self::new(config, model, device))
	}

	/// Write the architecture and weights next to each other.
	///
	/// # Errors
	///
	/// Returns an error if either file cannot be written.
	pub fn save(&self, config_path: &Path, weights_path: &Path) -> Result<()> {
		self.config.save(config_path)?;

		self.lock()?
			.autodiff
			.clone()
			.save_file(weights_path, &Recorder::new())
			.map_err(|e| Error::ModelLoad(format!("could not save weights: {e}")))
	}

	#[must_use]
	pub const fn config(&self) -> &CottonEnsembleConfig {
		&self.config
	}

	fn lock(&self) -> Result<MutexGuard<'_, Views<B>>> {
		self.views
			.lock()
			.map_err(|_| Error::Inference("model lock poisoned".to_string()))
	}

	fn layer_id(&self, layer: &str) -> Result<LayerId> {
		self.layers
			.iter()
			.find(|(name, _)| name == layer)
			.map(|(_, id)| *id)
			.ok_or_else(|| Error::LayerNotFound {
				layer: layer.to_string(),
				available: self.layer_names(),
			})
	}

	/// Lay an image out as a `[1, 3, height, width]` tensor.
	fn input<T: BackendTrait>(&self, image: &ImageTensor, device: &T::Device) -> Result<Tensor<T, 4>> {
		if (image.height(), image.width()) != self.input_shape() {
			return Err(Error::Shape(format!(
				"model expects {:?}, got {}x{}",
				self.input_shape(),
				image.height(),
				image.width()
			)));
		}

		let rgb = image.to_rgb();
		let data = TensorData::new(rgb.to_vec(), [1, rgb.height(), rgb.width(), 3]);

		Ok(Tensor::<T, 4>::from_data(data, device).permute([0, 3, 1, 2]))
	}
}

fn to_vec<T: BackendTrait, const D: usize>(tensor: Tensor<T, D>) -> Result<Vec<f32>> {
	tensor
		.into_data()
		.convert::<f32>()
		.to_vec::<f32>()
		.map_err(|e| Error::Inference(format!("unreadable tensor: {e:?}")))
}

/// Copy an `NCHW` tensor into a channels-last array.
fn to_nhwc<T: BackendTrait>(tensor: Tensor<T, 4>) -> Result<Array4<f32>> {
	let [n, c, h, w] = tensor.dims();
	let values = to_vec(tensor)?;

	let array = Array4::from_shape_vec((n, c, h, w), values)
		.map_err(|e| Error::Shape(e.to_string()))?
		.permuted_axes([0, 2, 3, 1]);

	Ok(array.as_standard_layout().into_owned())
}

impl<B: AutodiffBackend> TrainedModel for BurnClassifier<B> {
	fn input_shape(&self) -> (usize, usize) {
		(self.config.height, self.config.width)
	}

	fn num_classes(&self) -> usize {
		self.config.num_classes
	}

	fn layer_names(&self) -> Vec<String> {
		self.layers.iter().map(|(name, _)| name.clone()).collect()
	}

	fn forward(&self, image: &ImageTensor) -> Result<Vec<f32>> {
		let input = self.input::<B::InnerBackend>(image, &self.device)?;
		let views = self.lock()?;

		to_vec(views.inference.forward(input))
	}

	fn trace(&self, image: &ImageTensor, layer: &str, target: TargetClass) -> Result<LayerTrace> {
		let id = self.layer_id(layer)?;
		let input = self.input::<B>(image, &self.device)?;
		let views = self.lock()?;

		let mut captured = None;
		let output = views.autodiff.forward_hooked(input, &mut |at, activation| {
			if at != id {
				return activation;
			}

			let leaf = activation.detach().require_grad();
			captured = Some(leaf.clone());
			leaf
		});

		let probabilities = to_vec(output.clone().inner())?;
		let class_index = match target {
			TargetClass::Top => top_class(&probabilities)
				.map(|(index, _)| index)
				.ok_or_else(|| Error::Inference("model produced no finite probability".to_string()))?,
			TargetClass::Index(index) if index < probabilities.len() => index,
			TargetClass::Index(index) => {
				return Err(Error::Inference(format!(
					"class {index} is out of range for {} outputs",
					probabilities.len()
				)))
			},
		};

		let leaf = captured.ok_or_else(|| Error::Inference(format!("layer {layer} was never reached")))?;
		let grads = output
			.slice([0..1, class_index..class_index + 1])
			.sum()
			.backward();
		let gradients = leaf
			.grad(&grads)
			.ok_or_else(|| Error::Inference(format!("no gradient reached {layer}")))?;

		Ok(LayerTrace {
			activations: to_nhwc(leaf.inner())?,
			gradients: to_nhwc(gradients)?,
			probabilities,
			class_index,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{gradcam::GradCam, model::tests::tiny_config};
	use std::sync::Arc;

	fn classifier() -> BurnClassifier {
		BurnClassifier::init(tiny_config(), Default::default())
	}

	fn image() -> ImageTensor {
		let pixels = (0..16 * 16 * 3).map(|i| (i * 7 % 256) as f32).collect();
		ImageTensor::from_pixels(16, 16, 3, pixels).unwrap()
	}

	#[test]
	fn forward_yields_a_distribution() {
		let probabilities = classifier().forward(&image()).unwrap();

		assert_eq!(probabilities.len(), 4);
		assert!((probabilities.iter().sum::<f32>() - 1.0).abs() < 1e-3);
	}

	#[test]
	fn rejects_images_of_the_wrong_size() {
		let small = ImageTensor::from_pixels(8, 8, 3, vec![0.0; 8 * 8 * 3]).unwrap();

		assert!(matches!(classifier().forward(&small), Err(Error::Shape(_))));
	}

	#[test]
	fn traces_the_requested_layer() {
		let model = classifier();
		let trace = model.trace(&image(), "conv2d_1", TargetClass::Top).unwrap();

		assert_eq!(trace.activations.dim(), (1, 8, 8, 6));
		assert_eq!(trace.gradients.dim(), trace.activations.dim());
		assert_eq!(
			Some(trace.class_index),
			top_class(&trace.probabilities).map(|(index, _)| index)
		);
	}

	#[test]
	fn gradients_match_finite_differences() {
		let model = classifier();
		let image = image();
		let layer = "conv2d_2";
		let trace = model.trace(&image, layer, TargetClass::Top).unwrap();

		let id = model.layer_id(layer).unwrap();
		let (_, height, width, channels) = trace.gradients.dim();
		// Target score with `delta` added to one activation of the traced layer.
		let score = |y: usize, x: usize, c: usize, delta: f32| {
			let input = model.input::<NdArray>(&image, &model.device).unwrap();
			let shift = Tensor::<NdArray, 4>::zeros([1, channels, height, width], &model.device).slice_assign(
				[0..1, c..c + 1, y..y + 1, x..x + 1],
				Tensor::full([1, 1, 1, 1], delta, &model.device),
			);

			let views = model.lock().unwrap();
			let output = views.inference.forward_hooked(input, &mut |at, activation| {
				if at == id {
					activation + shift.clone()
				} else {
					activation
				}
			});

			to_vec(output).unwrap()[trace.class_index]
		};

		let positions: Vec<_> = trace
			.gradients
			.indexed_iter()
			.filter(|(_, gradient)| gradient.abs() > 1e-6)
			.map(|((_, y, x, c), gradient)| (y, x, c, *gradient))
			.take(12)
			.collect();
		assert!(!positions.is_empty());

		let eps = 1e-3;
		for (y, x, c, gradient) in positions {
			let numeric = (score(y, x, c, eps) - score(y, x, c, -eps)) / (2.0 * eps);

			assert!(
				(numeric - gradient).abs() < 1e-3,
				"at ({y}, {x}, {c}): autodiff {gradient}, finite difference {numeric}"
			);
		}
	}

	#[test]
	fn traced_probabilities_match_inference() {
		let model = classifier();
		let image = image();

		let forward = model.forward(&image).unwrap();
		let trace = model.trace(&image, "conv2d_2", TargetClass::Top).unwrap();

		for (a, b) in forward.iter().zip(&trace.probabilities) {
			assert!((a - b).abs() < 1e-5);
		}
	}

	#[test]
	fn unknown_layers_are_reported() {
		let err = classifier()
			.trace(&image(), "block5_conv3", TargetClass::Top)
			.unwrap_err();

		assert!(matches!(err, Error::LayerNotFound { available, .. } if available.len() == 6));
	}

	#[test]
	fn out_of_range_targets_are_rejected() {
		let err = classifier()
			.trace(&image(), "conv2d", TargetClass::Index(9))
			.unwrap_err();

		assert!(matches!(err, Error::Inference(_)));
	}

	#[test]
	fn round_trips_through_disk() {
		let dir = tempfile::tempdir().unwrap();
		let config = dir.path().join("model.json");
		let weights = dir.path().join("weights.mpk");

		let model = classifier();
		model.save(&config, &weights).unwrap();
		let loaded = BurnClassifier::<Backend>::load(&config, &weights, Default::default()).unwrap();

		let image = image();
		assert_eq!(loaded.layer_names(), model.layer_names());
		for (a, b) in model.forward(&image).unwrap().iter().zip(&loaded.forward(&image).unwrap()) {
			assert!((a - b).abs() < 1e-6);
		}
	}

	#[test]
	fn missing_artifacts_are_not_found() {
		let dir = tempfile::tempdir().unwrap();
		let missing = dir.path().join("model.json");

		let Err(err) = BurnClassifier::<Backend>::load(&missing, &missing, Default::default()) else {
			panic!("loaded a model from {}", missing.display());
		};

		assert!(matches!(err, Error::NotFound(path) if path == missing));
	}

	#[test]
	fn explains_with_grad_cam() {
		let model: Arc<dyn TrainedModel> = Arc::new(classifier());
		let overlay = GradCam::new(model, "conv2d_2").explain(&image()).unwrap();

		assert_eq!((overlay.width(), overlay.height()), (16, 16));
	}
}
