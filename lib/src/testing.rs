use leafcam_core::{
	top_class, ClassNameTable, Error, ImageTensor, LayerTrace, Result, TargetClass, TrainedModel,
};
use ndarray::Array4;

pub const LAYER: &str = "conv2d_2";

pub fn classes() -> ClassNameTable {
	ClassNameTable::new(
		[
			"bacterial_blight",
			"curl_virus",
			"fusarium_wilt",
			"healthy",
		]
		.map(String::from)
		.to_vec(),
	)
}

/// A model with fixed outputs, for exercising everything downstream of inference.
#[derive(Debug, Clone)]
pub struct StubModel {
	pub input: (usize, usize),
	pub probabilities: Vec<f32>,
	pub activations: Array4<f32>,
	pub gradients: Array4<f32>,
}

impl Default for StubModel {
	fn default() -> Self {
		// 2x2 layer, 2 channels. Channel 0 gets weight 0.5, channel 1 weight -0.25.
		let activations = Array4::from_shape_vec(
			(1, 2, 2, 2),
			vec![1.0, 0.0, 2.0, 1.0, 0.0, 4.0, 4.0, 0.0],
		)
		.unwrap();
		let gradients = Array4::from_shape_vec(
			(1, 2, 2, 2),
			vec![0.5, -0.25, 0.5, -0.25, 0.5, -0.25, 0.5, -0.25],
		)
		.unwrap();

		Self {
			input: (8, 12),
			probabilities: vec![0.05, 0.08, 0.82, 0.05],
			activations,
			gradients,
		}
	}
}

impl StubModel {
	pub fn with_gradients(gradients: Array4<f32>) -> Self {
		Self {
			gradients,
			..Self::default()
		}
	}

	pub fn image() -> ImageTensor {
		let (height, width) = Self::default().input;
		let pixels = (0..height * width * 3)
			.map(|i| (i % 256) as f32)
			.collect();

		ImageTensor::from_pixels(height, width, 3, pixels).unwrap()
	}
}

impl TrainedModel for StubModel {
	fn input_shape(&self) -> (usize, usize) {
		self.input
	}

	fn num_classes(&self) -> usize {
		self.probabilities.len()
	}

	fn layer_names(&self) -> Vec<String> {
		vec!["conv2d".to_string(), "conv2d_1".to_string(), LAYER.to_string()]
	}

	fn forward(&self, _image: &ImageTensor) -> Result<Vec<f32>> {
		Ok(self.probabilities.clone())
	}

	fn trace(&self, _image: &ImageTensor, layer: &str, target: TargetClass) -> Result<LayerTrace> {
		if layer != LAYER {
			return Err(Error::LayerNotFound {
				layer: layer.to_string(),
				available: self.layer_names(),
			});
		}

		let class_index = match target {
			TargetClass::Top => top_class(&self.probabilities)
				.ok_or_else(|| Error::Inference("no classes".to_string()))?
				.0,
			TargetClass::Index(index) => index,
		};

		Ok(LayerTrace {
			class_index,
			activations: self.activations.clone(),
			gradients: self.gradients.clone(),
			probabilities: self.probabilities.clone(),
		})
	}
}
