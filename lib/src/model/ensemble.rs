//! Multi-branch CNN ensemble for cotton leaf classification.
//!
//! A small custom CNN runs next to several backbone feature extractors, each fed its own
//! normalisation of the raw `[0, 255]` input. Every branch is globally average pooled, the
//! features are concatenated and a dense head produces class probabilities.

use burn::{
	config::Config,
	module::{Module, Param},
	nn::{
		conv::{Conv2d, Conv2dConfig},
		pool::{MaxPool2d, MaxPool2dConfig},
		Linear, LinearConfig, PaddingConfig2d,
	},
	tensor::{
		activation::{relu, softmax},
		backend::Backend,
		Tensor, TensorData,
	},
};
use serde::{Deserialize, Serialize};

/// Variance epsilon used by the batch normalisation layers.
const NORM_EPSILON: f64 = 1e-3;

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];
const CAFFE_MEAN_BGR: [f32; 3] = [103.939, 116.779, 123.68];

/// How a branch normalises the raw `[0, 255]` RGB input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputScaling {
	/// Divide by 255.
	Unit,
	/// Swap to BGR and subtract the ImageNet channel means (VGG, ResNet).
	Caffe,
	/// Divide by 255, then standardise with the ImageNet mean and std (DenseNet).
	Torch,
}

impl InputScaling {
	/// The scaling as `y = M x + b` over the channel axis, returned as (`M`, `b`).
	#[must_use]
	pub fn affine(self) -> ([[f32; 3]; 3], [f32; 3]) {
		let diagonal = |scale: [f32; 3]| {
			[
				[scale[0], 0.0, 0.0],
				[0.0, scale[1], 0.0],
				[0.0, 0.0, scale[2]],
			]
		};

		match self {
			Self::Unit => (diagonal([1.0 / 255.0; 3]), [0.0; 3]),
			Self::Caffe => (
				[[0.0, 0.0, 1.0], [0.0, 1.0, 0.0], [1.0, 0.0, 0.0]],
				CAFFE_MEAN_BGR.map(|m| -m),
			),
			Self::Torch => {
				let scale = [0, 1, 2].map(|c| 1.0 / (255.0 * IMAGENET_STD[c]));
				let bias = [0, 1, 2].map(|c| -IMAGENET_MEAN[c] / IMAGENET_STD[c]);

				(diagonal(scale), bias)
			},
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackboneConfig {
	/// Prefix of this branch's layer names.
	pub name: String,
	pub scaling: InputScaling,
	/// Output channels of each convolutional block.
	pub filters: Vec<usize>,
}

impl BackboneConfig {
	pub fn new(name: impl Into<String>, scaling: InputScaling, filters: Vec<usize>) -> Self {
		Self {
			name: name.into(),
			scaling,
			filters,
		}
	}
}

/// The three pretrained extractors of the reference ensemble, at reduced width.
#[must_use]
pub fn default_backbones() -> Vec<BackboneConfig> {
	vec![
		BackboneConfig::new("vgg16", InputScaling::Caffe, vec![64, 128, 256, 512, 512]),
		BackboneConfig::new("densenet121", InputScaling::Torch, vec![64, 128, 256, 512, 1024]),
		BackboneConfig::new("resnet50", InputScaling::Caffe, vec![64, 256, 512, 1024, 2048]),
	]
}

#[derive(Config, Debug)]
pub struct CottonEnsembleConfig {
	/// Number of output classes
	pub num_classes: usize,
	/// Input height in pixels
	#[config(default = 256)]
	pub height: usize,
	/// Input width in pixels
	#[config(default = 256)]
	pub width: usize,
	/// Filters of the custom branch's blocks
	#[config(default = "vec![32, 64, 128]")]
	pub custom_filters: Vec<usize>,
	/// Backbone branches
	#[config(default = "default_backbones()")]
	pub backbones: Vec<BackboneConfig>,
	/// Width of the hidden dense layers
	#[config(default = "vec![1024, 512]")]
	pub hidden: Vec<usize>,
}

/// Position of a convolutional block: branch 0 is the custom CNN, backbones follow in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerId {
	pub branch: usize,
	pub block: usize,
}

impl CottonEnsembleConfig {
	/// Names of every convolutional block, paired with its position.
	///
	/// Custom blocks are `conv2d`, `conv2d_1`, `conv2d_2`, ...; backbone blocks are `<backbone>/block<k>`.
	#[must_use]
	pub fn layers(&self) -> Vec<(String, LayerId)> {
		let custom = (0..self.custom_filters.len()).map(|block| {
			let name = if block == 0 {
				"conv2d".to_string()
			} else {
				format!("conv2d_{block}")
			};

			(name, LayerId { branch: 0, block })
		});

		let backbones = self
			.backbones
			.iter()
			.enumerate()
			.flat_map(|(index, backbone)| {
				(0..backbone.filters.len()).map(move |block| {
					(
						format!("{}/block{}", backbone.name, block + 1),
						LayerId {
							branch: index + 1,
							block,
						},
					)
				})
			});

		custom.chain(backbones).collect()
	}

	/// Build a model with freshly initialised weights.
	pub fn init<B: Backend>(&self, device: &B::Device) -> CottonEnsemble<B> {
		let custom = Branch::new(InputScaling::Unit, &self.custom_filters, device);
		let backbones = self
			.backbones
			.iter()
			.map(|backbone| Branch::new(backbone.scaling, &backbone.filters, device));

		let branches: Vec<Branch<B>> = std::iter::once(custom).chain(backbones).collect();

		let features: usize = std::iter::once(&self.custom_filters)
			.chain(self.backbones.iter().map(|b| &b.filters))
			.map(|filters| filters.last().copied().unwrap_or(3))
			.sum();

		let mut width = features;
		let hidden = self
			.hidden
			.iter()
			.map(|&units| {
				let layer = LinearConfig::new(width, units).init(device);
				width = units;
				layer
			})
			.collect();

		CottonEnsemble {
			branches,
			hidden,
			classifier: LinearConfig::new(width, self.num_classes).init(device),
		}
	}
}

/// Fixed per-channel affine transform applied to the raw input.
#[derive(Module, Debug)]
pub struct ColorTransform<B: Backend> {
	matrix: Param<Tensor<B, 2>>,
	bias: Param<Tensor<B, 1>>,
}

impl<B: Backend> ColorTransform<B> {
	fn new(scaling: InputScaling, device: &B::Device) -> Self {
		let (matrix, bias) = scaling.affine();
		let matrix = TensorData::new(matrix.concat(), [3, 3]);
		let bias = TensorData::new(bias.to_vec(), [3]);

		Self {
			matrix: Param::from_tensor(Tensor::from_data(matrix, device)),
			bias: Param::from_tensor(Tensor::from_data(bias, device)),
		}
	}

	fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
		let [n, c, h, w] = x.dims();
		let pixels = x.permute([0, 2, 3, 1]).reshape([n * h * w, c]);
		let mixed = pixels.matmul(self.matrix.val().transpose()) + self.bias.val().reshape([1, c]);

		mixed.reshape([n, h, w, c]).permute([0, 3, 1, 2])
	}
}

/// Batch normalisation with stored statistics only.
///
/// Behaves identically on every backend, so a gradient-tracking pass reproduces inference exactly.
#[derive(Module, Debug)]
pub struct FrozenNorm<B: Backend> {
	gamma: Param<Tensor<B, 1>>,
	beta: Param<Tensor<B, 1>>,
	mean: Param<Tensor<B, 1>>,
	variance: Param<Tensor<B, 1>>,
}

impl<B: Backend> FrozenNorm<B> {
	fn new(channels: usize, device: &B::Device) -> Self {
		Self {
			gamma: Param::from_tensor(Tensor::ones([channels], device)),
			beta: Param::from_tensor(Tensor::zeros([channels], device)),
			mean: Param::from_tensor(Tensor::zeros([channels], device)),
			variance: Param::from_tensor(Tensor::ones([channels], device)),
		}
	}

	fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
		let [_, channels, _, _] = x.dims();
		let shape = [1, channels, 1, 1];

		let scale = self.gamma.val() / self.variance.val().add_scalar(NORM_EPSILON).sqrt();
		let shift = self.beta.val() - self.mean.val() * scale.clone();

		x * scale.reshape(shape) + shift.reshape(shape)
	}
}

/// Conv (3x3, same padding) with ReLU, then normalisation and 2x2 max pooling.
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
	conv: Conv2d<B>,
	norm: FrozenNorm<B>,
	pool: MaxPool2d,
}

impl<B: Backend> ConvBlock<B> {
	fn new(in_channels: usize, out_channels: usize, device: &B::Device) -> Self {
		Self {
			conv: Conv2dConfig::new([in_channels, out_channels], [3, 3])
				.with_padding(PaddingConfig2d::Same)
				.init(device),
			norm: FrozenNorm::new(out_channels, device),
			pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
		}
	}

	/// The hook sees (and may replace) the activated convolution output.
	fn forward<F>(&self, x: Tensor<B, 4>, id: LayerId, hook: &mut F) -> Tensor<B, 4>
	where
		F: FnMut(LayerId, Tensor<B, 4>) -> Tensor<B, 4>,
	{
		let activation = hook(id, relu(self.conv.forward(x)));

		self.pool.forward(self.norm.forward(activation))
	}
}

#[derive(Module, Debug)]
pub struct Branch<B: Backend> {
	color: ColorTransform<B>,
	blocks: Vec<ConvBlock<B>>,
}

impl<B: Backend> Branch<B> {
	fn new(scaling: InputScaling, filters: &[usize], device: &B::Device) -> Self {
		let mut in_channels = 3;
		let blocks = filters
			.iter()
			.map(|&out_channels| {
				let block = ConvBlock::new(in_channels, out_channels, device);
				in_channels = out_channels;
				block
			})
			.collect();

		Self {
			color: ColorTransform::new(scaling, device),
			blocks,
		}
	}

	/// Pooled features, `[batch, channels]`.
	fn forward<F>(&self, input: Tensor<B, 4>, branch: usize, hook: &mut F) -> Tensor<B, 2>
	where
		F: FnMut(LayerId, Tensor<B, 4>) -> Tensor<B, 4>,
	{
		let mut x = self.color.forward(input);
		for (block, layer) in self.blocks.iter().enumerate() {
			x = layer.forward(x, LayerId { branch, block }, hook);
		}

		let [n, c, _, _] = x.dims();
		x.mean_dim(3).mean_dim(2).reshape([n, c])
	}
}

#[derive(Module, Debug)]
pub struct CottonEnsemble<B: Backend> {
	branches: Vec<Branch<B>>,
	hidden: Vec<Linear<B>>,
	classifier: Linear<B>,
}

impl<B: Backend> CottonEnsemble<B> {
	/// Class probabilities for a `[batch, 3, height, width]` input.
	pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
		self.forward_hooked(input, &mut |_, activation| activation)
	}

	/// Like [`CottonEnsemble::forward`], routing every convolutional block's activation through `hook`.
	pub fn forward_hooked<F>(&self, input: Tensor<B, 4>, hook: &mut F) -> Tensor<B, 2>
	where
		F: FnMut(LayerId, Tensor<B, 4>) -> Tensor<B, 4>,
	{
		let features = self
			.branches
			.iter()
			.enumerate()
			.map(|(branch, layer)| layer.forward(input.clone(), branch, hook))
			.collect::<Vec<_>>();

		let mut x = Tensor::cat(features, 1);
		for layer in &self.hidden {
			x = relu(layer.forward(x));
		}

		softmax(self.classifier.forward(x), 1)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::model::tests::tiny_config;
	use burn::backend::NdArray;

	type TestBackend = NdArray;

	#[test]
	fn names_layers_like_keras() {
		let names: Vec<String> = tiny_config().layers().into_iter().map(|(name, _)| name).collect();

		assert_eq!(
			names,
			vec![
				"conv2d",
				"conv2d_1",
				"conv2d_2",
				"vgg16/block1",
				"vgg16/block2",
				"densenet121/block1"
			]
		);
	}

	#[test]
	fn outputs_a_distribution_per_image() {
		let device = Default::default();
		let model = tiny_config().init::<TestBackend>(&device);

		let input = Tensor::<TestBackend, 4>::ones([2, 3, 16, 16], &device).mul_scalar(128.0);
		let output = model.forward(input);

		assert_eq!(output.dims(), [2, 4]);

		let probabilities = output.into_data().to_vec::<f32>().unwrap();
		for row in probabilities.chunks(4) {
			let sum: f32 = row.iter().sum();
			assert!((sum - 1.0).abs() < 1e-3, "row sums to {sum}");
		}
	}

	#[test]
	fn hook_sees_every_block_at_its_resolution() {
		let device = Default::default();
		let model = tiny_config().init::<TestBackend>(&device);

		let mut seen = Vec::new();
		model.forward_hooked(
			Tensor::<TestBackend, 4>::zeros([1, 3, 16, 16], &device),
			&mut |id, activation| {
				seen.push((id, activation.dims()));
				activation
			},
		);

		assert_eq!(seen.len(), 6);
		assert_eq!(seen[0], (LayerId { branch: 0, block: 0 }, [1, 4, 16, 16]));
		assert_eq!(seen[2], (LayerId { branch: 0, block: 2 }, [1, 8, 4, 4]));
		assert_eq!(seen[4], (LayerId { branch: 1, block: 1 }, [1, 4, 8, 8]));
	}

	#[test]
	fn caffe_scaling_swaps_channels_and_centres() {
		let (matrix, bias) = InputScaling::Caffe.affine();
		let rgb = [10.0, 20.0, 30.0];
		let bgr: Vec<f32> = (0..3)
			.map(|row| (0..3).map(|col| matrix[row][col] * rgb[col]).sum::<f32>() + bias[row])
			.collect();

		assert!((bgr[0] - (30.0 - 103.939)).abs() < 1e-4);
		assert!((bgr[2] - (10.0 - 123.68)).abs() < 1e-4);
	}
}
