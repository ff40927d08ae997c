use std::path::PathBuf;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("File not found: {}", .0.display())]
	NotFound(PathBuf),

	#[error("Failed to decode image {}: {reason}", .path.display())]
	Decode { path: PathBuf, reason: String },

	#[error("Layer {layer} not found in model. Available layers: {available:?}")]
	LayerNotFound {
		layer: String,
		available: Vec<String>,
	},

	#[error("Inference failed: {0}")]
	Inference(String),

	#[error("Invalid tensor shape: {0}")]
	Shape(String),

	#[error("Failed to load model: {0}")]
	ModelLoad(String),

	#[error(transparent)]
	Io(#[from] std::io::Error),
}
