use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
	path::{Path, PathBuf},
	time::Duration,
};
use url::Url;

use crate::{gradcam::DEFAULT_TARGET_LAYER, predictor::DEFAULT_PLANT_TYPE};

const FILE_NAME: &str = "leafcam.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
	/// Architecture description written by the training job
	pub config: PathBuf,
	/// Trained weights
	pub weights: PathBuf,
	/// JSON array of class names, ordered like the model output
	pub class_names: PathBuf,
	/// Layer explained with Grad-CAM
	pub target_layer: String,
}

impl Default for ModelSettings {
	fn default() -> Self {
		Self {
			config: PathBuf::from("model/model.json"),
			weights: PathBuf::from("model/weights.mpk"),
			class_names: PathBuf::from("model/class_names.json"),
			target_layer: DEFAULT_TARGET_LAYER.to_string(),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeocoderSettings {
	pub base_url: Url,
	/// Nominatim rejects requests without an identifying user agent.
	pub user_agent: String,
	/// Seconds to wait for a lookup before giving up on coordinates
	pub timeout_secs: u64,
}

impl GeocoderSettings {
	#[must_use]
	pub const fn timeout(&self) -> Duration {
		Duration::from_secs(self.timeout_secs)
	}
}

impl Default for GeocoderSettings {
	fn default() -> Self {
		Self {
			base_url: Url::parse("https://nominatim.openstreetmap.org/").expect("valid url"),
			user_agent: format!("leafcam/{}", env!("CARGO_PKG_VERSION")),
			timeout_secs: 10,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
	pub port: u16,
	pub plant_type: String,
	/// JSON object mapping disease names to remedies
	pub remedies: PathBuf,
	/// Diagnoses allowed to wait for the worker before requests are turned away
	pub queue_depth: usize,
	pub max_upload_bytes: usize,
	/// Diagnoses are only stored when this is set
	pub database_url: Option<String>,
	pub model: ModelSettings,
	pub geocoder: GeocoderSettings,
}

impl Default for Settings {
	fn default() -> Self {
		Self {
			port: 5000,
			plant_type: DEFAULT_PLANT_TYPE.to_string(),
			remedies: PathBuf::from("remedies.json"),
			queue_depth: 4,
			max_upload_bytes: 16 * 1024 * 1024,
			database_url: None,
			model: ModelSettings::default(),
			geocoder: GeocoderSettings::default(),
		}
	}
}

impl Settings {
	/// Read settings from `path`, or from the first default location that exists.
	/// Without a file every setting takes its default.
	///
	/// # Errors
	///
	/// Returns an error if an explicitly given file is missing, or if a settings file cannot be parsed.
	pub fn load(path: Option<&Path>) -> Result<Self> {
		let path = match path {
			Some(path) => path.to_path_buf(),
			None => match Self::default_path() {
				Some(path) => path,
				None => {
					tracing::debug!("No {FILE_NAME} found, using default settings");
					return Ok(Self::default());
				},
			},
		};

		let contents = std::fs::read_to_string(&path)
			.with_context(|| format!("Failed to read settings from {}", path.display()))?;

		tracing::debug!("Loading settings from {}", path.display());
		Self::from_toml(&contents).with_context(|| format!("Invalid settings in {}", path.display()))
	}

	/// # Errors
	///
	/// Returns an error if `contents` is not valid TOML for these settings.
	pub fn from_toml(contents: &str) -> Result<Self> {
		Ok(toml::from_str(contents)?)
	}

	/// `leafcam.toml` in the working directory, else in the user's config directory.
	#[must_use]
	pub fn default_path() -> Option<PathBuf> {
		let local = PathBuf::from(FILE_NAME);
		if local.exists() {
			return Some(local);
		}

		dirs::config_dir()
			.map(|dir| dir.join("leafcam").join(FILE_NAME))
			.filter(|path| path.exists())
	}
}
