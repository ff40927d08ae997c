use anyhow::{Context, Result};
use leafcam::{
	model::{Backend, BurnClassifier},
	Settings,
};
use leafcam_core::TrainedModel;

pub fn handle(settings: &Settings) -> Result<()> {
	let model = BurnClassifier::<Backend>::load(
		&settings.model.config,
		&settings.model.weights,
		Default::default(),
	)
	.context("Failed to load model")?;

	for name in model.layer_names() {
		let marker = if name == settings.model.target_layer { " (explained)" } else { "" };
		println!("{name}{marker}");
	}

	Ok(())
}
