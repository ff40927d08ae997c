use leafcam_core::{
	http::EnvironmentalContext, ClassNameTable, DiagnosisRecord, ImageTensor, Result, TrainedModel,
};
use std::{path::Path, sync::Arc};

use crate::{
	config::Settings,
	gradcam::GradCam,
	model::{Backend, BurnClassifier},
	overlay::OverlayImage,
	predictor::DiseasePredictor,
	preprocess::Preprocessor,
	prompt::generate_prompt,
};

#[derive(Debug, Clone)]
pub struct Diagnosis {
	pub record: DiagnosisRecord,
	pub overlay: OverlayImage,
	pub prompt: String,
}

/// Preprocess, predict, explain and describe a single leaf photo.
#[derive(Clone)]
pub struct Diagnoser {
	preprocessor: Preprocessor,
	predictor: DiseasePredictor,
	explainer: GradCam,
}

impl Diagnoser {
	pub fn new(
		model: Arc<dyn TrainedModel>,
		classes: ClassNameTable,
		plant_type: impl Into<String>,
		layer: impl Into<String>,
	) -> Self {
		let explainer = GradCam::new(model.clone(), layer);
		if !model.layer_names().iter().any(|name| name == explainer.layer()) {
			tracing::warn!(
				"Model has no layer named {}; explanations will fail",
				explainer.layer()
			);
		}

		Self {
			preprocessor: Preprocessor::for_model(model.as_ref()),
			predictor: DiseasePredictor::new(model, classes, plant_type),
			explainer,
		}
	}

	/// Load the model and class table named in `settings`.
	///
	/// # Errors
	///
	/// Returns [`leafcam_core::Error::NotFound`] if an artifact is missing, or
	/// [`leafcam_core::Error::ModelLoad`] if one cannot be read.
	pub fn from_settings(settings: &Settings) -> Result<Self> {
		let model = BurnClassifier::<Backend>::load(
			&settings.model.config,
			&settings.model.weights,
			Default::default(),
		)?;
		let classes = ClassNameTable::from_json_file(&settings.model.class_names)?;

		tracing::info!(
			"Loaded model with {} classes and {} explainable layers",
			classes.len(),
			model.layer_names().len()
		);

		Ok(Self::new(
			Arc::new(model),
			classes,
			settings.plant_type.clone(),
			settings.model.target_layer.clone(),
		))
	}

	/// # Errors
	///
	/// Returns any error raised while decoding, predicting or explaining.
	pub fn diagnose(&self, image_path: &Path, env: &EnvironmentalContext) -> Result<Diagnosis> {
		let image = self.preprocessor.preprocess(image_path)?;

		self.diagnose_tensor(&image, env)
	}

	/// Like [`Diagnoser::diagnose`], for an image that is already preprocessed.
	///
	/// # Errors
	///
	/// Returns any error raised while predicting or explaining.
	pub fn diagnose_tensor(&self, image: &ImageTensor, env: &EnvironmentalContext) -> Result<Diagnosis> {
		let record = self.predictor.predict(image)?;
		let overlay = self.explainer.explain(image)?;
		let prompt = generate_prompt(&record, env);

		Ok(Diagnosis {
			record,
			overlay,
			prompt,
		})
	}
}
