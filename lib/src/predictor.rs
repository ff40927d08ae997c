use leafcam_core::{ClassNameTable, DiagnosisRecord, ImageTensor, Result, TrainedModel};
use std::sync::Arc;

pub const DEFAULT_PLANT_TYPE: &str = "Cotton Plant";

/// Turns model output into a [`DiagnosisRecord`].
#[derive(Clone)]
pub struct DiseasePredictor {
	model: Arc<dyn TrainedModel>,
	classes: ClassNameTable,
	plant_type: String,
}

impl DiseasePredictor {
	pub fn new(
		model: Arc<dyn TrainedModel>,
		classes: ClassNameTable,
		plant_type: impl Into<String>,
	) -> Self {
		if classes.len() != model.num_classes() {
			tracing::warn!(
				"Class table has {} entries but the model predicts {} classes; predictions will fail",
				classes.len(),
				model.num_classes()
			);
		}

		Self {
			model,
			classes,
			plant_type: plant_type.into(),
		}
	}

	/// Run the model once and describe its most probable class.
	///
	/// Ties between equally probable classes resolve to the lowest index.
	///
	/// # Errors
	///
	/// Returns [`leafcam_core::Error::Inference`] if the model output does not line up with the class table,
	/// or any error raised by the model itself.
	pub fn predict(&self, image: &ImageTensor) -> Result<DiagnosisRecord> {
		let probabilities = self.model.forward(image)?;
		let record = DiagnosisRecord::from_probabilities(&*self.plant_type, &self.classes, probabilities)?;

		tracing::debug!(
			"Predicted {} with confidence {:.4} ({})",
			record.disease,
			record.confidence,
			record.severity
		);

		Ok(record)
	}
}
