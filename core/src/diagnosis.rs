use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::{fmt, fs, io, path::Path};

use crate::{Error, Result};

/// Ordinal bucket for a prediction's confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
pub enum Severity {
	Low,
	Mild,
	Moderate,
	Severe,
	Critical,
}

impl Severity {
	/// Checked highest first. A confidence equal to a threshold falls into the band below it.
	const THRESHOLDS: [(f32, Self); 4] = [
		(0.9, Self::Critical),
		(0.7, Self::Severe),
		(0.5, Self::Moderate),
		(0.3, Self::Mild),
	];

	#[must_use]
	pub fn from_confidence(confidence: f32) -> Self {
		Self::THRESHOLDS
			.iter()
			.find(|(threshold, _)| confidence > *threshold)
			.map_or(Self::Low, |(_, severity)| *severity)
	}

	#[must_use]
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Low => "Low",
			Self::Mild => "Mild",
			Self::Moderate => "Moderate",
			Self::Severe => "Severe",
			Self::Critical => "Critical",
		}
	}
}

impl fmt::Display for Severity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Index and value of the largest probability.
///
/// Ties go to the lowest index and NaN entries are never selected. Returns `None` when there is no
/// finite candidate. Both the predictor and the explanation engine resolve their target class here.
#[must_use]
pub fn top_class(probabilities: &[f32]) -> Option<(usize, f32)> {
	probabilities
		.iter()
		.copied()
		.enumerate()
		.filter(|(_, p)| !p.is_nan())
		.fold(None, |best, (index, p)| match best {
			Some((_, current)) if p <= current => best,
			_ => Some((index, p)),
		})
}

/// Ordered class labels; position `i` names output `i` of the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassNameTable(Vec<String>);

impl ClassNameTable {
	#[must_use]
	pub fn new(names: Vec<String>) -> Self {
		Self(names)
	}

	/// Load a JSON array of class names.
	///
	/// # Errors
	///
	/// Returns [`Error::NotFound`] if the file does not exist, or [`Error::Io`] if it cannot be read or parsed.
	pub fn from_json_file(path: &Path) -> Result<Self> {
		let contents = fs::read_to_string(path).map_err(|e| match e.kind() {
			io::ErrorKind::NotFound => Error::NotFound(path.to_path_buf()),
			_ => Error::Io(e),
		})?;

		serde_json::from_str(&contents).map_err(|e| Error::Io(e.into()))
	}

	#[must_use]
	pub fn get(&self, index: usize) -> Option<&str> {
		self.0.get(index).map(String::as_str)
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.0.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	pub fn iter(&self) -> impl Iterator<Item = &str> {
		self.0.iter().map(String::as_str)
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DiagnosisRecord {
	/// Crop the classifier was trained on
	pub plant_type: String,
	/// Name of the most probable class
	pub disease: String,
	/// Probability of the most probable class
	pub confidence: f32,
	/// Probability of every class, in class table order
	pub all_class_probabilities: Vec<f32>,
	/// Confidence bucket
	pub severity: Severity,
}

impl DiagnosisRecord {
	/// Build a record from a model's probability vector.
	///
	/// # Errors
	///
	/// Returns [`Error::Inference`] if the probability vector length does not match the class table, or has no finite entry.
	pub fn from_probabilities(
		plant_type: impl Into<String>,
		classes: &ClassNameTable,
		probabilities: Vec<f32>,
	) -> Result<Self> {
		if probabilities.len() != classes.len() {
			return Err(Error::Inference(format!(
				"model produced {} class probabilities but the class table has {} entries",
				probabilities.len(),
				classes.len()
			)));
		}

		let (index, confidence) = top_class(&probabilities).ok_or_else(|| {
			Error::Inference("model produced no usable class probabilities".to_string())
		})?;

		let disease = classes
			.get(index)
			.ok_or_else(|| Error::Inference(format!("class index {index} is out of range")))?
			.to_string();

		Ok(Self {
			disease,
			confidence,
			plant_type: plant_type.into(),
			severity: Severity::from_confidence(confidence),
			all_class_probabilities: probabilities,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn classes() -> ClassNameTable {
		ClassNameTable::new(
			["bacterial_blight", "curl_virus", "fusarium_wilt", "healthy"]
				.map(String::from)
				.to_vec(),
		)
	}

	#[test]
	fn severity_bands() {
		assert_eq!(Severity::from_confidence(1.0), Severity::Critical);
		assert_eq!(Severity::from_confidence(0.95), Severity::Critical);
		assert_eq!(Severity::from_confidence(0.82), Severity::Severe);
		assert_eq!(Severity::from_confidence(0.6), Severity::Moderate);
		assert_eq!(Severity::from_confidence(0.4), Severity::Mild);
		assert_eq!(Severity::from_confidence(0.1), Severity::Low);
		assert_eq!(Severity::from_confidence(0.0), Severity::Low);
	}

	#[test]
	fn severity_thresholds_fall_to_the_lower_band() {
		assert_eq!(Severity::from_confidence(0.9), Severity::Severe);
		assert_eq!(Severity::from_confidence(0.7), Severity::Moderate);
		assert_eq!(Severity::from_confidence(0.5), Severity::Mild);
		assert_eq!(Severity::from_confidence(0.3), Severity::Low);
	}

	#[test]
	fn severity_is_monotonic() {
		let mut previous = Severity::Low;
		for step in 0..=1000 {
			#[allow(clippy::cast_precision_loss)]
			let severity = Severity::from_confidence(step as f32 / 1000.0);

			assert!(severity >= previous, "severity decreased at step {step}");
			previous = severity;
		}
	}

	#[test]
	fn severity_is_total() {
		assert_eq!(Severity::from_confidence(f32::NAN), Severity::Low);
		assert_eq!(Severity::from_confidence(-1.0), Severity::Low);
		assert_eq!(Severity::from_confidence(f32::INFINITY), Severity::Critical);
	}

	#[test]
	fn severity_serializes_as_label() {
		assert_eq!(
			serde_json::to_value(Severity::Severe).unwrap(),
			serde_json::json!("Severe")
		);
	}

	#[test]
	fn top_class_prefers_lowest_index_on_ties() {
		assert_eq!(top_class(&[0.1, 0.4, 0.4, 0.1]), Some((1, 0.4)));
		assert_eq!(top_class(&[0.25; 4]), Some((0, 0.25)));
	}

	#[test]
	fn top_class_skips_nan() {
		assert_eq!(top_class(&[f32::NAN, 0.2, 0.1]), Some((1, 0.2)));
		assert_eq!(top_class(&[f32::NAN]), None);
		assert_eq!(top_class(&[]), None);
	}

	#[test]
	fn record_uses_the_top_class() {
		let record = DiagnosisRecord::from_probabilities(
			"Cotton Plant",
			&classes(),
			vec![0.05, 0.08, 0.82, 0.05],
		)
		.unwrap();

		assert_eq!(record.disease, "fusarium_wilt");
		assert!((record.confidence - 0.82).abs() < f32::EPSILON);
		assert_eq!(record.severity, Severity::Severe);
		assert_eq!(record.plant_type, "Cotton Plant");
	}

	#[test]
	fn record_rejects_mismatched_class_table() {
		let err = DiagnosisRecord::from_probabilities("Cotton Plant", &classes(), vec![0.5, 0.5])
			.unwrap_err();

		assert!(matches!(err, Error::Inference(_)));
	}

	#[test]
	fn class_table_loads_from_json() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("class_names.json");
		fs::write(&path, r#"["bacterial_blight", "healthy"]"#).unwrap();

		let table = ClassNameTable::from_json_file(&path).unwrap();

		assert_eq!(table.len(), 2);
		assert_eq!(table.get(1), Some("healthy"));
		assert_eq!(table.get(2), None);
	}

	#[test]
	fn missing_class_table_is_not_found() {
		let dir = tempfile::tempdir().unwrap();
		let err = ClassNameTable::from_json_file(&dir.path().join("missing.json")).unwrap_err();

		assert!(matches!(err, Error::NotFound(_)));
	}
}
