use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::DiagnosisRecord;

/// A free-form environmental reading. Passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum Reading {
	Number(f64),
	Text(String),
	Other(Value),
}

impl fmt::Display for Reading {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Number(n) => write!(f, "{n}"),
			Self::Text(s) => f.write_str(s),
			Self::Other(v) => write!(f, "{v}"),
		}
	}
}

impl From<&str> for Reading {
	fn from(s: &str) -> Self {
		Self::Text(s.to_string())
	}
}

impl From<f64> for Reading {
	fn from(n: f64) -> Self {
		Self::Number(n)
	}
}

/// Growing conditions reported alongside a leaf photo.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct EnvironmentalContext {
	/// Place name, e.g. a district or state
	pub location: Option<Reading>,
	/// Air temperature in degrees Celsius
	pub temp: Option<Reading>,
	/// Relative humidity in percent
	pub humidity: Option<Reading>,
	/// Soil description, e.g. pH and type
	pub soil_status: Option<Reading>,
	/// Recent weather
	pub weather: Option<Reading>,
}

impl EnvironmentalContext {
	/// The location as plain text, if one was given.
	#[must_use]
	pub fn location_name(&self) -> Option<String> {
		self.location
			.as_ref()
			.map(ToString::to_string)
			.map(|s| s.trim().to_string())
			.filter(|s| !s.is_empty())
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Coordinates {
	pub latitude: f64,
	pub longitude: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DiagnoseResponse {
	/// Classifier output
	pub prediction: DiagnosisRecord,
	/// Remediation notes for the predicted disease
	pub remedy: String,
	/// Request for a remediation plan, ready to hand to a language model
	pub prompt: String,
	/// Grad-CAM overlay, base64 encoded JPEG
	pub explanation_img: String,
	/// Latitude of the reported location, when it could be geocoded
	pub latitude: Option<f64>,
	/// Longitude of the reported location, when it could be geocoded
	pub longitude: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ErrorResponse {
	pub message: String,
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn context_accepts_numbers_and_strings() {
		let context: EnvironmentalContext = serde_json::from_value(json!({
			"location": "maharashtra",
			"temp": 32,
			"humidity": "70%",
			"soil_status": "5.5pH, red soil",
			"weather": "moderate rainfall",
		}))
		.unwrap();

		assert_eq!(context.temp.as_ref().unwrap().to_string(), "32");
		assert_eq!(context.humidity.as_ref().unwrap().to_string(), "70%");
		assert_eq!(context.location_name().as_deref(), Some("maharashtra"));
	}

	#[test]
	fn context_fields_are_optional() {
		let context: EnvironmentalContext =
			serde_json::from_value(json!({ "weather": true })).unwrap();

		assert_eq!(context.location_name(), None);
		assert_eq!(context.weather.unwrap().to_string(), "true");
	}

	#[test]
	fn blank_location_has_no_name() {
		let context = EnvironmentalContext {
			location: Some("   ".into()),
			..EnvironmentalContext::default()
		};

		assert_eq!(context.location_name(), None);
	}
}
