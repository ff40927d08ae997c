use indoc::formatdoc;
use leafcam_core::{http::EnvironmentalContext, http::Reading, DiagnosisRecord};

const UNKNOWN: &str = "unknown";

/// Ask for a remediation plan covering the diagnosis and the conditions it was made in.
#[must_use]
pub fn generate_prompt(record: &DiagnosisRecord, env: &EnvironmentalContext) -> String {
	let field = |reading: &Option<Reading>| {
		reading
			.as_ref()
			.map_or_else(|| UNKNOWN.to_string(), ToString::to_string)
	};

	formatdoc! {"
		As a cotton plant pathologist, provide comprehensive recommendations for:

		- Affected Crop: Cotton ({plant_type})
		- Disease Identified: {disease}
		- Infection Severity: {severity}
		- Diagnostic Confidence: {confidence:.1}%
		- Environmental Context:
		  * Location: {location}
		  * Temperature: {temp}°C
		  * Humidity: {humidity}%
		  * Soil Conditions: {soil}
		  * Recent Weather: {weather}

		Provide recommendations addressing:
		1. Immediate containment protocols
		2. Approved fungicides/bactericides with application rates
		3. Cultural management practices
		4. Soil treatment recommendations
		5. Long-term crop rotation strategies
		6. Expected recovery progression
		7. Quarantine measures if needed
		",
		plant_type = record.plant_type,
		disease = record.disease,
		severity = record.severity,
		confidence = record.confidence * 100.0,
		location = field(&env.location),
		temp = field(&env.temp),
		humidity = field(&env.humidity),
		soil = field(&env.soil_status),
		weather = field(&env.weather),
	}
}
