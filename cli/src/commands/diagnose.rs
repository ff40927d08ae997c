use anyhow::{Context, Result};
use leafcam::{remedies::RemedyBook, Diagnoser, Settings};
use leafcam_core::http::EnvironmentalContext;
use serde_json::json;
use std::path::{Path, PathBuf};

pub fn handle(
	settings: &Settings,
	image: &Path,
	env: Option<String>,
	env_file: Option<PathBuf>,
	output: &Path,
) -> Result<()> {
	let env = read_env(env, env_file)?;
	let diagnoser = Diagnoser::from_settings(settings).context("Failed to load model")?;

	let diagnosis = diagnoser
		.diagnose(image, &env)
		.with_context(|| format!("Failed to diagnose {}", image.display()))?;

	diagnosis
		.overlay
		.save(output)
		.with_context(|| format!("Failed to write explanation to {}", output.display()))?;
	tracing::info!("Wrote explanation to {}", output.display());

	let remedies = RemedyBook::load(&settings.remedies);
	println!(
		"{}",
		serde_json::to_string_pretty(&json!({
			"prediction": diagnosis.record,
			"remedy": remedies.lookup(&diagnosis.record.disease),
		}))?
	);
	println!("\n{}", diagnosis.prompt);

	Ok(())
}

fn read_env(env: Option<String>, env_file: Option<PathBuf>) -> Result<EnvironmentalContext> {
	let raw = match (env, env_file) {
		(Some(raw), _) => raw,
		(None, Some(path)) => std::fs::read_to_string(&path)
			.with_context(|| format!("Failed to read {}", path.display()))?,
		(None, None) => return Ok(EnvironmentalContext::default()),
	};

	serde_json::from_str(&raw).context("Invalid JSON format for environmental context")
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn env_defaults_to_empty() {
		assert_eq!(read_env(None, None).unwrap(), EnvironmentalContext::default());
	}

	#[test]
	fn env_is_read_from_a_file() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("env.json");
		std::fs::write(&path, r#"{"location": "Akola", "temp": 31.5}"#).unwrap();

		let env = read_env(None, Some(path)).unwrap();

		assert_eq!(env.location_name().as_deref(), Some("Akola"));
		assert_eq!(env.temp.unwrap().to_string(), "31.5");
	}

	#[test]
	fn malformed_env_is_rejected() {
		assert!(read_env(Some("{oops".to_string()), None).is_err());
	}
}
