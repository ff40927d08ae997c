use std::{collections::HashMap, path::Path};

pub const NO_REMEDY: &str = "No remedy found for this disease.";

/// Remediation notes keyed by disease name.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(transparent)]
pub struct RemedyBook(HashMap<String, String>);

impl RemedyBook {
	#[must_use]
	pub const fn new(remedies: HashMap<String, String>) -> Self {
		Self(remedies)
	}

	/// Read a JSON object of remedies. A missing or malformed file yields an empty book.
	#[must_use]
	pub fn load(path: &Path) -> Self {
		let remedies = std::fs::read_to_string(path)
			.map_err(|e| e.to_string())
			.and_then(|contents| serde_json::from_str::<Self>(&contents).map_err(|e| e.to_string()));

		match remedies {
			Ok(book) => {
				tracing::debug!("Loaded {} remedies from {}", book.0.len(), path.display());
				book
			},
			Err(e) => {
				tracing::error!("Failed to load remedies from {}: {e}", path.display());
				Self::default()
			},
		}
	}

	#[must_use]
	pub fn lookup(&self, disease: &str) -> &str {
		self.0.get(disease).map_or(NO_REMEDY, String::as_str)
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.0.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use map_macro::hash_map;

	#[test]
	fn looks_up_known_diseases() {
		let book = RemedyBook::new(hash_map! {
			"curl_virus".to_string() => "Control whitefly populations.".to_string(),
		});

		assert_eq!(book.lookup("curl_virus"), "Control whitefly populations.");
		assert_eq!(book.lookup("healthy"), NO_REMEDY);
	}

	#[test]
	fn reads_a_json_object() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("remedies.json");
		std::fs::write(&path, r#"{"bacterial_blight": "Use copper sprays."}"#).unwrap();

		let book = RemedyBook::load(&path);

		assert_eq!(book.len(), 1);
		assert_eq!(book.lookup("bacterial_blight"), "Use copper sprays.");
	}

	#[test]
	fn unreadable_files_give_an_empty_book() {
		let dir = tempfile::tempdir().unwrap();
		let malformed = dir.path().join("remedies.json");
		std::fs::write(&malformed, "[1, 2, 3]").unwrap();

		assert!(RemedyBook::load(&malformed).is_empty());
		assert!(RemedyBook::load(&dir.path().join("missing.json")).is_empty());
	}
}
