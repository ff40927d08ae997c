use mime_guess::Mime;
use std::{
	env::temp_dir,
	path::{Path, PathBuf},
	str::FromStr,
};
use uuid::Uuid;

/// An uploaded file spooled to the temp directory. The file is removed when this is dropped.
#[derive(Debug)]
pub struct Upload {
	path: PathBuf,
	file_name: String,
}

impl Upload {
	/// Write `bytes` to a uniquely named temp file, keeping `file_name` for the record.
	///
	/// # Errors
	///
	/// Returns an error if the temp file cannot be written.
	pub fn from_bytes(bytes: &[u8], file_name: Option<String>) -> std::io::Result<Self> {
		let extension = Self::extension(bytes, file_name.as_deref());
		let path = temp_dir().join(format!("{}.{extension}", Uuid::new_v4()));

		std::fs::write(&path, bytes)?;
		tracing::debug!("Spooled {} byte upload to {}", bytes.len(), path.display());

		let file_name = file_name
			.filter(|name| !name.trim().is_empty())
			.unwrap_or_else(|| path.file_name().map_or_else(String::new, |n| n.to_string_lossy().into_owned()));

		Ok(Self { path, file_name })
	}

	/// Sniffed from the content, else taken from the client's file name.
	fn extension(bytes: &[u8], file_name: Option<&str>) -> String {
		Mime::from_str(tree_magic_mini::from_u8(bytes))
			.ok()
			.and_then(|mime| mime_guess::get_mime_extensions(&mime))
			.and_then(|extensions| extensions.last())
			.map(ToString::to_string)
			.or_else(|| {
				file_name
					.map(Path::new)
					.and_then(Path::extension)
					.map(|ext| ext.to_string_lossy().to_lowercase())
			})
			.unwrap_or_else(|| "bin".to_string())
	}

	#[must_use]
	pub fn path(&self) -> &Path {
		&self.path
	}

	/// The name the client uploaded the file under.
	#[must_use]
	pub fn file_name(&self) -> &str {
		&self.file_name
	}
}

impl Drop for Upload {
	fn drop(&mut self) {
		tracing::debug!("Removing temporary file at path {:?}", self.path);

		if let Err(e) = std::fs::remove_file(&self.path) {
			tracing::warn!("Failed to remove {}: {e}", self.path.display());
		}
	}
}
