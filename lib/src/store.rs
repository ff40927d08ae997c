use chrono::{DateTime, Utc};
use leafcam_core::http::Coordinates;
use sqlx::{
	sqlite::{SqliteConnectOptions, SqlitePoolOptions},
	FromRow, SqlitePool,
};
use std::str::FromStr;

const SCHEMA: [&str; 3] = [
	"CREATE TABLE IF NOT EXISTS plants (
		id INTEGER PRIMARY KEY AUTOINCREMENT,
		image_path TEXT
	)",
	"CREATE TABLE IF NOT EXISTS locations (
		id INTEGER PRIMARY KEY AUTOINCREMENT,
		location_name TEXT,
		latitude REAL,
		longitude REAL
	)",
	"CREATE TABLE IF NOT EXISTS diagnoses (
		id INTEGER PRIMARY KEY AUTOINCREMENT,
		disease TEXT NOT NULL,
		prompt TEXT NOT NULL,
		plant_id INTEGER REFERENCES plants(id),
		location_id INTEGER REFERENCES locations(id),
		created_at TEXT NOT NULL
	)",
];

/// A diagnosis about to be stored.
#[derive(Debug, Clone)]
pub struct NewDiagnosis<'a> {
	/// Name the photo was uploaded under
	pub image_path: &'a str,
	pub disease: &'a str,
	pub prompt: &'a str,
	pub location_name: Option<&'a str>,
	pub coordinates: Option<Coordinates>,
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct StoredDiagnosis {
	pub id: i64,
	pub disease: String,
	pub prompt: String,
	pub image_path: Option<String>,
	pub location_name: Option<String>,
	pub latitude: Option<f64>,
	pub longitude: Option<f64>,
	pub created_at: DateTime<Utc>,
}

/// Diagnosis history in SQLite.
#[derive(Debug, Clone)]
pub struct Store {
	pool: SqlitePool,
}

impl Store {
	/// Open (creating if needed) the database at `url` and make sure the tables exist.
	///
	/// # Errors
	///
	/// Returns an error if the URL is invalid, the database cannot be opened or the schema cannot be created.
	pub async fn connect(url: &str) -> Result<Self, sqlx::Error> {
		let options = SqliteConnectOptions::from_str(url)?
			.create_if_missing(true)
			.foreign_keys(true);

		let pool = SqlitePoolOptions::new()
			.max_connections(4)
			.connect_with(options)
			.await?;

		tracing::info!("Storing diagnoses in {url}");
		Self::from_pool(pool).await
	}

	/// # Errors
	///
	/// Returns an error if the schema cannot be created.
	pub async fn from_pool(pool: SqlitePool) -> Result<Self, sqlx::Error> {
		for statement in SCHEMA {
			sqlx::query(statement).execute(&pool).await?;
		}

		Ok(Self { pool })
	}

	/// Store the photo, location and diagnosis rows together. Returns the diagnosis id.
	///
	/// # Errors
	///
	/// Returns an error if any insert fails, in which case nothing is stored.
	pub async fn record(&self, diagnosis: &NewDiagnosis<'_>) -> Result<i64, sqlx::Error> {
		let mut tx = self.pool.begin().await?;

		let plant_id = sqlx::query("INSERT INTO plants (image_path) VALUES (?)")
			.bind(diagnosis.image_path)
			.execute(&mut *tx)
			.await?
			.last_insert_rowid();

		let location_id = sqlx::query(
			"INSERT INTO locations (location_name, latitude, longitude) VALUES (?, ?, ?)",
		)
		.bind(diagnosis.location_name)
		.bind(diagnosis.coordinates.map(|c| c.latitude))
		.bind(diagnosis.coordinates.map(|c| c.longitude))
		.execute(&mut *tx)
		.await?
		.last_insert_rowid();

		let id = sqlx::query(
			"INSERT INTO diagnoses (disease, prompt, plant_id, location_id, created_at) VALUES (?, ?, ?, ?, ?)",
		)
		.bind(diagnosis.disease)
		.bind(diagnosis.prompt)
		.bind(plant_id)
		.bind(location_id)
		.bind(Utc::now())
		.execute(&mut *tx)
		.await?
		.last_insert_rowid();

		tx.commit().await?;
		tracing::debug!("Stored diagnosis {id} ({})", diagnosis.disease);

		Ok(id)
	}

	/// The most recent diagnoses, newest first.
	///
	/// # Errors
	///
	/// Returns an error if the query fails.
	pub async fn recent(&self, limit: u32) -> Result<Vec<StoredDiagnosis>, sqlx::Error> {
		sqlx::query_as::<_, StoredDiagnosis>(
			"SELECT d.id, d.disease, d.prompt, p.image_path, l.location_name, l.latitude, l.longitude, d.created_at
			FROM diagnoses d
			LEFT JOIN plants p ON p.id = d.plant_id
			LEFT JOIN locations l ON l.id = d.location_id
			ORDER BY d.id DESC
			LIMIT ?",
		)
		.bind(limit)
		.fetch_all(&self.pool)
		.await
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	async fn store() -> Store {
		let pool = SqlitePoolOptions::new()
			.max_connections(1)
			.connect("sqlite::memory:")
			.await
			.unwrap();

		Store::from_pool(pool).await.unwrap()
	}

	#[tokio::test]
	async fn records_all_three_rows() {
		let store = store().await;

		let id = store
			.record(&NewDiagnosis {
				image_path: "leaf.jpg",
				disease: "curl_virus",
				prompt: "As a cotton plant pathologist...",
				location_name: Some("Nagpur"),
				coordinates: Some(Coordinates {
					latitude: 21.15,
					longitude: 79.08,
				}),
			})
			.await
			.unwrap();

		let stored = store.recent(10).await.unwrap();

		assert_eq!(stored.len(), 1);
		assert_eq!(stored[0].id, id);
		assert_eq!(stored[0].disease, "curl_virus");
		assert_eq!(stored[0].image_path.as_deref(), Some("leaf.jpg"));
		assert_eq!(stored[0].location_name.as_deref(), Some("Nagpur"));
		assert_eq!(stored[0].latitude, Some(21.15));
	}

	#[tokio::test]
	async fn missing_coordinates_are_null() {
		let store = store().await;

		store
			.record(&NewDiagnosis {
				image_path: "leaf.jpg",
				disease: "healthy",
				prompt: "",
				location_name: None,
				coordinates: None,
			})
			.await
			.unwrap();

		let stored = store.recent(1).await.unwrap();
		assert_eq!(stored[0].latitude, None);
		assert_eq!(stored[0].location_name, None);
	}

	#[tokio::test]
	async fn schema_creation_is_idempotent() {
		let store = store().await;

		assert!(Store::from_pool(store.pool.clone()).await.is_ok());
	}

	#[tokio::test]
	async fn recent_is_newest_first() {
		let store = store().await;
		for disease in ["bacterial_blight", "fusarium_wilt"] {
			store
				.record(&NewDiagnosis {
					image_path: "leaf.jpg",
					disease,
					prompt: "",
					location_name: None,
					coordinates: None,
				})
				.await
				.unwrap();
		}

		let diseases: Vec<String> = store
			.recent(10)
			.await
			.unwrap()
			.into_iter()
			.map(|d| d.disease)
			.collect();

		assert_eq!(diseases, vec!["fusarium_wilt", "bacterial_blight"]);
	}
}
