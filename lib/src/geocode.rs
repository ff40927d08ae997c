use async_trait::async_trait;
use leafcam_core::http::Coordinates;
use reqwest::Client;
use serde::Deserialize;
use url::Url;

use crate::config::GeocoderSettings;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Geocoding request failed: {0}")]
	Request(#[from] reqwest::Error),

	#[error("Geocoder base URL {0} cannot take a path")]
	BaseUrl(Url),

	#[error("Geocoder returned an invalid coordinate: {0:?}")]
	Coordinate(String),
}

/// Resolves place names to coordinates.
#[async_trait]
pub trait Geocoder: Send + Sync {
	/// `Ok(None)` when nothing matches `place`.
	async fn locate(&self, place: &str) -> Result<Option<Coordinates>, Error>;
}

/// OpenStreetMap's Nominatim search API.
#[derive(Debug, Clone)]
pub struct Nominatim {
	client: Client,
	base_url: Url,
}

#[derive(Debug, Deserialize)]
struct Place {
	lat: String,
	lon: String,
}

impl Nominatim {
	/// # Errors
	///
	/// Returns an error if the HTTP client cannot be built.
	pub fn new(settings: &GeocoderSettings) -> Result<Self, Error> {
		Ok(Self {
			client: Client::builder()
				.user_agent(&settings.user_agent)
				.timeout(settings.timeout())
				.build()?,
			base_url: settings.base_url.clone(),
		})
	}

	fn search_url(&self, place: &str) -> Result<Url, Error> {
		let mut url = self.base_url.clone();

		url.path_segments_mut()
			.map_err(|()| Error::BaseUrl(self.base_url.clone()))?
			.pop_if_empty()
			.push("search");

		url.query_pairs_mut()
			.append_pair("q", place)
			.append_pair("format", "json")
			.append_pair("limit", "1");

		Ok(url)
	}
}

fn first_match(places: &[Place]) -> Result<Option<Coordinates>, Error> {
	let Some(place) = places.first() else {
		return Ok(None);
	};

	let parse = |value: &str| {
		value
			.trim()
			.parse::<f64>()
			.map_err(|_| Error::Coordinate(value.to_string()))
	};

	Ok(Some(Coordinates {
		latitude: parse(&place.lat)?,
		longitude: parse(&place.lon)?,
	}))
}

#[async_trait]
impl Geocoder for Nominatim {
	async fn locate(&self, place: &str) -> Result<Option<Coordinates>, Error> {
		let url = self.search_url(place)?;
		tracing::debug!("Geocoding {place:?}");

		let places: Vec<Place> = self
			.client
			.get(url)
			.send()
			.await?
			.error_for_status()?
			.json()
			.await?;

		first_match(&places)
	}
}

/// Look `place` up, treating failures as "no coordinates".
pub async fn locate_or_log(geocoder: &dyn Geocoder, place: &str) -> Option<Coordinates> {
	match geocoder.locate(place).await {
		Ok(None) => {
			tracing::warn!("No coordinates found for {place:?}");
			None
		},
		Ok(coordinates) => coordinates,
		Err(e) => {
			tracing::error!("Failed to geocode {place:?}: {e}");
			None
		},
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn nominatim(base_url: &str) -> Nominatim {
		Nominatim::new(&GeocoderSettings {
			base_url: Url::parse(base_url).unwrap(),
			user_agent: "leafcam-tests".to_string(),
			timeout_secs: 1,
		})
		.unwrap()
	}

	#[test]
	fn builds_search_urls() {
		let url = nominatim("https://nominatim.openstreetmap.org/")
			.search_url("Nagpur, Maharashtra")
			.unwrap();

		assert_eq!(
			url.as_str(),
			"https://nominatim.openstreetmap.org/search?q=Nagpur%2C+Maharashtra&format=json&limit=1"
		);
	}

	#[test]
	fn keeps_base_url_paths() {
		let url = nominatim("http://localhost:8080/nominatim").search_url("Akola").unwrap();

		assert_eq!(url.path(), "/nominatim/search");
	}

	#[test]
	fn parses_the_first_match() {
		let places: Vec<Place> = serde_json::from_str(
			r#"[{"lat": "21.1498134", "lon": "79.0820556", "display_name": "Nagpur"}]"#,
		)
		.unwrap();

		let coordinates = first_match(&places).unwrap().unwrap();

		assert!((coordinates.latitude - 21.149_813_4).abs() < 1e-9);
		assert!((coordinates.longitude - 79.082_055_6).abs() < 1e-9);
	}

	#[test]
	fn no_match_is_not_an_error() {
		assert_eq!(first_match(&[]).unwrap(), None);
	}

	#[test]
	fn rejects_garbage_coordinates() {
		let places = vec![Place {
			lat: "north".to_string(),
			lon: "0".to_string(),
		}];

		assert!(matches!(first_match(&places), Err(Error::Coordinate(_))));
	}

	struct Failing;

	#[async_trait]
	impl Geocoder for Failing {
		async fn locate(&self, place: &str) -> Result<Option<Coordinates>, Error> {
			Err(Error::Coordinate(place.to_string()))
		}
	}

	#[tokio::test]
	async fn unresponsive_geocoders_time_out() {
		let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
		let addr = listener.local_addr().unwrap();
		// Accept the connection and never answer.
		let server = tokio::spawn(async move {
			let (socket, _) = listener.accept().await.unwrap();
			tokio::time::sleep(std::time::Duration::from_secs(30)).await;
			drop(socket);
		});

		let geocoder = nominatim(&format!("http://{addr}/"));
		let started = std::time::Instant::now();
		let coordinates = locate_or_log(&geocoder, "Akola").await;

		assert_eq!(coordinates, None);
		assert!(started.elapsed() < std::time::Duration::from_secs(10));
		server.abort();
	}

	#[tokio::test]
	async fn lookup_failures_yield_no_coordinates() {
		assert_eq!(locate_or_log(&Failing, "Akola").await, None);
	}
}
