use anyhow::{Context, Result};
use axum::Server;
use std::{net::SocketAddr, sync::Arc};

use crate::{
	config::Settings,
	geocode::{Geocoder, Nominatim},
	pipeline::Diagnoser,
	remedies::RemedyBook,
	routes::{self, Services},
	runner::Runner,
	shutdown::Shutdown,
	store::Store,
};

/// Start the diagnosis service and run it until shutdown.
///
/// # Errors
///
/// Returns an error if the database or geocoder cannot be set up, or if the server fails to start.
pub async fn start(settings: Settings) -> Result<()> {
	let shutdown = Shutdown::new().with_signals();

	let setup_settings = settings.clone();
	let runner = Runner::new(
		move || Diagnoser::from_settings(&setup_settings),
		settings.queue_depth,
		shutdown.clone(),
	);

	let store = match &settings.database_url {
		Some(url) => Some(
			Store::connect(url)
				.await
				.with_context(|| format!("Failed to open database at {url}"))?,
		),
		None => None,
	};

	let geocoder: Arc<dyn Geocoder> =
		Arc::new(Nominatim::new(&settings.geocoder).context("Failed to set up geocoder")?);

	let services = Services {
		remedies: RemedyBook::load(&settings.remedies),
		geocoder: Some(geocoder),
		store,
	};

	let app = routes::app(runner, services, &shutdown, settings.max_upload_bytes);
	let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));

	tracing::info!("Starting server on {addr}...");
	Server::bind(&addr)
		.serve(app.into_make_service())
		.with_graceful_shutdown(shutdown.handle())
		.await?;

	Ok(())
}
