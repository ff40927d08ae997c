use axum::{extract::DefaultBodyLimit, Extension, Router};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{geocode::Geocoder, remedies::RemedyBook, runner::Runner, shutdown::Shutdown, store::Store};

pub mod diagnose;
pub mod system;

/// Collaborators consulted after a diagnosis.
#[derive(Clone, Default)]
pub struct Services {
	pub remedies: RemedyBook,
	pub geocoder: Option<Arc<dyn Geocoder>>,
	pub store: Option<Store>,
}

pub fn handler() -> Router {
	Router::new()
		.merge(system::handler())
		.merge(diagnose::handler())
}

/// The full application with its shared state attached.
pub fn app(runner: Runner, services: Services, shutdown: &Shutdown, max_upload_bytes: usize) -> Router {
	handler()
		.layer(Extension(runner))
		.layer(Extension(Arc::new(services)))
		.layer(shutdown.extension())
		.layer(DefaultBodyLimit::max(max_upload_bytes))
		.layer(CorsLayer::permissive())
		.layer(TraceLayer::new_for_http())
}
