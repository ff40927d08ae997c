use axum::{
	routing::{get, post},
	Extension, Json, Router,
};
use leafcam_core::http::{DiagnoseResponse, EnvironmentalContext, ErrorResponse};
use schemars::{schema_for, JsonSchema};
use serde_json::{json, Value};

use crate::{
	runner::{Health, Runner, Setup},
	shutdown::Shutdown,
};

pub fn handler() -> Router {
	Router::new()
		.route("/", get(root))
		.route("/health-check", get(health_check))
		.route("/schema", get(schema))
		.route("/shutdown", post(shutdown))
}

/// JSON Schemas of the diagnosis request context and responses.
#[must_use]
pub fn schemas() -> Value {
	json!({
		"EnvironmentalContext": schema_for!(EnvironmentalContext),
		"DiagnoseResponse": schema_for!(DiagnoseResponse),
		"ErrorResponse": schema_for!(ErrorResponse),
	})
}

#[derive(Debug, serde::Serialize, JsonSchema)]
pub struct RootResponse {
	/// Relative URL of the diagnosis endpoint
	pub diagnose_url: String,
	/// Relative URL of the JSON Schemas
	pub schema_url: String,
}

#[allow(clippy::unused_async)]
pub async fn root() -> Json<RootResponse> {
	Json(RootResponse {
		diagnose_url: "/diagnose".to_string(),
		schema_url: "/schema".to_string(),
	})
}

#[derive(Debug, serde::Serialize, JsonSchema)]
pub struct HealthCheck {
	/// Current health status
	pub status: Health,
	/// Model loading
	pub setup: Setup,
}

pub async fn health_check(Extension(runner): Extension<Runner>) -> Json<HealthCheck> {
	Json(HealthCheck {
		status: runner.health(),
		setup: runner.setup().await,
	})
}

#[allow(clippy::unused_async)]
pub async fn schema() -> Json<Value> {
	Json(schemas())
}

#[allow(clippy::unused_async)]
pub async fn shutdown(Extension(shutdown): Extension<Shutdown>) -> Json<String> {
	shutdown.start();

	Json(String::new())
}
