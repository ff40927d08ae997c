use axum::{
	extract::{multipart::Field, Multipart},
	routing::post,
	Extension, Json, Router,
};
use leafcam_core::http::{Coordinates, DiagnoseResponse, EnvironmentalContext};
use std::sync::Arc;

use crate::{
	errors::HTTPError,
	geocode::locate_or_log,
	routes::Services,
	runner::{Job, Runner},
	store::NewDiagnosis,
	upload::Upload,
};

pub fn handler() -> Router {
	Router::new().route("/diagnose", post(diagnose))
}

#[derive(Debug, Default)]
struct Form {
	image: Option<Upload>,
	env_data: Option<String>,
}

impl Form {
	async fn read(mut multipart: Multipart) -> Result<Self, HTTPError> {
		let mut form = Self::default();

		while let Some(field) = multipart
			.next_field()
			.await
			.map_err(|e| HTTPError::bad_request(format!("Invalid multipart body: {e}")))?
		{
			match field.name() {
				Some("image") => form.image = Some(Self::spool(field).await?),
				Some("env_data") => {
					form.env_data = Some(
						field
							.text()
							.await
							.map_err(|e| HTTPError::bad_request(format!("Invalid env_data field: {e}")))?,
					);
				},
				name => tracing::debug!("Ignoring unexpected form field {name:?}"),
			}
		}

		Ok(form)
	}

	async fn spool(field: Field<'_>) -> Result<Upload, HTTPError> {
		let file_name = field.file_name().map(ToString::to_string);
		let bytes = field
			.bytes()
			.await
			.map_err(|e| HTTPError::bad_request(format!("Invalid image upload: {e}")))?;

		Upload::from_bytes(&bytes, file_name)
			.map_err(|e| HTTPError::new(format!("An error occurred: {e}")))
	}
}

async fn diagnose(
	Extension(runner): Extension<Runner>,
	Extension(services): Extension<Arc<Services>>,
	multipart: Multipart,
) -> Result<Json<DiagnoseResponse>, HTTPError> {
	let form = Form::read(multipart).await?;

	let env: EnvironmentalContext = match form.env_data.as_deref() {
		Some(raw) => serde_json::from_str(raw)
			.map_err(|_| HTTPError::bad_request("Invalid JSON format for env_data"))?,
		None => EnvironmentalContext::default(),
	};
	let upload = form
		.image
		.ok_or_else(|| HTTPError::bad_request("Missing image file"))?;

	let file_name = upload.file_name().to_string();
	tracing::debug!("Received diagnosis request for {file_name}");
	tracing::trace!("{env:?}");

	let (diagnosis, _) = runner
		.run(Job {
			upload,
			env: env.clone(),
		})
		.await?;

	let explanation_img = diagnosis
		.overlay
		.to_base64_jpeg()
		.map_err(|e| HTTPError::new(format!("An error occurred: {e}")))?;

	let location = env.location_name();
	let coordinates = match (&services.geocoder, &location) {
		(Some(geocoder), Some(place)) => locate_or_log(geocoder.as_ref(), place).await,
		_ => None,
	};

	if let Some(store) = &services.store {
		let stored = store
			.record(&NewDiagnosis {
				image_path: &file_name,
				disease: &diagnosis.record.disease,
				prompt: &diagnosis.prompt,
				location_name: location.as_deref(),
				coordinates,
			})
			.await;

		if let Err(e) = stored {
			tracing::error!("Failed to store diagnosis: {e}");
		}
	}

	Ok(Json(DiagnoseResponse {
		remedy: services.remedies.lookup(&diagnosis.record.disease).to_string(),
		latitude: coordinates.map(|Coordinates { latitude, .. }| latitude),
		longitude: coordinates.map(|Coordinates { longitude, .. }| longitude),
		prediction: diagnosis.record,
		prompt: diagnosis.prompt,
		explanation_img,
	}))
}
