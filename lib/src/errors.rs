use axum::{
	http::StatusCode,
	response::{IntoResponse, Response},
	Json,
};
use leafcam_core::http::ErrorResponse;

use crate::runner::Error as RunnerError;

#[derive(Debug)]
pub struct HTTPError {
	message: String,
	status_code: StatusCode,
}

impl HTTPError {
	pub fn new(message: impl Into<String>) -> Self {
		Self {
			message: message.into(),
			status_code: StatusCode::INTERNAL_SERVER_ERROR,
		}
	}

	pub fn bad_request(message: impl Into<String>) -> Self {
		Self::new(message).with_status(StatusCode::BAD_REQUEST)
	}

	pub const fn with_status(mut self, status_code: StatusCode) -> Self {
		self.status_code = status_code;
		self
	}

	#[must_use]
	pub const fn status(&self) -> StatusCode {
		self.status_code
	}
}

impl IntoResponse for HTTPError {
	fn into_response(self) -> Response {
		(
			self.status_code,
			Json(ErrorResponse {
				message: self.message,
			}),
		)
			.into_response()
	}
}

impl From<RunnerError> for HTTPError {
	fn from(e: RunnerError) -> Self {
		match e {
			RunnerError::NotReady | RunnerError::Busy | RunnerError::Closed => {
				Self::new(e.to_string()).with_status(StatusCode::SERVICE_UNAVAILABLE)
			},
			RunnerError::Diagnosis(e) => Self::new(format!("An error occurred: {e}")),
		}
	}
}
