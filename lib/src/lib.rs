#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod config;
mod errors;
pub mod geocode;
pub mod gradcam;
mod helpers;
pub mod model;
pub mod overlay;
pub mod pipeline;
pub mod predictor;
pub mod preprocess;
pub mod prompt;
pub mod remedies;
pub mod routes;
pub mod runner;
mod server;
pub mod shutdown;
pub mod store;
pub mod upload;

#[cfg(test)]
mod testing;

pub use config::Settings;
pub use gradcam::{explain, GradCam, Heatmap};
pub use overlay::OverlayImage;
pub use pipeline::{Diagnoser, Diagnosis};
pub use predictor::DiseasePredictor;
pub use preprocess::Preprocessor;
pub use prompt::generate_prompt;
pub use routes::system::schemas;
pub use server::start;
