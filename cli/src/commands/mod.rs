use anyhow::Result;
use clap::{Args, Subcommand};
use leafcam::Settings;
use std::path::PathBuf;

mod diagnose;
mod layers;
mod schema;
mod serve;

/// Where to find the trained model. Each flag overrides the settings file.
#[derive(Debug, Default, Args)]
pub struct ModelArgs {
	/// Model architecture (JSON)
	#[arg(long, env = "LEAFCAM_MODEL_CONFIG")]
	model_config: Option<PathBuf>,
	/// Model weights (MessagePack)
	#[arg(long, env = "LEAFCAM_WEIGHTS")]
	weights: Option<PathBuf>,
	/// Class names (JSON array, ordered like the model output)
	#[arg(long, env = "LEAFCAM_CLASS_NAMES")]
	class_names: Option<PathBuf>,
}

impl ModelArgs {
	fn apply(self, settings: &mut Settings) {
		if let Some(config) = self.model_config {
			settings.model.config = config;
		}
		if let Some(weights) = self.weights {
			settings.model.weights = weights;
		}
		if let Some(class_names) = self.class_names {
			settings.model.class_names = class_names;
		}
	}
}

#[derive(Debug, Subcommand)]
pub enum Command {
	/// Serve diagnoses over HTTP
	Serve {
		/// Port to listen on
		#[arg(long, env = "PORT")]
		port: Option<u16>,
		/// SQLite database to record diagnoses in
		#[arg(long, env = "DATABASE_URL")]
		database_url: Option<String>,
		/// Print the HTTP schemas and exit
		#[arg(long, hide = true)]
		dump_schema_and_exit: bool,
		#[command(flatten)]
		model: ModelArgs,
	},

	/// Diagnose a single leaf photo
	Diagnose {
		/// Image to diagnose
		image: PathBuf,
		/// Growing conditions as JSON, e.g. '{"location": "Nagpur", "temp": 32}'
		#[arg(long, conflicts_with = "env_file")]
		env: Option<String>,
		/// File containing the growing conditions as JSON
		#[arg(long)]
		env_file: Option<PathBuf>,
		/// Where to write the Grad-CAM overlay
		#[arg(short, long, default_value = "explanation.jpg")]
		output: PathBuf,
		/// Layer to explain, overriding the settings file
		#[arg(long)]
		layer: Option<String>,
		#[command(flatten)]
		model: ModelArgs,
	},

	/// List the layers Grad-CAM can explain
	Layers {
		#[command(flatten)]
		model: ModelArgs,
	},

	/// Print the JSON Schemas of the HTTP API
	Schema,
}

pub async fn exec(mut settings: Settings, command: Command) -> Result<()> {
	match command {
		Command::Serve {
			port,
			database_url,
			model,
			dump_schema_and_exit,
		} => {
			model.apply(&mut settings);
			serve::handle(settings, port, database_url, dump_schema_and_exit).await
		},
		Command::Diagnose {
			image,
			env,
			env_file,
			output,
			layer,
			model,
		} => {
			model.apply(&mut settings);
			if let Some(layer) = layer {
				settings.model.target_layer = layer;
			}

			diagnose::handle(&settings, &image, env, env_file, &output)
		},
		Command::Layers { model } => {
			model.apply(&mut settings);
			layers::handle(&settings)
		},
		Command::Schema => schema::handle(),
	}
}
