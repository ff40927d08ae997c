use anyhow::Result;
use leafcam::Settings;

pub async fn handle(
	mut settings: Settings,
	port: Option<u16>,
	database_url: Option<String>,
	dump_schema_and_exit: bool,
) -> Result<()> {
	if dump_schema_and_exit {
		println!("{}", serde_json::to_string(&leafcam::schemas())?);
		return Ok(());
	}

	if let Some(port) = port {
		settings.port = port;
	}
	if database_url.is_some() {
		settings.database_url = database_url;
	}

	leafcam::start(settings).await
}
