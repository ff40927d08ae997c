use anyhow::Result;

pub fn handle() -> Result<()> {
	println!("{}", serde_json::to_string_pretty(&leafcam::schemas())?);

	Ok(())
}
