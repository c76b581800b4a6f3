use anyhow::Result;
use autoclaims::config::Settings;
use autoclaims::resources::{declared_resources, Resource};
use serde_json::json;

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Yaml,
    Json,
}

fn render_resources(resources: &[Resource], format: OutputFormat) -> Result<String> {
    let manifest = json!({ "resources": resources });
    match format {
        OutputFormat::Yaml => Ok(serde_yaml::to_string(&manifest)?),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(&manifest)?),
    }
}

pub fn execute(format: OutputFormat) -> Result<()> {
    let settings = Settings::new()?;
    let resources = declared_resources(&settings)?;
    println!("{}", render_resources(&resources, format)?);
    Ok(())
}
