use anyhow::{Context, Result};
use host_config::parse_config;
use std::path::Path;

pub fn execute(config_path: &Path) -> Result<()> {
    let config = parse_config(config_path)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    let json = serde_json::to_string_pretty(&config)?;
    println!("{json}");
    Ok(())
}
