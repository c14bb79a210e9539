use crate::{HostConfig, HostConfigError, Result};
use std::path::Path;

pub fn parse_config(path: &Path) -> Result<HostConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| HostConfigError::Io(path.to_path_buf(), e))?;

    parse_config_from_str(&content)
}

pub fn parse_config_from_str(toml: &str) -> Result<HostConfig> {
    Ok(toml::from_str(toml)?)
}
