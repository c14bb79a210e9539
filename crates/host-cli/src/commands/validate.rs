use anyhow::{Context, Result};
use host_config::{parse_config, validate_config};
use std::path::Path;

pub fn execute(config_path: &Path) -> Result<()> {
    let config = parse_config(config_path)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    validate_config(&config).with_context(|| format!("{} failed validation", config_path.display()))?;

    println!(
        "{} is valid: {} service(s), {} config watch(es)",
        config_path.display(),
        config.service.len(),
        config.config.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn accepts_a_valid_config_file() {
        let file = write_config(
            r#"
[server]
host = "http://127.0.0.1:8848"
username = "nacos"
password = "nacos"

[instance]
ip = "10.0.0.5"
port = 9000

[service.demo]
serviceName = "demo-service"
"#,
        );
        assert!(execute(file.path()).is_ok());
    }

    #[test]
    fn rejects_an_invalid_config_file() {
        let file = write_config(
            r#"
[server]
host = "http://127.0.0.1:8848"
username = "nacos"
password = "nacos"

[instance]
ip = "10.0.0.5"
port = 9000
weight = 0.0

[service.demo]
serviceName = "demo-service"
"#,
        );
        assert!(execute(file.path()).is_err());
    }
}
