use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HostConfigError {
    #[error("IO error reading {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("instance.weight must be > 0, got {0}")]
    InvalidWeight(f64),

    #[error("health.stat_window_size must be >= 10 (the controller requires 10 samples before evaluating), got {0}")]
    WindowTooSmall(usize),

    #[error("health.adjust_cool_down must be > 0, got {0}")]
    InvalidCooldown(u64),

    #[error("service '{0}' is enabled but has an empty serviceName")]
    EmptyServiceName(String),
}

pub type Result<T> = std::result::Result<T, HostConfigError>;
