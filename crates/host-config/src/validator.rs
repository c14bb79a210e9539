use crate::{HostConfig, HostConfigError, Result};

pub fn validate_config(config: &HostConfig) -> Result<()> {
    if config.instance.weight <= 0.0 {
        return Err(HostConfigError::InvalidWeight(config.instance.weight));
    }

    if config.health.stat_window_size < 10 {
        return Err(HostConfigError::WindowTooSmall(
            config.health.stat_window_size,
        ));
    }

    if config.health.adjust_cool_down == 0 {
        return Err(HostConfigError::InvalidCooldown(
            config.health.adjust_cool_down,
        ));
    }

    for (key, spec) in &config.service {
        if spec.enable && spec.service_name.trim().is_empty() {
            return Err(HostConfigError::EmptyServiceName(key.clone()));
        }
    }

    Ok(())
}
