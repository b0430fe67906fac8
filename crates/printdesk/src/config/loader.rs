use std::path::{Path, PathBuf};

use crate::config::schema::Config;
use crate::error::ConfigError;

pub const ENV_DATA_DIR: &str = "PRINTDESK_DATA_DIR";
pub const ENV_CONVERTER: &str = "PRINTDESK_CONVERTER";
pub const ENV_PORTAL_URL: &str = "PRINTDESK_PORTAL_URL";
pub const ENV_CHROME: &str = "PRINTDESK_CHROME";

/// Reads, parses, applies environment overrides and validates a config file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut config = parse(&content)?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate_config(&config)?;
    Ok(config)
}

/// Parses and validates without consulting the environment.
pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let config = parse(content)?;
    validate_config(&config)?;
    Ok(config)
}

/// Default config with environment overrides, for runs without a config file.
pub fn config_from_env() -> Result<Config, ConfigError> {
    let mut config = Config::default();
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate_config(&config)?;
    Ok(config)
}

fn parse(content: &str) -> Result<Config, ConfigError> {
    if content.trim().is_empty() {
        return Ok(Config::default());
    }
    Ok(serde_json::from_str(content)?)
}

/// Applies `PRINTDESK_*` overrides using `lookup` to read variables.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(dir) = non_empty(ENV_DATA_DIR) {
        config.data_dir = PathBuf::from(dir);
    }
    if let Some(program) = non_empty(ENV_CONVERTER) {
        config.converter.program = Some(PathBuf::from(program));
    }
    if let Some(url) = non_empty(ENV_PORTAL_URL) {
        config.portal.url = url;
    }
    if let Some(chrome) = non_empty(ENV_CHROME) {
        config.portal.chrome_executable = Some(PathBuf::from(chrome));
    }
}

pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let invalid = |message: String| Err(ConfigError::Validation { message });

    for (name, rate) in [
        ("pricing.mono_rate", config.pricing.mono_rate),
        ("pricing.color_rate", config.pricing.color_rate),
    ] {
        if !rate.is_finite() || rate < 0.0 {
            return invalid(format!("{} must be a non-negative number, got {}", name, rate));
        }
    }

    for (name, value) in [
        ("converter.timeout_secs", config.converter.timeout_secs),
        ("converter.poll_interval_ms", config.converter.poll_interval_ms),
        ("page_counter.timeout_secs", config.page_counter.timeout_secs),
        ("pipeline.stale_after_secs", config.pipeline.stale_after_secs),
        ("portal.ui_wait_secs", config.portal.ui_wait_secs),
        ("portal.step_timeout_secs", config.portal.step_timeout_secs),
    ] {
        if value == 0 {
            return invalid(format!("{} must be greater than zero", name));
        }
    }

    if config.pipeline.max_concurrent == 0 {
        return invalid("pipeline.max_concurrent must be at least 1".to_string());
    }
    if config.pipeline.sweep_interval_secs == Some(0) {
        return invalid("pipeline.sweep_interval_secs must be greater than zero".to_string());
    }
    if config.allowed_extensions.is_empty() {
        return invalid("allowed_extensions must not be empty".to_string());
    }
    if config.portal.url.trim().is_empty() {
        return invalid("portal.url must not be empty".to_string());
    }
    if config.email.body_filename.contains(['/', '\\']) {
        return invalid("email.body_filename must be a bare file name".to_string());
    }

    Ok(())
}
