use std::fs;
use std::path::{Path, PathBuf};

use super::error::ConfigError;
use super::paths::default_config_path;
use super::types::AppConfig;

#[derive(Debug)]
pub struct LoadedConfig {
    pub config: AppConfig,
    pub path: PathBuf,
    pub exists: bool,
}

/// Reads and validates the config at `path_override`, or at the default path.
pub fn load_config(path_override: Option<PathBuf>) -> Result<LoadedConfig, ConfigError> {
    let path = match path_override {
        Some(path) => path,
        None => default_config_path()?,
    };
    let (config, exists) = read_config(&path)?;
    config.validate()?;
    Ok(LoadedConfig {
        config,
        path,
        exists,
    })
}

/// Parses and validates config text.
pub fn parse_config(contents: &str) -> Result<AppConfig, ConfigError> {
    let config: AppConfig = toml::from_str(contents)?;
    config.validate()?;
    Ok(config)
}

fn read_config(path: &Path) -> Result<(AppConfig, bool), ConfigError> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok((toml::from_str(&contents)?, true)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            Ok((AppConfig::default(), false))
        }
        Err(err) => Err(ConfigError::Io(err)),
    }
}
