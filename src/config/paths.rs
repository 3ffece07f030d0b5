use std::path::PathBuf;

use super::error::ConfigError;

/// `~/.config/lentra/config.toml`
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    let home = dirs::home_dir().ok_or(ConfigError::MissingHome)?;
    Ok(home.join(".config").join("lentra").join("config.toml"))
}
