//! `env_logger` setup for the server binary.

use env_logger::{Builder, Env};

use crate::config::LoggingConfig;

/// Installs the global logger. `RUST_LOG` wins over `config.level`.
pub fn init_logging(config: &LoggingConfig) -> Result<(), log::SetLoggerError> {
    Builder::from_env(Env::default().default_filter_or(config.level.as_str()))
        .format_timestamp_millis()
        .format_target(true)
        .try_init()
}
