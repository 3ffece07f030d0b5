//! Service configuration loaded from TOML.
//!
//! Every section is optional; a missing file or section yields defaults.

#[path = "config/error.rs"]
mod error;

#[path = "config/paths.rs"]
mod paths;

#[path = "config/types.rs"]
mod types;

#[path = "config/load.rs"]
mod load;

pub use error::ConfigError;
pub use load::{load_config, parse_config, LoadedConfig};
pub use paths::default_config_path;
pub use types::{
    AppConfig, CoordinatorSection, EvaluationSection, HistorySection, LoggingConfig,
    ServerConfig,
};
