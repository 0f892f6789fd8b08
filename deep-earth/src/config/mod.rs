//! INI configuration.
//!
//! ```no_run
//! use deep_earth::config::ConfigFile;
//!
//! let config = ConfigFile::load().unwrap_or_default();
//! println!("cache at {}", config.cache.directory.display());
//! ```

mod defaults;
mod file;
mod parser;
mod settings;
mod writer;

pub use defaults::*;
pub use file::{config_directory, config_file_path, ConfigFileError};
pub use settings::{
    CacheSettings, ConfigFile, ElevationSettings, EmbeddingSettings, LoggingSettings,
    NetworkSettings, QualitySettings, VectorSettings,
};
