//! Configuration loading, parsing, validation, and lookup.

mod loader;
mod provider;
mod types;
mod validation;
mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use provider::*;
pub use types::*;
pub use validation::validate_config;
pub use watcher::{ConfigWatcher, ReloadCallback};
