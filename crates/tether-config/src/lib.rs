//! Configuration for the tether session layer.
//!
//! Provides TOML-based configuration with:
//! - Homeserver identity, session file location, retry and circuit breaker tuning
//! - Config file layering (XDG user config + project-local overrides)
//! - Password resolution (keyring → env var → config file)

pub mod discovery;
pub mod error;
pub mod secrets;
pub mod types;

pub use discovery::{
    LoadedConfig, load_config, load_config_file, load_config_from, load_config_with_options,
    project_config_path, write_config_file, xdg_config_dir, xdg_config_path,
};
pub use error::{ConfigError, Result};
pub use secrets::{PASSWORD_ENV_VAR, ResolvedSecret, SecretSource, resolve_password};
pub use types::*;
