//! Configuration loading, env overrides, and validation.
//!
//! Config files: `sigline.toml`, `sigline.yaml`, or `sigline.json`,
//! searched in `./` then `~/.config/sigline/`. `${ENV_VAR}` placeholders in
//! the file are substituted before parsing; well-known environment variables
//! (`SIGNAL_ACCOUNT`, `SIGNAL_CLI_PATH`, `PORT`, ...) override file values.

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    error::{Error, Result},
    loader::{apply_env_overrides, config_dir, data_dir, discover_and_load, load_config},
    schema::{HistoryConfig, ServerConfig, SignalConfig, SiglineConfig},
    validate::{Diagnostic, Severity, ValidationResult, validate},
};
