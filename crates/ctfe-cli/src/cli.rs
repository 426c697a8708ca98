//! Locating and loading the generator configuration.

use std::path::{Path, PathBuf};

use ctfe_core::CtfeConfig;
use tracing::debug;

use crate::{CliError, Result};

pub const LOCAL_CONFIG: &str = "ctfe.toml";

/// Load configuration from `path` when given, else from `ctfe.toml` in the
/// working directory, else from the user config directory, else defaults.
pub fn load_config(path: Option<&Path>) -> Result<CtfeConfig> {
    if let Some(path) = path {
        if !path.exists() {
            return Err(CliError::Config(format!(
                "config file {} does not exist",
                path.display()
            )));
        }
        return Ok(CtfeConfig::load_from_file(path)?);
    }

    let candidates = [Some(PathBuf::from(LOCAL_CONFIG)), default_config_path()];
    for candidate in candidates.into_iter().flatten() {
        if candidate.is_file() {
            debug!("Loading configuration from {}", candidate.display());
            return Ok(CtfeConfig::load_from_file(&candidate)?);
        }
    }
    Ok(CtfeConfig::default())
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("ctfe").join("config.toml"))
}
