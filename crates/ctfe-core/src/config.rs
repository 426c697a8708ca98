//! Generator configuration

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CtfeConfig {
    /// Attribute names recognised by discovery
    pub markers: MarkerConfig,

    /// Dependent compilation and execution settings
    pub evaluation: EvaluationConfig,

    /// Generated code settings
    pub output: OutputConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerConfig {
    pub comptime: String,
    pub files: String,
    pub uses: String,
    pub plugins: String,
}

impl Default for MarkerConfig {
    fn default() -> Self {
        Self {
            comptime: "comptime".to_string(),
            files: "comptime_files".to_string(),
            uses: "comptime_uses".to_string(),
            plugins: "comptime_plugins".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Compiler used for dependent compilations; `RUSTC` overrides it
    pub rustc: Option<PathBuf>,

    /// Edition passed to the compiler
    pub edition: String,

    /// Wall-clock limit for one invocation
    pub timeout_ms: u64,

    /// Compiler messages kept when the crate image fails to build
    pub max_emit_messages: usize,

    /// `--cfg` flag set while building the crate image
    pub cfg_flag: String,

    pub extra_rustc_args: Vec<String>,

    /// Re-evaluate every generated literal and compare it with the runner's value
    pub verify_round_trip: bool,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            rustc: None,
            edition: "2021".to_string(),
            timeout_ms: 10_000,
            max_emit_messages: 5,
            cfg_flag: "ctfe".to_string(),
            extra_rustc_args: Vec::new(),
            verify_round_trip: true,
        }
    }
}

impl EvaluationConfig {
    pub fn rustc_program(&self) -> PathBuf {
        if let Some(path) = std::env::var_os("RUSTC") {
            return PathBuf::from(path);
        }
        self.rustc.clone().unwrap_or_else(|| PathBuf::from("rustc"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Attribute path used for redirection bindings
    pub binding_attribute: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            binding_attribute: "ctfe::intercepts".to_string(),
        }
    }
}

impl CtfeConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        toml::from_str(&content).map_err(|e| {
            Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
        })
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = CtfeConfig::default();
        assert_eq!(config.markers.comptime, "comptime");
        assert_eq!(config.evaluation.max_emit_messages, 5);
        assert!(config.evaluation.verify_round_trip);
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config = CtfeConfig::from_toml_str(
            r#"
            [evaluation]
            timeout_ms = 500
            "#,
        )
        .unwrap();
        assert_eq!(config.evaluation.timeout_ms, 500);
        assert_eq!(config.evaluation.edition, "2021");
        assert_eq!(config.output.binding_attribute, "ctfe::intercepts");
    }

    #[test]
    fn test_config_file_operations() {
        let mut config = CtfeConfig::default();
        config.markers.comptime = "ctfe::comptime".to_string();
        let temp_file = NamedTempFile::new().unwrap();

        config.save_to_file(temp_file.path()).unwrap();
        let loaded_config = CtfeConfig::load_from_file(temp_file.path()).unwrap();

        assert_eq!(config, loaded_config);
    }
}
