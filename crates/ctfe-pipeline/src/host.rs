//! File-system host: loads crates from disk and addresses call sites by
//! file, line and column.

use std::path::Path;

use ctfe_core::config::OutputConfig;
use ctfe_core::host::{Compilation, InterceptionHost};
use ctfe_core::model::InterceptToken;
use ctfe_core::span::Location;

#[derive(Debug, Clone)]
pub struct FsHost {
    binding_attribute: String,
}

impl FsHost {
    pub fn new(config: &OutputConfig) -> Self {
        Self {
            binding_attribute: config.binding_attribute.clone(),
        }
    }

    /// Load the crate rooted at `root`, following `mod` declarations.
    pub fn load(&self, root: &Path, crate_name: Option<&str>) -> ctfe_core::Result<Compilation> {
        ctfe_rust::load_crate(root, crate_name)
    }
}

impl Default for FsHost {
    fn default() -> Self {
        Self::new(&OutputConfig::default())
    }
}

impl InterceptionHost for FsHost {
    fn intercept(&self, location: &Location) -> Option<InterceptToken> {
        if location.in_macro || !location.is_known() {
            return None;
        }
        let path = location.file().to_string_lossy().replace('\\', "/");
        Some(InterceptToken {
            id: format!("{}:{}:{}", path, location.line, location.column),
            binding: format!(
                "#[{}(path = {:?}, line = {}, column = {})]",
                self.binding_attribute, path, location.line, location.column
            ),
        })
    }
}
