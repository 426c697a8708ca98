//! Interfaces consumed from the surrounding build.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::Result;
use crate::model::InterceptToken;
use crate::span::Location;

/// One source file of a crate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUnit {
    pub path: PathBuf,
    /// Module path from the crate root; empty for the root file.
    pub module_path: Vec<String>,
    pub text: String,
}

impl SourceUnit {
    pub fn new(path: impl Into<PathBuf>, module_path: Vec<String>, text: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            module_path,
            text: text.into(),
        }
    }

    pub fn root(path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        Self::new(path, Vec::new(), text)
    }
}

#[derive(Debug, Clone)]
pub enum ExternKind {
    /// Built artifacts of a dependency.
    Binary {
        rlib: Option<PathBuf>,
        rmeta: Option<PathBuf>,
    },
    /// A dependency that is itself still being compiled from source.
    Source(Arc<Compilation>),
}

#[derive(Debug, Clone)]
pub struct ExternRef {
    pub name: String,
    pub kind: ExternKind,
}

impl ExternRef {
    pub fn binary(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let is_meta = path.extension().is_some_and(|ext| ext == "rmeta");
        let kind = if is_meta {
            ExternKind::Binary {
                rlib: None,
                rmeta: Some(path),
            }
        } else {
            ExternKind::Binary {
                rlib: Some(path),
                rmeta: None,
            }
        };
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn source(name: impl Into<String>, compilation: Compilation) -> Self {
        Self {
            name: name.into(),
            kind: ExternKind::Source(Arc::new(compilation)),
        }
    }
}

/// The crate being built, as seen by the generator.
#[derive(Debug, Clone, Default)]
pub struct Compilation {
    pub crate_name: String,
    /// Directory extra-file directives are resolved against.
    pub base_dir: Option<PathBuf>,
    pub units: Vec<SourceUnit>,
    pub externs: Vec<ExternRef>,
}

impl Compilation {
    pub fn new(crate_name: impl Into<String>) -> Self {
        Self {
            crate_name: crate_name.into(),
            ..Default::default()
        }
    }

    pub fn with_unit(mut self, unit: SourceUnit) -> Self {
        self.units.push(unit);
        self
    }

    pub fn with_extern(mut self, extern_ref: ExternRef) -> Self {
        self.externs.push(extern_ref);
        self
    }

    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    pub fn unit(&self, module_path: &[String]) -> Option<&SourceUnit> {
        self.units.iter().find(|unit| unit.module_path == module_path)
    }

    pub fn unit_by_path(&self, path: &Path) -> Option<&SourceUnit> {
        self.units.iter().find(|unit| unit.path == path)
    }
}

/// Issues location tokens for call sites that may be redirected.
pub trait InterceptionHost {
    /// `None` when the location cannot be addressed by a binding.
    fn intercept(&self, location: &Location) -> Option<InterceptToken>;
}

/// A code-producing component run against the crate before evaluation.
pub trait SourceGenerator: Send + Sync {
    fn name(&self) -> &str;
    fn generate(&self, compilation: &Compilation) -> Result<Vec<SourceUnit>>;
}

pub trait PluginLoader {
    fn load(&self, name: &str) -> Result<Arc<dyn SourceGenerator>>;
}

/// A named source file produced by a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedUnit {
    pub name: String,
    pub text: String,
}
