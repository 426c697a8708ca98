//! Dependency resolution for dependent compilations.
//!
//! Binary references are passed to the compiler as they are. References to
//! crates that are still being compiled from source are built once per
//! [`ResolutionScope`] and shared by every evaluation in it.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use ctfe_core::config::MarkerConfig;
use ctfe_core::host::{ExternKind, ExternRef};
use dashmap::DashMap;
use tempfile::TempDir;

use crate::assemble::assemble;
use crate::error::{EvalError, Result};
use crate::rustc::{CrateType, EmitRequest, ImageEmitter};

/// `--extern` entries and `-L dependency=` directories for one compilation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyMap {
    externs: Vec<(String, PathBuf)>,
    search_dirs: BTreeSet<PathBuf>,
}

impl DependencyMap {
    /// Add or replace a direct dependency. Its directory becomes a search
    /// directory so the compiler can find its own dependencies.
    pub fn insert(&mut self, name: impl Into<String>, path: impl Into<PathBuf>) {
        let name = name.into();
        let path = path.into();
        if let Some(dir) = path.parent() {
            self.search_dirs.insert(dir.to_path_buf());
        }
        match self.externs.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = path,
            None => self.externs.push((name, path)),
        }
    }

    pub fn add_search_dir(&mut self, dir: impl Into<PathBuf>) {
        self.search_dirs.insert(dir.into());
    }

    /// Search directories of `other` without its direct dependencies.
    pub fn inherit_search_dirs(&mut self, other: &DependencyMap) {
        self.search_dirs.extend(other.search_dirs.iter().cloned());
    }

    pub fn get(&self, name: &str) -> Option<&Path> {
        self.externs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, path)| path.as_path())
    }

    pub fn externs(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.externs
            .iter()
            .map(|(name, path)| (name.as_str(), path.as_path()))
    }

    pub fn search_dirs(&self) -> impl Iterator<Item = &Path> {
        self.search_dirs.iter().map(|dir| dir.as_path())
    }

    pub fn len(&self) -> usize {
        self.externs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.externs.is_empty()
    }
}

#[derive(Debug, Clone)]
struct BuiltSource {
    rlib: PathBuf,
    deps: DependencyMap,
}

/// Scratch space and built-source cache for one generator run. Everything
/// it created is removed when it is dropped.
#[derive(Debug)]
pub struct ResolutionScope {
    root: TempDir,
    markers: MarkerConfig,
    built: DashMap<String, BuiltSource>,
    counter: AtomicUsize,
}

impl ResolutionScope {
    pub fn acquire(markers: &MarkerConfig) -> Result<Self> {
        let root = tempfile::Builder::new().prefix("ctfe-").tempdir()?;
        tracing::debug!("Acquired resolution scope at {}", root.path().display());
        Ok(Self {
            root,
            markers: markers.clone(),
            built: DashMap::new(),
            counter: AtomicUsize::new(0),
        })
    }

    pub fn path(&self) -> &Path {
        self.root.path()
    }

    /// A fresh directory inside the scope.
    pub fn workspace(&self, label: &str) -> Result<PathBuf> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let label: String = label
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
            .collect();
        let dir = self.root.path().join(format!("{}-{}", label, n));
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Turn extern references into compiler arguments, building source
    /// references on first use.
    pub fn resolve(&self, externs: &[ExternRef], emitter: &dyn ImageEmitter) -> Result<DependencyMap> {
        self.resolve_nested(externs, emitter, &mut Vec::new())
    }

    fn resolve_nested(
        &self,
        externs: &[ExternRef],
        emitter: &dyn ImageEmitter,
        stack: &mut Vec<String>,
    ) -> Result<DependencyMap> {
        let mut deps = DependencyMap::default();
        for extern_ref in externs {
            match &extern_ref.kind {
                ExternKind::Binary { rlib, rmeta } => {
                    let path = rlib.as_ref().or(rmeta.as_ref()).ok_or_else(|| {
                        EvalError::emit(format!(
                            "dependency `{}` has no built artifact",
                            extern_ref.name
                        ))
                    })?;
                    deps.insert(&extern_ref.name, path);
                }
                ExternKind::Source(compilation) => {
                    let key = compilation.crate_name.clone();
                    let cached = self.built.get(&key).map(|entry| entry.value().clone());
                    let built = match cached {
                        Some(built) => built,
                        None => {
                            if stack.contains(&key) {
                                return Err(EvalError::emit(format!(
                                    "dependency cycle through `{}`",
                                    key
                                )));
                            }
                            stack.push(key.clone());
                            let nested = self.resolve_nested(&compilation.externs, emitter, stack)?;
                            stack.pop();

                            let image = assemble(compilation, &[], &self.markers)?;
                            let dir = self.workspace(&format!("dep_{}", key))?;
                            tracing::debug!("Building source dependency `{}`", key);
                            let rlib = emitter
                                .emit(&EmitRequest {
                                    crate_name: &compilation.crate_name,
                                    crate_type: CrateType::Lib,
                                    source: &image.source,
                                    out_dir: &dir,
                                    deps: &nested,
                                })
                                .map_err(|err| EvalError::Emit {
                                    messages: err
                                        .messages()
                                        .into_iter()
                                        .map(|m| format!("in dependency `{}`: {}", key, m))
                                        .collect(),
                                })?;
                            let built = BuiltSource { rlib, deps: nested };
                            self.built.insert(key, built.clone());
                            built
                        }
                    };
                    deps.insert(&extern_ref.name, &built.rlib);
                    deps.inherit_search_dirs(&built.deps);
                }
            }
        }
        Ok(deps)
    }
}

impl Drop for ResolutionScope {
    fn drop(&mut self) {
        tracing::debug!(
            "Releasing resolution scope at {} ({} source dependencies)",
            self.root.path().display(),
            self.built.len()
        );
    }
}
