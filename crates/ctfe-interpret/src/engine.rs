//! Evaluation of compile-time functions through dependent compilation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use ctfe_core::config::CtfeConfig;
use ctfe_core::host::{Compilation, PluginLoader, SourceUnit};
use ctfe_core::model::{AnnotatedFunction, Evaluated, FunctionId};
use ctfe_core::shape::Shape;

use crate::assemble::{assemble, AssembledImage, IMAGE_CRATE};
use crate::error::{EvalError, Result};
use crate::resolve::{DependencyMap, ResolutionScope};
use crate::runner::{runner_source, RunnerSpec};
use crate::rustc::{CrateType, EmitRequest, ImageEmitter};
use crate::sandbox::Sandbox;
use crate::wire::decode_output;

const RUNNER_CRATE: &str = "ctfe_runner";

/// A compiled crate image, ready to run argument groups against.
#[derive(Debug)]
pub struct PreparedImage {
    pub function: FunctionId,
    pub rlib: PathBuf,
    /// Dependencies of a runner, including the image itself.
    pub deps: DependencyMap,
    pub target: Vec<String>,
    function_module: Vec<String>,
    extra_uses: Vec<String>,
    image: AssembledImage,
    workdir: PathBuf,
}

pub struct EvaluationEngine<'a> {
    config: &'a CtfeConfig,
    emitter: &'a dyn ImageEmitter,
    scope: &'a ResolutionScope,
    plugins: &'a dyn PluginLoader,
    sandbox: Sandbox,
}

impl<'a> EvaluationEngine<'a> {
    pub fn new(
        config: &'a CtfeConfig,
        emitter: &'a dyn ImageEmitter,
        scope: &'a ResolutionScope,
        plugins: &'a dyn PluginLoader,
    ) -> Self {
        Self {
            config,
            emitter,
            scope,
            plugins,
            sandbox: Sandbox::new(Duration::from_millis(config.evaluation.timeout_ms)),
        }
    }

    /// Build the crate image for `function`. Failures here are fatal for
    /// the whole function.
    pub fn prepare(&self, compilation: &Compilation, function: &AnnotatedFunction) -> Result<PreparedImage> {
        let mut extra = Vec::new();
        for name in &function.directives.plugins {
            let generator = self
                .plugins
                .load(name)
                .map_err(|e| EvalError::emit(format!("plugin `{}` could not be loaded: {}", name, e)))?;
            let units = generator
                .generate(compilation)
                .map_err(|e| EvalError::emit(format!("plugin `{}` failed: {}", generator.name(), e)))?;
            tracing::debug!("Plugin `{}` produced {} unit(s)", generator.name(), units.len());
            extra.extend(units);
        }
        for file in &function.directives.files {
            extra.push(self.extra_file(compilation, file)?);
        }

        let mut deps = self.scope.resolve(&compilation.externs, self.emitter)?;
        let image = assemble(compilation, &extra, &self.config.markers)?;
        let dir = self.scope.workspace(&function.id.mangled())?;
        tracing::debug!("Emitting crate image for `{}` in {}", function.id, dir.display());
        let rlib = self.emitter.emit(&EmitRequest {
            crate_name: IMAGE_CRATE,
            crate_type: CrateType::Lib,
            source: &image.source,
            out_dir: &dir,
            deps: &deps,
        })?;

        if !rlib.exists() {
            return Err(EvalError::Load(format!(
                "crate image {} does not exist",
                rlib.display()
            )));
        }
        if let Some((name, path)) = deps.externs().find(|(_, path)| !path.exists()) {
            return Err(EvalError::Load(format!(
                "dependency `{}` was not found at {}",
                name,
                path.display()
            )));
        }
        let target = image.locate(function)?;
        deps.insert(IMAGE_CRATE, &rlib);

        let workdir = match &compilation.base_dir {
            Some(base) if base.is_dir() => base.clone(),
            _ => dir,
        };
        Ok(PreparedImage {
            function: function.id.clone(),
            rlib,
            deps,
            target,
            function_module: function.module_path.clone(),
            extra_uses: function.directives.uses.clone(),
            image,
            workdir,
        })
    }

    /// Run one argument group. Failures are scoped to the group.
    pub fn invoke(
        &self,
        image: &PreparedImage,
        shape: &Shape,
        args: &[String],
        caller_module: &[String],
    ) -> Result<Evaluated> {
        let source = runner_source(&RunnerSpec {
            target: &image.target,
            shape,
            args,
            caller_module,
            caller_uses: image.image.uses_of(caller_module),
            extra_uses: &image.extra_uses,
            function_module: &image.function_module,
        });
        let dir = self.scope.workspace("runner")?;
        let program = self
            .emitter
            .emit(&EmitRequest {
                crate_name: RUNNER_CRATE,
                crate_type: CrateType::Bin,
                source: &source,
                out_dir: &dir,
                deps: &image.deps,
            })
            .map_err(|err| match err {
                EvalError::Emit { messages } => EvalError::Invocation(messages.join("\n")),
                other => other,
            })?;

        tracing::debug!("Invoking `{}({})`", image.function, args.join(", "));
        let output = self.sandbox.run(&program, &image.workdir)?;
        let value = decode_output(&output.stdout, shape)?;
        Ok(Evaluated {
            value,
            shape: shape.clone(),
        })
    }

    fn extra_file(&self, compilation: &Compilation, file: &str) -> Result<SourceUnit> {
        let path = match &compilation.base_dir {
            Some(base) => base.join(file),
            None => PathBuf::from(file),
        };
        let text = std::fs::read_to_string(&path)
            .map_err(|e| EvalError::emit(format!("cannot read `{}`: {}", path.display(), e)))?;
        Ok(SourceUnit::new(
            PathBuf::from(file),
            vec![module_name(Path::new(file))],
            text,
        ))
    }
}

/// Module name for an extra file: its stem made into an identifier.
fn module_name(file: &Path) -> String {
    let stem = file
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut name: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert(0, '_');
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn extra_file_modules_are_identifiers() {
        assert_eq!(module_name(Path::new("data/month-names.rs")), "month_names");
        assert_eq!(module_name(Path::new("2024.rs")), "_2024");
        assert_eq!(module_name(Path::new("tables.rs")), "tables");
    }
}
