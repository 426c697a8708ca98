//! `ctfe generate`: run a full pass and write the generated units.

use std::fs;
use std::path::{Path, PathBuf};

use clap::Args;
use ctfe_core::DiagnosticManager;
use ctfe_interpret::RustcEmitter;
use ctfe_pipeline::{FsHost, GeneratorPass, PluginRegistry};
use tracing::{debug, info, info_span};

use super::{load_compilation, parse_extern, CommandContext};
use crate::diagnostics::emit_diagnostics;
use crate::{CliError, Result};

const UNIT_SUFFIX: &str = ".ctfe.rs";

#[derive(Debug, Clone, Args)]
pub struct GenerateArgs {
    /// Crate root file, e.g. `src/lib.rs`
    pub root: PathBuf,

    /// Directory receiving one `<function>.ctfe.rs` unit per function
    #[arg(long)]
    pub out_dir: PathBuf,

    /// Crate name (defaults to the package directory name)
    #[arg(long)]
    pub crate_name: Option<String>,

    /// Dependency as NAME=PATH; `.rlib`/`.rmeta` files or a source crate root
    #[arg(long = "extern", value_name = "NAME=PATH", value_parser = parse_extern)]
    pub externs: Vec<(String, PathBuf)>,
}

pub fn generate_command(args: GenerateArgs, ctx: &CommandContext) -> Result<()> {
    let _span = info_span!("generate", root = %args.root.display()).entered();
    let host = FsHost::new(&ctx.config.output);
    let compilation = load_compilation(&host, &args.root, args.crate_name.as_deref(), &args.externs)?;

    let emitter = RustcEmitter::from_config(&ctx.config.evaluation);
    let plugins = PluginRegistry::new();
    let diagnostics = DiagnosticManager::new();
    let pass = GeneratorPass::new(&ctx.config, &host, &plugins, &diagnostics, &emitter);
    let units = pass.run(&compilation)?.unwrap_or_default();

    fs::create_dir_all(&args.out_dir)?;
    let written = write_units(&args.out_dir, &units)?;
    remove_stale(&args.out_dir, &units)?;

    let errors = emit_diagnostics(&diagnostics.take_diagnostics(), &ctx.display);
    info!(
        "Generated {} unit(s) in {} ({} rewritten)",
        units.len(),
        args.out_dir.display(),
        written
    );
    if errors > 0 {
        return Err(CliError::Diagnostics { errors });
    }
    Ok(())
}

/// Write units whose content changed. Returns how many were written.
fn write_units(out_dir: &Path, units: &[ctfe_core::GeneratedUnit]) -> Result<usize> {
    let mut written = 0;
    for unit in units {
        let path = out_dir.join(&unit.name);
        if fs::read_to_string(&path).is_ok_and(|existing| existing == unit.text) {
            debug!("{} is up to date", path.display());
            continue;
        }
        fs::write(&path, &unit.text)?;
        written += 1;
    }
    Ok(written)
}

/// Drop units from earlier runs whose function no longer produces output.
fn remove_stale(out_dir: &Path, units: &[ctfe_core::GeneratedUnit]) -> Result<()> {
    for entry in fs::read_dir(out_dir)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        if name.ends_with(UNIT_SUFFIX) && !units.iter().any(|unit| unit.name == name) {
            debug!("Removing stale unit {}", path.display());
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctfe_core::GeneratedUnit;
    use pretty_assertions::assert_eq;

    fn unit(name: &str, text: &str) -> GeneratedUnit {
        GeneratedUnit {
            name: name.to_string(),
            text: text.to_string(),
        }
    }

    #[test]
    fn unchanged_units_are_not_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let units = vec![unit("a.ctfe.rs", "const A: i32 = 1;\n")];
        assert_eq!(write_units(dir.path(), &units).unwrap(), 1);
        assert_eq!(write_units(dir.path(), &units).unwrap(), 0);
    }

    #[test]
    fn stale_units_are_removed() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("old.ctfe.rs"), "").unwrap();
        fs::write(dir.path().join("keep.rs"), "").unwrap();
        let units = vec![unit("a.ctfe.rs", "")];
        write_units(dir.path(), &units).unwrap();
        remove_stale(dir.path(), &units).unwrap();

        let mut names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().into_string().unwrap())
            .collect();
        names.sort();
        assert_eq!(names, vec!["a.ctfe.rs", "keep.rs"]);
    }
}
