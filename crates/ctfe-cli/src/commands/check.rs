//! `ctfe check`: discovery and call-site analysis without evaluation.

use std::path::PathBuf;

use clap::Args;
use ctfe_core::DiagnosticManager;
use ctfe_interpret::RustcEmitter;
use ctfe_pipeline::{FsHost, GeneratorPass, PluginRegistry};

use super::{load_compilation, CommandContext};
use crate::diagnostics::emit_diagnostics;
use crate::{CliError, Result};

#[derive(Debug, Clone, Args)]
pub struct CheckArgs {
    /// Crate root file, e.g. `src/lib.rs`
    pub root: PathBuf,

    /// Crate name (defaults to the package directory name)
    #[arg(long)]
    pub crate_name: Option<String>,
}

pub fn check_command(args: CheckArgs, ctx: &CommandContext) -> Result<()> {
    let host = FsHost::new(&ctx.config.output);
    let compilation = load_compilation(&host, &args.root, args.crate_name.as_deref(), &[])?;

    let emitter = RustcEmitter::from_config(&ctx.config.evaluation);
    let plugins = PluginRegistry::new();
    let diagnostics = DiagnosticManager::new();
    let pass = GeneratorPass::new(&ctx.config, &host, &plugins, &diagnostics, &emitter);
    let Some(analysis) = pass.analyze(&compilation)? else {
        return Ok(());
    };

    let errors = emit_diagnostics(&diagnostics.take_diagnostics(), &ctx.display);
    let valid = analysis.functions.iter().filter(|f| f.is_valid()).count();
    let sites: usize = analysis.sites.values().map(Vec::len).sum();
    println!(
        "{} compile-time function(s), {} valid, {} call site(s) to evaluate",
        analysis.functions.len(),
        valid,
        sites
    );
    if errors > 0 {
        return Err(CliError::Diagnostics { errors });
    }
    Ok(())
}
