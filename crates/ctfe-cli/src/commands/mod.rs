//! Command implementations for the `ctfe` binary

pub mod check;
pub mod eval;
pub mod generate;

pub use check::check_command;
pub use eval::eval_command;
pub use generate::generate_command;

use std::path::{Path, PathBuf};

use ctfe_core::diagnostics::DiagnosticDisplayOptions;
use ctfe_core::host::{Compilation, ExternRef};
use ctfe_pipeline::FsHost;

use crate::{CliError, Result};

/// Settings shared by every command.
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub config: ctfe_core::CtfeConfig,
    pub display: DiagnosticDisplayOptions,
}

/// Parse `NAME=PATH` as given to `--extern`.
pub fn parse_extern(text: &str) -> std::result::Result<(String, PathBuf), String> {
    let (name, path) = text
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=PATH, found `{}`", text))?;
    let name = name.trim();
    if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return Err(format!("`{}` is not a crate name", name));
    }
    if path.is_empty() {
        return Err(format!("missing path for extern `{}`", name));
    }
    Ok((name.to_string(), PathBuf::from(path)))
}

/// Load a crate root together with its externs. `.rlib` and `.rmeta` paths
/// are binary dependencies; anything else is loaded as a source crate.
pub fn load_compilation(
    host: &FsHost,
    root: &Path,
    crate_name: Option<&str>,
    externs: &[(String, PathBuf)],
) -> Result<Compilation> {
    if !root.is_file() {
        return Err(CliError::InvalidInput(format!(
            "crate root {} is not a file",
            root.display()
        )));
    }
    let mut compilation = host.load(root, crate_name)?;
    for (name, path) in externs {
        let binary = path
            .extension()
            .is_some_and(|ext| ext == "rlib" || ext == "rmeta");
        let extern_ref = if binary {
            ExternRef::binary(name.clone(), path.clone())
        } else {
            ExternRef::source(name.clone(), host.load(path, Some(name))?)
        };
        compilation = compilation.with_extern(extern_ref);
    }
    Ok(compilation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn extern_arguments() {
        assert_eq!(
            parse_extern("helpers=target/libhelpers.rlib").unwrap(),
            ("helpers".to_string(), PathBuf::from("target/libhelpers.rlib"))
        );
        assert!(parse_extern("helpers").is_err());
        assert!(parse_extern("=x.rlib").is_err());
        assert!(parse_extern("my-crate=x.rlib").is_err());
        assert!(parse_extern("helpers=").is_err());
    }
}
