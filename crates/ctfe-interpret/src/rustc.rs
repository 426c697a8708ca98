//! Driving `rustc` for dependent compilations.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use ctfe_core::config::EvaluationConfig;

use crate::error::{EvalError, Result};
use crate::resolve::DependencyMap;

/// Kind of artifact to produce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrateType {
    Lib,
    Bin,
}

impl CrateType {
    fn flag(&self) -> &'static str {
        match self {
            CrateType::Lib => "rlib",
            CrateType::Bin => "bin",
        }
    }
}

#[derive(Debug, Clone)]
pub struct EmitRequest<'a> {
    pub crate_name: &'a str,
    pub crate_type: CrateType,
    pub source: &'a str,
    pub out_dir: &'a Path,
    pub deps: &'a DependencyMap,
}

/// Compiles a single source text into a library or an executable.
pub trait ImageEmitter {
    fn emit(&self, request: &EmitRequest<'_>) -> Result<PathBuf>;
}

#[derive(Debug, Clone)]
pub struct RustcEmitter {
    pub program: PathBuf,
    pub edition: String,
    pub cfg_flags: Vec<String>,
    pub args: Vec<String>,
    pub max_messages: usize,
}

impl Default for RustcEmitter {
    fn default() -> Self {
        Self {
            program: PathBuf::from("rustc"),
            edition: "2021".to_string(),
            cfg_flags: Vec::new(),
            args: Vec::new(),
            max_messages: 5,
        }
    }
}

impl RustcEmitter {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    pub fn from_config(config: &EvaluationConfig) -> Self {
        let mut emitter = Self::new(config.rustc_program())
            .with_edition(config.edition.clone())
            .with_max_messages(config.max_emit_messages);
        if !config.cfg_flag.is_empty() {
            emitter = emitter.with_cfg(config.cfg_flag.clone());
        }
        for arg in &config.extra_rustc_args {
            emitter = emitter.with_arg(arg.clone());
        }
        emitter
    }

    pub fn with_edition(mut self, edition: impl Into<String>) -> Self {
        self.edition = edition.into();
        self
    }

    /// Add a `--cfg` flag
    pub fn with_cfg(mut self, cfg: impl Into<String>) -> Self {
        self.cfg_flags.push(cfg.into());
        self
    }

    /// Add a raw compiler argument
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn with_max_messages(mut self, max: usize) -> Self {
        self.max_messages = max.max(1);
        self
    }

    /// Whether the compiler can be started at all.
    pub fn is_available(&self) -> bool {
        Command::new(&self.program)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }

    fn output_path(request: &EmitRequest<'_>) -> PathBuf {
        match request.crate_type {
            CrateType::Lib => request
                .out_dir
                .join(format!("lib{}.rlib", request.crate_name)),
            CrateType::Bin => request
                .out_dir
                .join(format!("{}{}", request.crate_name, std::env::consts::EXE_SUFFIX)),
        }
    }

    fn command(&self, request: &EmitRequest<'_>, source: &Path, output: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg(source)
            .arg("--crate-name")
            .arg(request.crate_name)
            .arg("--crate-type")
            .arg(request.crate_type.flag())
            .arg("--edition")
            .arg(&self.edition)
            .arg("--cap-lints")
            .arg("allow")
            .arg("--error-format=json")
            .arg("-o")
            .arg(output);
        for cfg in &self.cfg_flags {
            cmd.arg("--cfg").arg(cfg);
        }
        for dir in request.deps.search_dirs() {
            cmd.arg("-L").arg(format!("dependency={}", dir.display()));
        }
        for (name, path) in request.deps.externs() {
            cmd.arg("--extern").arg(format!("{}={}", name, path.display()));
        }
        cmd.args(&self.args);
        cmd.current_dir(request.out_dir);
        cmd
    }
}

impl ImageEmitter for RustcEmitter {
    fn emit(&self, request: &EmitRequest<'_>) -> Result<PathBuf> {
        std::fs::create_dir_all(request.out_dir)?;
        let source = request.out_dir.join(format!("{}.rs", request.crate_name));
        std::fs::write(&source, request.source)?;
        let output = Self::output_path(request);

        let mut cmd = self.command(request, &source, &output);
        tracing::debug!("Running compiler: {:?}", cmd);
        let result = cmd.output().map_err(|source| EvalError::Toolchain {
            program: self.program.display().to_string(),
            source,
        })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(EvalError::Emit {
                messages: error_messages(&stderr, self.max_messages),
            });
        }
        if !output.exists() {
            return Err(EvalError::emit(format!(
                "compiler reported success but produced no output at {}",
                output.display()
            )));
        }
        Ok(output)
    }
}

/// Error-level messages from `--error-format=json` output, at most `limit`.
pub fn error_messages(stderr: &str, limit: usize) -> Vec<String> {
    let mut messages = Vec::new();
    for line in stderr.lines().map(str::trim).filter(|line| !line.is_empty()) {
        if messages.len() >= limit {
            break;
        }
        let Ok(json) = serde_json::from_str::<serde_json::Value>(line) else {
            messages.push(line.to_string());
            continue;
        };
        if json.get("level").and_then(|level| level.as_str()) != Some("error") {
            continue;
        }
        let message = json
            .get("message")
            .and_then(|message| message.as_str())
            .unwrap_or_default();
        if message.starts_with("aborting due to") {
            continue;
        }
        let primary = json
            .get("spans")
            .and_then(|spans| spans.as_array())
            .and_then(|spans| {
                spans
                    .iter()
                    .find(|span| span.get("is_primary").and_then(|p| p.as_bool()) == Some(true))
            });
        let text = match primary {
            Some(span) => {
                let file = span
                    .get("file_name")
                    .and_then(|f| f.as_str())
                    .map(|f| {
                        Path::new(f)
                            .file_name()
                            .map(|name| name.to_string_lossy().into_owned())
                            .unwrap_or_else(|| f.to_string())
                    })
                    .unwrap_or_default();
                let line = span.get("line_start").and_then(|l| l.as_u64()).unwrap_or(0);
                format!("{}:{}: {}", file, line, message)
            }
            None => message.to_string(),
        };
        messages.push(text);
    }
    if messages.is_empty() {
        messages.push("the compiler exited with an error".to_string());
    }
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn collects_error_messages_up_to_the_limit() {
        let stderr = r#"{"level":"warning","message":"unused variable","spans":[]}
{"level":"error","message":"cannot find value `x` in this scope","spans":[{"file_name":"/tmp/ctfe-1/ctfe_image.rs","line_start":3,"is_primary":true}]}
{"level":"error","message":"mismatched types","spans":[]}
{"level":"error","message":"third","spans":[]}
{"level":"error","message":"aborting due to 3 previous errors","spans":[]}
"#;
        assert_eq!(
            error_messages(stderr, 2),
            vec![
                "ctfe_image.rs:3: cannot find value `x` in this scope".to_string(),
                "mismatched types".to_string(),
            ]
        );
    }

    #[test]
    fn plain_output_is_kept() {
        assert_eq!(
            error_messages("error: unknown flag\n", 5),
            vec!["error: unknown flag".to_string()]
        );
        assert_eq!(error_messages("", 5).len(), 1);
    }

    #[test]
    fn builder_applies_configuration() {
        let mut config = EvaluationConfig::default();
        config.rustc = Some(PathBuf::from("/opt/rust/bin/rustc"));
        config.extra_rustc_args = vec!["-Copt-level=1".to_string()];
        let emitter = RustcEmitter::from_config(&config);
        assert_eq!(emitter.cfg_flags, vec!["ctfe".to_string()]);
        assert_eq!(emitter.args, vec!["-Copt-level=1".to_string()]);
        assert_eq!(emitter.max_messages, 5);
    }
}
