//! Error reporting for the `ctfe` binary.

use ctfe_core::diagnostics::{Diagnostic, DiagnosticDisplayOptions, DiagnosticManager};
use miette::{Diagnostic as MietteDiagnostic, NamedSource, SourceSpan};
use thiserror::Error;

use crate::{CliError, Result};

/// Set up enhanced error reporting with miette
pub fn setup_error_reporting() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(false)
                .unicode(true)
                .context_lines(2)
                .build(),
        )
    }))
    .map_err(|e| CliError::Config(format!("Failed to setup error reporting: {}", e)))?;
    Ok(())
}

/// A constant expression given on the command line that could not be used.
#[derive(Error, Debug, MietteDiagnostic)]
#[error("{message}")]
#[diagnostic(code(ctfe::eval), help("only literals, operators and standard constructors are evaluated"))]
pub struct ExpressionError {
    pub message: String,
    #[source_code]
    pub src: NamedSource<String>,
    #[label("here")]
    pub span: SourceSpan,
}

impl ExpressionError {
    pub fn new(src: &str, span: SourceSpan, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            src: NamedSource::new("<expr>", src.to_string()),
            span,
        }
    }

    /// Point at the token `error` was raised for.
    pub fn from_syn(src: &str, error: &syn::Error) -> Self {
        let start = error.span().start();
        let end = error.span().end();
        let from = offset(src, start.line, start.column);
        let to = offset(src, end.line, end.column).max(from);
        Self::new(src, (from, to - from).into(), error.to_string())
    }
}

fn offset(src: &str, line: usize, column: usize) -> usize {
    let mut offset = 0;
    for (index, text) in src.split_inclusive('\n').enumerate() {
        if index + 1 == line {
            return offset
                + text
                    .char_indices()
                    .nth(column)
                    .map(|(i, _)| i)
                    .unwrap_or(text.len());
        }
        offset += text.len();
    }
    src.len()
}

/// Print collected pass diagnostics to stderr. Returns the error count.
pub fn emit_diagnostics(diagnostics: &[Diagnostic], options: &DiagnosticDisplayOptions) -> usize {
    DiagnosticManager::emit(diagnostics, Some("ctfe"), options);
    diagnostics.iter().filter(|d| d.is_error()).count()
}

/// Render errors that carry their own presentation. Returns `false` when the
/// caller should log the error instead.
pub fn render_cli_error(error: &CliError) -> bool {
    match error {
        CliError::Expression(err) => {
            let mut out = String::new();
            if miette::GraphicalReportHandler::new()
                .render_report(&mut out, err)
                .is_err()
            {
                return false;
            }
            eprintln!("{}", out);
            true
        }
        CliError::Diagnostics { .. } => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn syn_errors_point_at_the_token() {
        let src = "1 + + 2";
        let error = syn::parse_str::<syn::Expr>(src).unwrap_err();
        let report = ExpressionError::from_syn(src, &error);
        assert_eq!(report.span.offset(), 4);
    }

    #[test]
    fn offsets_follow_lines() {
        let src = "vec![\n    1,\n    x]";
        assert_eq!(offset(src, 3, 4), 17);
        assert_eq!(offset(src, 9, 0), src.len());
    }

    #[test]
    fn error_count_ignores_infos() {
        let diagnostics = vec![
            Diagnostic::info("generated"),
            Diagnostic::error("failed").with_code("CTFE005"),
        ];
        assert_eq!(emit_diagnostics(&diagnostics, &DiagnosticDisplayOptions::plain(false)), 1);
    }
}
