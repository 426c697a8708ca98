use crate::span::Location;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex};

/// Context provided to diagnostic renderers while producing output lines.
pub struct DiagnosticRenderContext<'a> {
    pub context: &'a str,
    pub verbose_info: bool,
}

/// Built-in templates supported by the diagnostic manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticTemplate {
    Pretty,
    Plain,
}

impl DiagnosticTemplate {
    fn render(&self, diagnostic: &Diagnostic, ctx: &DiagnosticRenderContext<'_>) -> Option<Vec<String>> {
        match self {
            DiagnosticTemplate::Pretty => render_pretty(diagnostic, ctx),
            DiagnosticTemplate::Plain => render_plain(diagnostic, ctx),
        }
    }
}

/// Runtime configuration for emitting diagnostics.
#[derive(Debug, Clone)]
pub struct DiagnosticDisplayOptions {
    pub template: DiagnosticTemplate,
    pub verbose_info: bool,
}

impl DiagnosticDisplayOptions {
    pub fn pretty(verbose_info: bool) -> Self {
        Self {
            template: DiagnosticTemplate::Pretty,
            verbose_info,
        }
    }

    pub fn plain(verbose_info: bool) -> Self {
        Self {
            template: DiagnosticTemplate::Plain,
            verbose_info,
        }
    }
}

impl Default for DiagnosticDisplayOptions {
    fn default() -> Self {
        DiagnosticDisplayOptions::pretty(false)
    }
}

/// Severity, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DiagnosticLevel {
    Hint,
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub message: String,
    pub location: Option<Location>,
    pub code: Option<String>,
    /// Display arguments the message was formatted from.
    pub args: Vec<String>,
}

impl Diagnostic {
    pub fn new(level: DiagnosticLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            location: None,
            code: None,
            args: Vec::new(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(DiagnosticLevel::Error, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(DiagnosticLevel::Info, message)
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn is_error(&self) -> bool {
        self.level == DiagnosticLevel::Error
    }
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;

        if let Some(code) = &self.code {
            write!(f, " [{}]", code)?;
        }

        Ok(())
    }
}

/// Receiver for diagnostics produced during a pass.
pub trait DiagnosticSink {
    fn report(&self, diagnostic: Diagnostic);
}

#[derive(Debug, Clone, Default)]
pub struct DiagnosticManager {
    diagnostics: Arc<Mutex<Vec<Diagnostic>>>,
}

impl DiagnosticManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_diagnostic(&self, diagnostic: Diagnostic) {
        if let Ok(mut diagnostics) = self.diagnostics.lock() {
            diagnostics.push(diagnostic);
        }
    }

    pub fn take_diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics
            .lock()
            .map(|mut d| std::mem::take(&mut *d))
            .unwrap_or_default()
    }

    /// Emit diagnostics to stderr using the provided template, each tagged with `context`
    /// (`ctfe` when absent).
    pub fn emit(diagnostics: &[Diagnostic], context: Option<&str>, options: &DiagnosticDisplayOptions) {
        for diagnostic in diagnostics {
            for line in Self::render(diagnostic, context, options) {
                eprintln!("{}", line);
            }
        }
    }

    pub fn render(
        diagnostic: &Diagnostic,
        context: Option<&str>,
        options: &DiagnosticDisplayOptions,
    ) -> Vec<String> {
        let context = context.unwrap_or("ctfe");

        let render_ctx = DiagnosticRenderContext {
            context,
            verbose_info: options.verbose_info,
        };

        options
            .template
            .render(diagnostic, &render_ctx)
            .unwrap_or_default()
    }
}

impl DiagnosticSink for DiagnosticManager {
    fn report(&self, diagnostic: Diagnostic) {
        self.add_diagnostic(diagnostic);
    }
}

impl<T: DiagnosticSink + ?Sized> DiagnosticSink for &T {
    fn report(&self, diagnostic: Diagnostic) {
        (**self).report(diagnostic)
    }
}

fn render_pretty(diagnostic: &Diagnostic, ctx: &DiagnosticRenderContext<'_>) -> Option<Vec<String>> {
    if diagnostic.level < DiagnosticLevel::Warning && !ctx.verbose_info {
        return None;
    }

    let prefix = match diagnostic.level {
        DiagnosticLevel::Error => "error",
        DiagnosticLevel::Warning => "warning",
        DiagnosticLevel::Info => "info",
        DiagnosticLevel::Hint => "hint",
    };

    let header = match diagnostic.code.as_ref() {
        Some(code) => format!("{}[{}]: {} ({})", prefix, code, diagnostic.message, ctx.context),
        None => format!("{}: {} ({})", prefix, diagnostic.message, ctx.context),
    };

    let mut lines = vec![header];

    if let Some(location) = &diagnostic.location {
        lines.push(format!("  --> {}", location));
    }

    Some(lines)
}

fn render_plain(diagnostic: &Diagnostic, ctx: &DiagnosticRenderContext<'_>) -> Option<Vec<String>> {
    if diagnostic.level < DiagnosticLevel::Warning && !ctx.verbose_info {
        return None;
    }

    let level = match diagnostic.level {
        DiagnosticLevel::Error => "ERROR",
        DiagnosticLevel::Warning => "WARNING",
        DiagnosticLevel::Info => "INFO",
        DiagnosticLevel::Hint => "HINT",
    };

    let location = diagnostic
        .location
        .as_ref()
        .map(|location| format!(" {}", location))
        .unwrap_or_default();

    let header = match diagnostic.code.as_ref() {
        Some(code) => format!("[{}] {}{}: {} ({})", ctx.context, level, location, diagnostic.message, code),
        None => format!("[{}] {}{}: {}", ctx.context, level, location, diagnostic.message),
    };

    Some(vec![header])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manager_drains_reported_diagnostics() {
        let manager = DiagnosticManager::new();
        manager.report(Diagnostic::info("generated"));
        manager.report(Diagnostic::error("boom").with_code("CTFE008"));

        let taken = manager.take_diagnostics();
        assert_eq!(taken.len(), 2);
        assert_eq!(taken.iter().filter(|d| d.is_error()).count(), 1);
        assert_eq!(taken[1].to_string(), "boom [CTFE008]");
        assert!(manager.take_diagnostics().is_empty());
    }

    #[test]
    fn pretty_rendering_points_at_the_location() {
        let diagnostic = Diagnostic::error("call to `f` cannot be evaluated")
            .with_code("CTFE003")
            .with_location(Location::new("src/main.rs", 7, 13));

        let lines = DiagnosticManager::render(&diagnostic, Some("demo"), &DiagnosticDisplayOptions::pretty(false));
        assert_eq!(
            lines,
            vec![
                "error[CTFE003]: call to `f` cannot be evaluated (demo)".to_string(),
                "  --> src/main.rs:7:13".to_string(),
            ]
        );
    }

    #[test]
    fn plain_rendering_hides_info_unless_verbose() {
        let diagnostic = Diagnostic::info("serviced 2 call sites")
            .with_code("CTFE009")
            .with_location(Location::new("src/lib.rs", 3, 5));

        let quiet = DiagnosticManager::render(&diagnostic, None, &DiagnosticDisplayOptions::plain(false));
        assert!(quiet.is_empty());

        let verbose = DiagnosticManager::render(&diagnostic, None, &DiagnosticDisplayOptions::plain(true));
        assert_eq!(
            verbose,
            vec!["[ctfe] INFO src/lib.rs:3:5: serviced 2 call sites (CTFE009)".to_string()]
        );
    }
}
