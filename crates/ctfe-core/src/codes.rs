//! Diagnostic descriptors reported by the generator.
//!
//! Templates use positional `{0}`, `{1}` placeholders filled from the
//! display arguments.

use crate::diagnostics::{Diagnostic, DiagnosticLevel};
use crate::span::Location;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiagnosticDescriptor {
    pub code: &'static str,
    pub level: DiagnosticLevel,
    pub title: &'static str,
    pub template: &'static str,
}

impl DiagnosticDescriptor {
    pub fn format(&self, args: &[String]) -> String {
        let mut message = self.template.to_string();
        for (index, arg) in args.iter().enumerate() {
            message = message.replace(&format!("{{{}}}", index), arg);
        }
        message
    }

    pub fn at(&self, location: Option<Location>, args: Vec<String>) -> Diagnostic {
        let mut diagnostic = Diagnostic::new(self.level, self.format(&args))
            .with_code(self.code)
            .with_args(args);
        diagnostic.location = location;
        diagnostic
    }
}

pub const NOT_EXTENSIBLE: DiagnosticDescriptor = DiagnosticDescriptor {
    code: "CTFE001",
    level: DiagnosticLevel::Error,
    title: "Container is not open for extension",
    template: "compile-time function `{0}` is declared in {1}, which cannot receive generated items; move it to a module or an inherent impl",
};

pub const NOT_STATIC: DiagnosticDescriptor = DiagnosticDescriptor {
    code: "CTFE002",
    level: DiagnosticLevel::Error,
    title: "Compile-time function takes a receiver",
    template: "compile-time function `{0}` must not take `self`",
};

pub const NON_LITERAL_ARGUMENT: DiagnosticDescriptor = DiagnosticDescriptor {
    code: "CTFE003",
    level: DiagnosticLevel::Error,
    title: "Argument is not a literal-only expression",
    template: "call to `{0}` cannot be evaluated at compile time: argument references `{1}`, which is not a constant",
};

pub const EMIT_FAILED: DiagnosticDescriptor = DiagnosticDescriptor {
    code: "CTFE004",
    level: DiagnosticLevel::Error,
    title: "Dependent compilation failed",
    template: "failed to compile the crate image for `{0}`: {1}",
};

pub const INVOCATION_FAILED: DiagnosticDescriptor = DiagnosticDescriptor {
    code: "CTFE005",
    level: DiagnosticLevel::Error,
    title: "Compile-time invocation failed",
    template: "evaluating `{0}({1})` failed: {2}",
};

pub const UNSUPPORTED_RETURN_TYPE: DiagnosticDescriptor = DiagnosticDescriptor {
    code: "CTFE006",
    level: DiagnosticLevel::Error,
    title: "Return type cannot be expressed as a literal",
    template: "compile-time function `{0}` returns `{1}`, which cannot be generated as a literal: {2}",
};

pub const SERIALIZATION_FAILED: DiagnosticDescriptor = DiagnosticDescriptor {
    code: "CTFE007",
    level: DiagnosticLevel::Error,
    title: "Result could not be serialized",
    template: "result of `{0}({1})` could not be written as a literal: {2}",
};

pub const INTERNAL_ERROR: DiagnosticDescriptor = DiagnosticDescriptor {
    code: "CTFE008",
    level: DiagnosticLevel::Error,
    title: "Unexpected generator failure",
    template: "unexpected failure while generating `{0}`: {1}",
};

pub const GENERATED: DiagnosticDescriptor = DiagnosticDescriptor {
    code: "CTFE009",
    level: DiagnosticLevel::Info,
    title: "Compile-time results generated",
    template: "generated {1} cached result(s) for `{0}`, serving {2} call site(s)",
};

pub const CALL_SITE_SKIPPED: DiagnosticDescriptor = DiagnosticDescriptor {
    code: "CTFE010",
    level: DiagnosticLevel::Hint,
    title: "Call site cannot be intercepted",
    template: "call to `{0}` is left untouched: its location cannot be intercepted",
};

pub const ASYNC_FUNCTION: DiagnosticDescriptor = DiagnosticDescriptor {
    code: "CTFE011",
    level: DiagnosticLevel::Error,
    title: "Compile-time function is async",
    template: "compile-time function `{0}` must not be `async`",
};

pub const LOAD_FAILED: DiagnosticDescriptor = DiagnosticDescriptor {
    code: "CTFE012",
    level: DiagnosticLevel::Error,
    title: "Crate image could not be loaded",
    template: "failed to load the crate image for `{0}`: {1}",
};

pub const MALFORMED_DIRECTIVE: DiagnosticDescriptor = DiagnosticDescriptor {
    code: "CTFE013",
    level: DiagnosticLevel::Error,
    title: "Directive attribute is malformed",
    template: "`#[{1}]` on `{0}` is malformed: {2}",
};

pub const ALL: &[DiagnosticDescriptor] = &[
    NOT_EXTENSIBLE,
    NOT_STATIC,
    NON_LITERAL_ARGUMENT,
    EMIT_FAILED,
    INVOCATION_FAILED,
    UNSUPPORTED_RETURN_TYPE,
    SERIALIZATION_FAILED,
    INTERNAL_ERROR,
    GENERATED,
    CALL_SITE_SKIPPED,
    ASYNC_FUNCTION,
    LOAD_FAILED,
    MALFORMED_DIRECTIVE,
];

pub fn lookup(code: &str) -> Option<&'static DiagnosticDescriptor> {
    ALL.iter().find(|descriptor| descriptor.code == code)
}
