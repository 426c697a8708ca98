#[macro_use]
pub mod macros;

pub mod codes;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod host;
pub mod model;
pub mod shape;
pub mod span;
pub mod value;

// Re-export commonly used items for convenience
pub use tracing;

pub use config::CtfeConfig;
pub use diagnostics::{Diagnostic, DiagnosticLevel, DiagnosticManager, DiagnosticSink};
pub use host::{Compilation, GeneratedUnit, SourceUnit};
pub use model::{AnnotatedFunction, ArgumentGroup, CallSite, CallSiteKind, FunctionId};
pub use shape::{Primitive, Shape};
pub use span::Location;
pub use value::Value;

// Alias for error types
pub type Error = crate::error::Error;
pub type Result<T> = crate::error::Result<T>;
