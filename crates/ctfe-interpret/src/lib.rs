//! Evaluation engine: builds an image of the crate being compiled, runs
//! compile-time functions against it in child processes and reads their
//! results back as values.

pub mod assemble;
pub mod const_eval;
pub mod engine;
pub mod error;
pub mod resolve;
pub mod runner;
pub mod rustc;
pub mod sandbox;
pub mod wire;

pub use engine::{EvaluationEngine, PreparedImage};
pub use error::{EvalError, Result};
pub use resolve::{DependencyMap, ResolutionScope};
pub use rustc::{CrateType, EmitRequest, ImageEmitter, RustcEmitter};
