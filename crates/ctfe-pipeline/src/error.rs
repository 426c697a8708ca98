use ctfe_interpret::EvalError;
use thiserror::Error;

/// Failures that stop a whole pass. Per-function failures are reported as
/// diagnostics instead.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Core(#[from] ctfe_core::Error),
    #[error("failed to set up evaluation: {0}")]
    Eval(#[from] EvalError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
