//! Command-line driver for the compile-time function generator.

pub mod cli;
pub mod commands;
pub mod diagnostics;

pub mod error {
    use thiserror::Error;

    use crate::diagnostics::ExpressionError;

    #[derive(Error, Debug)]
    pub enum CliError {
        #[error("IO error: {0}")]
        Io(#[from] std::io::Error),

        #[error("Configuration error: {0}")]
        Config(String),

        #[error(transparent)]
        Core(#[from] ctfe_core::Error),

        #[error(transparent)]
        Pipeline(#[from] ctfe_pipeline::PipelineError),

        #[error(transparent)]
        Expression(#[from] ExpressionError),

        #[error("Invalid input: {0}")]
        InvalidInput(String),

        #[error("generation failed with {errors} error(s)")]
        Diagnostics { errors: usize },
    }

    pub type Result<T> = std::result::Result<T, CliError>;
}

pub use error::{CliError, Result};
