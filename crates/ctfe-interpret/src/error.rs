use thiserror::Error;

#[derive(Error, Debug)]
pub enum EvalError {
    /// The crate image or a source dependency failed to compile.
    #[error("{}", .messages.join("\n"))]
    Emit { messages: Vec<String> },
    /// The compiled image could not be used to reach the function.
    #[error("{0}")]
    Load(String),
    /// The runner failed to build, panicked or exited abnormally.
    #[error("{0}")]
    Invocation(String),
    #[error("invocation exceeded the time limit of {0} ms")]
    Timeout(u64),
    /// The runner's output does not match the declared return type.
    #[error("{0}")]
    Decode(String),
    #[error("failed to run `{program}`: {source}")]
    Toolchain {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Core(#[from] ctfe_core::Error),
}

impl EvalError {
    pub fn emit(message: impl Into<String>) -> Self {
        EvalError::Emit {
            messages: vec![message.into()],
        }
    }

    /// Messages to report, one per line of the failure.
    pub fn messages(&self) -> Vec<String> {
        match self {
            EvalError::Emit { messages } => messages.clone(),
            other => vec![other.to_string()],
        }
    }
}

pub type Result<T> = std::result::Result<T, EvalError>;
