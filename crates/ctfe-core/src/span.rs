use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// A physical position in a source file. Lines and columns are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Location {
    pub file: PathBuf,
    pub line: u32,
    pub column: u32,
    /// The position was recovered from tokens inside a macro invocation.
    #[serde(default)]
    pub in_macro: bool,
}

impl Location {
    pub fn new(file: impl Into<PathBuf>, line: u32, column: u32) -> Self {
        Self {
            file: file.into(),
            line,
            column,
            in_macro: false,
        }
    }

    pub fn inside_macro(mut self) -> Self {
        self.in_macro = true;
        self
    }

    /// Locations without line information cannot be addressed by a binding.
    pub fn is_known(&self) -> bool {
        self.line > 0
    }

    pub fn file(&self) -> &Path {
        &self.file
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.file.display(), self.line, self.column)
    }
}
