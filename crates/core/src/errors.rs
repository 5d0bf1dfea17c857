//! Error types and handling
//!
//! Domain errors for the ContainAI CLI core. Every subcommand converts
//! failures into one of these kinds before crossing the CLI boundary.

use thiserror::Error;

/// Domain errors for the ContainAI CLI
#[derive(Error, Debug)]
pub enum CaiError {
    /// User input errors (unknown flag, missing value, mutually exclusive flags)
    #[error("{0}")]
    InvalidInput(String),

    /// Environment misconfiguration (missing context, unmanaged container, ambiguity)
    #[error("{0}")]
    Environment(String),

    /// Engine command failure; carries the child's trimmed stderr and exit code
    #[error("{stderr}")]
    Engine { stderr: String, exit_code: i32 },

    /// Child program not found on PATH
    #[error("{program}: command not found")]
    ChildMissing { program: String },

    /// Operation cancelled; the child subtree has been killed
    #[error("operation cancelled")]
    Cancelled,

    /// Configuration file errors
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl CaiError {
    /// Process exit code this error maps to at the subcommand boundary.
    pub fn exit_code(&self) -> i32 {
        match self {
            CaiError::Engine { exit_code, .. } => *exit_code,
            CaiError::ChildMissing { .. } => 127,
            CaiError::Cancelled => 130,
            _ => 1,
        }
    }
}

/// Convenience type alias for Results with CaiError
pub type Result<T> = std::result::Result<T, CaiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_error_kind() {
        assert_eq!(CaiError::InvalidInput("x".into()).exit_code(), 1);
        assert_eq!(
            CaiError::ChildMissing {
                program: "docker".into()
            }
            .exit_code(),
            127
        );
        assert_eq!(
            CaiError::Engine {
                stderr: "boom".into(),
                exit_code: 3
            }
            .exit_code(),
            3
        );
        assert_ne!(CaiError::Cancelled.exit_code(), 0);
    }
}
