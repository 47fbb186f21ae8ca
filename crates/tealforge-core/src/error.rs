//! Error types for the compile lifecycle

use crate::artifacts::CollectError;
use crate::request::PayloadError;
use crate::runner::RunError;
use crate::workspace::WorkspaceError;
use thiserror::Error;

/// Which side of the exchange a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Bad input; the filesystem was never touched.
    Client,
    /// Workspace, compiler or artifact failure.
    Server,
}

/// Terminal failure of a single compile request
#[derive(Debug, Error)]
pub enum CompileError {
    /// Payload rejected before any workspace existed
    #[error(transparent)]
    Validation(#[from] PayloadError),

    /// Workspace could not be created or seeded
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    /// The compiler executable could not be started
    #[error("Failed to launch `{program}`: {message}")]
    Launch { program: String, message: String },

    /// The compiler outlived its wall-clock budget and was killed
    #[error("Process timed out after {timeout_ms}ms\n{stderr}")]
    Timeout { timeout_ms: u64, stderr: String },

    /// The compiler exited unsuccessfully
    #[error("Process exited with code {}\n{stderr}", .code.map(|c| c.to_string()).unwrap_or_else(|| "signal".to_string()))]
    ProcessExit { code: Option<i32>, stderr: String },

    /// The compiler succeeded but nothing matched the artifact filter
    #[error("No expected artifacts produced (looked for: {})", .expected.join(", "))]
    NoArtifacts { expected: Vec<String> },

    /// The output tree could not be read
    #[error(transparent)]
    Collect(#[from] CollectError),

    /// Blocking task panicked or was cancelled
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CompileError {
    pub fn class(&self) -> FailureClass {
        match self {
            CompileError::Validation(_) => FailureClass::Client,
            _ => FailureClass::Server,
        }
    }
}

impl From<RunError> for CompileError {
    fn from(err: RunError) -> Self {
        match err {
            RunError::Launch { program, source } => CompileError::Launch {
                program,
                message: source.to_string(),
            },
            RunError::Timeout { timeout_ms, stderr } => CompileError::Timeout { timeout_ms, stderr },
            RunError::Exit { code, stderr } => CompileError::ProcessExit { code, stderr },
            RunError::Io(err) => CompileError::Internal(format!("compiler I/O failed: {err}")),
        }
    }
}

impl From<tokio::task::JoinError> for CompileError {
    fn from(err: tokio::task::JoinError) -> Self {
        CompileError::Internal(format!("blocking task failed: {err}"))
    }
}

/// Result type alias for compile operations
pub type CompileResult<T> = Result<T, CompileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_is_a_client_failure() {
        let err = CompileError::Validation(PayloadError::MissingCode);
        assert_eq!(err.class(), FailureClass::Client);
    }

    #[test]
    fn compiler_failures_are_server_failures() {
        let err = CompileError::from(RunError::Exit {
            code: Some(2),
            stderr: "boom".to_string(),
        });
        assert_eq!(err.class(), FailureClass::Server);
        assert_eq!(err.to_string(), "Process exited with code 2\nboom");
    }

    #[test]
    fn no_artifacts_names_the_expected_suffixes() {
        let err = CompileError::NoArtifacts {
            expected: vec![".arc32.json".to_string(), ".arc4.json".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "No expected artifacts produced (looked for: .arc32.json, .arc4.json)"
        );
    }

    #[test]
    fn signal_exit_has_no_numeric_code() {
        let err = CompileError::ProcessExit {
            code: None,
            stderr: String::new(),
        };
        assert!(err.to_string().starts_with("Process exited with code signal"));
    }
}
