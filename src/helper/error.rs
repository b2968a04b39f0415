// ABOUTME: Failures of a single signing helper invocation.
// ABOUTME: Exit failures keep the helper's stderr verbatim for diagnostics.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// How a helper that ran to completion reported failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExitFailure {
    /// Nonzero exit with diagnostic output.
    #[error("{0}")]
    Stderr(String),

    /// Nonzero exit without diagnostic output.
    #[error("helper exited with status {0}")]
    Code(i32),

    #[error("helper terminated by signal {0}")]
    Signal(i32),
}

#[derive(Debug, Error)]
pub enum HelperError {
    #[error("failed to spawn {}: {source}", .program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot pass connection socket as descriptor {fd}: {reason}")]
    FdMapping { fd: i32, reason: String },

    #[error("helper I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Exit(ExitFailure),

    #[error("helper did not finish within {0:?}")]
    Timeout(Duration),
}

impl HelperError {
    /// Text to show the user: the helper's stderr when it wrote any.
    pub fn diagnostic(&self) -> String {
        match self {
            HelperError::Exit(ExitFailure::Stderr(text)) => text.clone(),
            other => other.to_string(),
        }
    }
}
