//! Unified error type for the taskforge engine.
//!
//! All crates funnel their failures into [`Error`]. Callers at the top of a
//! run tell usage problems apart from execution failures with
//! [`Error::is_usage`], since the two need different operator responses.

/// Unified error type covering all failure modes of a script run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed command-line input. The payload is the rendered help text.
    #[error("{0}")]
    Usage(String),

    /// A programmer error in the command tree or engine setup (bad flag
    /// default type, unknown policy bits, ...).
    #[error("Configuration error: {0}")]
    Config(String),

    /// The run's cancellation token fired before an action could start.
    #[error("cancelled")]
    Cancelled,

    /// A failure raised by an action's own logic.
    #[error("{0}")]
    Action(String),

    /// An external process failed to spawn or exited unsuccessfully.
    #[error("Tool error [{tool}]: {message}")]
    Tool {
        /// Program that failed.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// An action failed and the rollback sequence it triggered failed too.
    #[error("{error}, rollback failed: {rollback}")]
    Rollback {
        /// The failure that triggered the rollback.
        error: Box<Error>,
        /// The failure raised while rolling back.
        rollback: Box<Error>,
    },
}

impl Error {
    /// Whether this error is a usage message rather than an execution failure.
    pub fn is_usage(&self) -> bool {
        matches!(self, Error::Usage(_))
    }

    /// Whether the run was cancelled before an action could start.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// Convenience constructor for [`Error::Usage`].
    pub fn usage(message: impl Into<String>) -> Self {
        Error::Usage(message.into())
    }

    /// Convenience constructor for [`Error::Config`].
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(message.into())
    }

    /// Convenience constructor for [`Error::Action`].
    pub fn action(message: impl Into<String>) -> Self {
        Error::Action(message.into())
    }

    /// Convenience constructor for [`Error::Tool`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Combine a triggering failure with the failure of its rollback.
    pub fn rollback(error: Error, rollback: Error) -> Self {
        Error::Rollback {
            error: Box::new(error),
            rollback: Box::new(rollback),
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
