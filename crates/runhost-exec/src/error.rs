//! Error types for runhost-exec

use thiserror::Error;

/// Errors that can occur during local or remote execution
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecError {
    /// Failed to connect to remote host
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Authentication failed
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The server asked for the password a second time in one session
    #[error("prompted for the password again, wrong credentials?")]
    PasswordReprompted,

    /// Process spawn error
    #[error("failed to spawn process: {0}")]
    SpawnError(String),

    /// I/O error during execution
    #[error("I/O error: {0}")]
    IoError(String),

    /// SSH channel or protocol failure after the session was established
    #[error("transport error: {0}")]
    Transport(String),

    /// Waiting for the process was interrupted
    #[error("interrupted while waiting for the process")]
    Interrupted,

    /// Connection not established
    #[error("not connected")]
    NotConnected,
}

impl ExecError {
    /// Whether the error came from the SSH transport rather than a local process
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ExecError::ConnectionFailed(_)
                | ExecError::AuthenticationFailed(_)
                | ExecError::PasswordReprompted
                | ExecError::Transport(_)
        )
    }

    pub(crate) fn from_wait(err: &std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::Interrupted {
            ExecError::Interrupted
        } else {
            ExecError::IoError(err.to_string())
        }
    }
}
