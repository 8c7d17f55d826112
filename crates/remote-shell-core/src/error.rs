//! Error taxonomy shared by transports and sessions.

use thiserror::Error;

/// Cannot establish or resume the transport.
///
/// Never retried by the session; the caller owns reconnect policy.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Not connected")]
    NotConnected,
    #[error("Cannot resolve host {host}: {reason}")]
    Resolve { host: String, reason: String },
    #[error("Executable not found: {0}")]
    ExecutableNotFound(String),
    #[error("Failed to spawn transport: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("Host {host} unreachable: {reason}")]
    Unreachable { host: String, reason: String },
}

/// The transport failed while a command was running.
///
/// The session is left disconnected and must be reconnected by the caller.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to start remote command: {0}")]
    Spawn(String),
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Error returned by session operations.
///
/// A non-zero exit status is not an error; it is the `Ok` value of `exec`.
#[derive(Debug, Error)]
pub enum ShellError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("Command was interrupted")]
    Interrupted,
    /// Rejected before reaching the transport; the session stays connected.
    #[error("Invalid command: {0}")]
    InvalidCommand(String),
}

impl ShellError {
    /// Whether the command was cut off by an interrupt.
    #[must_use]
    pub const fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted)
    }
}
