//! OBD-II Error Types

use crate::link::LinkState;
use thiserror::Error;

/// Errors that can occur during OBD-II communication
#[derive(Debug, Error)]
pub enum ObdError {
    /// Socket or serial port failure (connect, read or write)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Adapter closed the connection
    #[error("Connection closed by adapter")]
    ConnectionClosed,

    /// Connection attempt did not complete in time
    #[error("Timed out connecting to {target} after {timeout_ms}ms")]
    ConnectTimeout { target: String, timeout_ms: u64 },

    /// Command could not be written within the exchange timeout; part of it
    /// may already be on the wire
    #[error("Timeout writing OBD command after {0}ms")]
    WriteTimeout(u64),

    /// Operation requires a Ready or Polling link
    #[error("Link is {0}, operation requires a ready link")]
    NotReady(LinkState),

    /// Adapter did not acknowledge a clear-codes request
    #[error("Adapter did not acknowledge clearing trouble codes: {0:?}")]
    ClearRejected(String),

    /// Parameter identifier not in the registry
    #[error("Unknown parameter identifier: {0}")]
    UnknownPid(String),

    /// Vehicle profile not found
    #[error("Unknown vehicle profile: {0}")]
    UnknownProfile(String),
}

impl ObdError {
    /// Whether the error means the socket is unusable and must be torn down
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ObdError::Transport(_)
                | ObdError::ConnectionClosed
                | ObdError::ConnectTimeout { .. }
                | ObdError::WriteTimeout(_)
        )
    }
}

impl From<std::io::Error> for ObdError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::BrokenPipe => ObdError::ConnectionClosed,
            _ => ObdError::Transport(err.to_string()),
        }
    }
}

impl From<tokio_serial::Error> for ObdError {
    fn from(err: tokio_serial::Error) -> Self {
        ObdError::Transport(err.to_string())
    }
}
