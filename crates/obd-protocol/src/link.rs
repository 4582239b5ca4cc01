//! Link state and the request seam used by the poller

use crate::error::ObdError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a diagnostic link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkState {
    /// No socket
    Disconnected,
    /// Socket opening or adapter initialization in progress
    Connecting,
    /// Initialized, idle
    Ready,
    /// Initialized, poll loop active
    Polling,
    /// Transport failure tore the socket down
    Failed,
}

impl LinkState {
    /// Whether requests (polling, trouble codes) are allowed
    pub fn is_ready(&self) -> bool {
        matches!(self, LinkState::Ready | LinkState::Polling)
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LinkState::Disconnected => "disconnected",
            LinkState::Connecting => "connecting",
            LinkState::Ready => "ready",
            LinkState::Polling => "polling",
            LinkState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// One-exchange-at-a-time access to an initialized adapter
#[async_trait]
pub trait DiagnosticLink: Send + Sync {
    /// Send one command and return the normalized response
    async fn request(&self, command: &str) -> Result<String, ObdError>;

    /// Current link state
    fn state(&self) -> LinkState;

    /// Connectivity flag consulted after request failures
    fn is_connected(&self) -> bool {
        self.state().is_ready()
    }

    /// Move between Ready and Polling as the poll loop starts and stops
    fn set_polling(&self, active: bool);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_states() {
        assert!(LinkState::Ready.is_ready());
        assert!(LinkState::Polling.is_ready());
        assert!(!LinkState::Connecting.is_ready());
        assert!(!LinkState::Failed.is_ready());
        assert!(!LinkState::Disconnected.is_ready());
    }
}
