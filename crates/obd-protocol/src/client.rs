//! OBD-II Client for ELM327 Adapters
//!
//! Owns the adapter stream and serializes every exchange on it. Session
//! setup, on-demand trouble-code requests and the poll loop all go through
//! the same lock, so at most one command is in flight.

use crate::command;
use crate::config::LinkConfig;
use crate::dtc::{decode_trouble_codes, TroubleCode};
use crate::error::ObdError;
use crate::framer::{is_affirmative, Framer};
use crate::link::{DiagnosticLink, LinkState};
use crate::pid::Pid;
use crate::profile::VehicleProfile;
use crate::session::{initialize, InitResult};
use crate::transport::{open_transport, BoxedStream};
use async_trait::async_trait;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};

/// Adapter details captured during initialization
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionInfo {
    pub firmware: Option<String>,
    pub protocol: Option<String>,
}

/// OBD-II client for communicating with ELM327-compatible adapters
pub struct ObdClient {
    /// Link settings, fixed for the client's lifetime
    config: LinkConfig,
    /// Vehicle profile used for protocol selection
    profile: Option<VehicleProfile>,
    /// Open framer; `None` while disconnected
    framer: Mutex<Option<Framer>>,
    /// Current link state, observable by other tasks
    state: watch::Sender<LinkState>,
    /// Firmware and protocol from the last successful setup
    session: std::sync::Mutex<SessionInfo>,
}

impl ObdClient {
    /// Create a disconnected client
    pub fn new(config: LinkConfig, profile: Option<VehicleProfile>) -> Self {
        info!("Creating OBD client for {}", config.transport);
        let (state, _) = watch::channel(LinkState::Disconnected);
        Self {
            config,
            profile,
            framer: Mutex::new(None),
            state,
            session: std::sync::Mutex::new(SessionInfo::default()),
        }
    }

    /// Create a client for the simulated adapter (no hardware required)
    pub fn mock() -> Self {
        Self::new(LinkConfig::mock(), None)
    }

    /// Open the transport and run adapter setup.
    ///
    /// Any previous connection is dropped first. On failure the link is left
    /// in [`LinkState::Failed`].
    pub async fn connect(&self) -> Result<InitResult, ObdError> {
        let mut guard = self.framer.lock().await;
        if let Some(mut old) = guard.take() {
            debug!("Dropping previous adapter connection");
            old.shutdown().await;
        }
        self.set_state(LinkState::Connecting);

        let stream = match open_transport(&self.config).await {
            Ok(stream) => stream,
            Err(e) => {
                error!("Failed to open {}: {}", self.config.transport, e);
                self.set_state(LinkState::Failed);
                return Err(e);
            }
        };

        self.setup(&mut guard, stream).await
    }

    /// Run adapter setup over an already open stream
    pub async fn connect_with(&self, stream: BoxedStream) -> Result<InitResult, ObdError> {
        let mut guard = self.framer.lock().await;
        if let Some(mut old) = guard.take() {
            old.shutdown().await;
        }
        self.set_state(LinkState::Connecting);
        self.setup(&mut guard, stream).await
    }

    async fn setup(
        &self,
        slot: &mut Option<Framer>,
        stream: BoxedStream,
    ) -> Result<InitResult, ObdError> {
        let mut framer = Framer::new(stream, self.config.timeout(), self.config.buffer_size);
        let mut result = initialize(&mut framer, self.profile.as_ref()).await;

        if let Some(e) = result.error.take() {
            error!("Adapter setup failed after {} steps: {}", result.log.len(), e);
            self.set_state(LinkState::Failed);
            return Err(e);
        }

        *self.session.lock().unwrap_or_else(|e| e.into_inner()) = SessionInfo {
            firmware: result.firmware.clone(),
            protocol: result.active_protocol.clone(),
        };
        *slot = Some(framer);
        self.set_state(LinkState::Ready);
        info!("OBD link ready on {}", self.config.transport);
        Ok(result)
    }

    /// Send one raw command on a ready link.
    ///
    /// A fatal transport error tears the socket down and moves the link to
    /// [`LinkState::Failed`].
    pub async fn request(&self, command: &str) -> Result<String, ObdError> {
        let mut guard = self.framer.lock().await;

        let state = self.state();
        let framer = match guard.as_mut() {
            Some(framer) if state.is_ready() => framer,
            _ => return Err(ObdError::NotReady(state)),
        };

        match framer.send(command).await {
            Ok(response) => Ok(response),
            Err(e) => {
                if e.is_fatal() {
                    error!("Transport failure on {:?}: {}", command, e);
                    *guard = None;
                    self.set_state(LinkState::Failed);
                } else {
                    warn!("Request {:?} failed: {}", command, e);
                }
                Err(e)
            }
        }
    }

    /// Query a PID and decode it; `Ok(None)` when the value is unavailable
    pub async fn read_metric(&self, pid: Pid) -> Result<Option<f64>, ObdError> {
        let response = self.request(&pid.request()).await?;
        Ok(pid.definition().decode(&response))
    }

    /// Read stored trouble codes (mode 03)
    pub async fn read_trouble_codes(&self) -> Result<Vec<TroubleCode>, ObdError> {
        let response = self.request(command::READ_DTC).await?;
        let codes = decode_trouble_codes(&response);
        info!("Read {} trouble codes", codes.len());
        Ok(codes)
    }

    /// Clear stored trouble codes (mode 04)
    pub async fn clear_trouble_codes(&self) -> Result<(), ObdError> {
        let response = self.request(command::CLEAR_DTC).await?;
        if is_affirmative(&response) {
            info!("Trouble codes cleared");
            Ok(())
        } else {
            warn!("Clear trouble codes not acknowledged: {:?}", response);
            Err(ObdError::ClearRejected(response))
        }
    }

    /// Disconnect from the OBD adapter
    pub async fn disconnect(&self) {
        let mut guard = self.framer.lock().await;
        if let Some(mut framer) = guard.take() {
            info!("Disconnecting OBD client");
            framer.shutdown().await;
        }
        *self.session.lock().unwrap_or_else(|e| e.into_inner()) = SessionInfo::default();
        self.set_state(LinkState::Disconnected);
    }

    /// Current link state
    pub fn state(&self) -> LinkState {
        *self.state.borrow()
    }

    /// Receiver that sees every state change
    pub fn subscribe_state(&self) -> watch::Receiver<LinkState> {
        self.state.subscribe()
    }

    /// Check if client is connected
    pub fn is_connected(&self) -> bool {
        self.state().is_ready()
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn profile(&self) -> Option<&VehicleProfile> {
        self.profile.as_ref()
    }

    /// Firmware and protocol reported during the last setup
    pub fn session_info(&self) -> SessionInfo {
        self.session.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn set_state(&self, next: LinkState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!("Link state {} -> {}", previous, next);
        }
    }
}

#[async_trait]
impl DiagnosticLink for ObdClient {
    async fn request(&self, command: &str) -> Result<String, ObdError> {
        ObdClient::request(self, command).await
    }

    fn state(&self) -> LinkState {
        ObdClient::state(self)
    }

    fn set_polling(&self, active: bool) {
        self.state.send_if_modified(|state| match (active, *state) {
            (true, LinkState::Ready) => {
                *state = LinkState::Polling;
                true
            }
            (false, LinkState::Polling) => {
                *state = LinkState::Ready;
                true
            }
            _ => false,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_client_connects() {
        let client = ObdClient::mock();
        assert_eq!(client.state(), LinkState::Disconnected);

        let result = client.connect().await.unwrap();
        assert!(result.ok());
        assert!(client.is_connected());
        assert_eq!(client.state(), LinkState::Ready);
        assert_eq!(client.session_info().firmware.as_deref(), Some("ELM327 v1.5"));
        assert_eq!(client.session_info().protocol.as_deref(), Some("AUTO"));
    }

    #[tokio::test]
    async fn test_requests_rejected_before_connect() {
        let client = ObdClient::mock();
        assert!(matches!(
            client.read_metric(Pid::Speed).await,
            Err(ObdError::NotReady(LinkState::Disconnected))
        ));
        assert!(matches!(
            client.read_trouble_codes().await,
            Err(ObdError::NotReady(_))
        ));
    }

    #[tokio::test]
    async fn test_mock_pid_query() {
        let client = ObdClient::mock();
        client.connect().await.unwrap();
        let rpm = client.read_metric(Pid::EngineRpm).await.unwrap().unwrap();
        assert!((800.0..=3500.0).contains(&rpm));
    }

    #[tokio::test]
    async fn test_polling_flag_transitions() {
        let client = ObdClient::mock();
        client.set_polling(true);
        assert_eq!(client.state(), LinkState::Disconnected);

        client.connect().await.unwrap();
        client.set_polling(true);
        assert_eq!(client.state(), LinkState::Polling);
        assert!(client.is_connected());
        client.set_polling(false);
        assert_eq!(client.state(), LinkState::Ready);
    }

    #[tokio::test]
    async fn test_disconnect_resets_state() {
        let client = ObdClient::mock();
        client.connect().await.unwrap();
        client.disconnect().await;
        assert_eq!(client.state(), LinkState::Disconnected);
        assert_eq!(client.session_info(), SessionInfo::default());
        assert!(client.request("ATI").await.is_err());
    }

    #[tokio::test]
    async fn test_connect_failure_marks_failed() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = ObdClient::new(LinkConfig::tcp("127.0.0.1", port), None);
        assert!(client.connect().await.is_err());
        assert_eq!(client.state(), LinkState::Failed);
    }

    #[tokio::test]
    async fn test_connect_with_custom_adapter() {
        let client = ObdClient::mock();
        let adapter = crate::mock::MockAdapter::default().with_trouble_code("P0301");
        client.connect_with(Box::new(adapter.spawn())).await.unwrap();

        let codes = client.read_trouble_codes().await.unwrap();
        assert_eq!(codes.len(), 1);
        assert_eq!(codes[0].code, "P0301");
    }

    #[tokio::test]
    async fn test_clear_requires_acknowledgment() {
        let client = ObdClient::mock();
        let adapter = crate::mock::MockAdapter::default().with_reply("04", "?");
        client.connect_with(Box::new(adapter.spawn())).await.unwrap();

        assert!(matches!(
            client.clear_trouble_codes().await,
            Err(ObdError::ClearRejected(_))
        ));
        assert!(client.is_connected());
    }

    #[tokio::test]
    async fn test_transport_failure_tears_down_link() {
        let client = ObdClient::mock();
        // Seven setup commands, then one answered request
        let adapter = crate::mock::MockAdapter::default().disconnect_after(8);
        client.connect_with(Box::new(adapter.spawn())).await.unwrap();

        assert!(client.read_metric(Pid::Speed).await.is_ok());
        let err = client.read_metric(Pid::Speed).await.unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(client.state(), LinkState::Failed);
        assert!(matches!(
            client.read_metric(Pid::Speed).await,
            Err(ObdError::NotReady(LinkState::Failed))
        ));
    }

    #[tokio::test]
    async fn test_stalled_write_tears_down_link() {
        use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

        let client = ObdClient::mock();
        let (stream, mut adapter) = duplex(64);
        // Answers the seven setup commands, then stops reading
        let peer = tokio::spawn(async move {
            let mut buf = [0u8; 64];
            for _ in 0..7 {
                let _ = adapter.read(&mut buf).await.unwrap();
                adapter.write_all(b"OK\r\r>").await.unwrap();
            }
            adapter
        });
        client.connect_with(Box::new(stream)).await.unwrap();
        let _adapter = peer.await.unwrap();

        let err = client.request(&"01".repeat(64)).await.unwrap_err();
        assert!(matches!(err, ObdError::WriteTimeout(_)));
        assert_eq!(client.state(), LinkState::Failed);
        assert!(matches!(
            client.request("010D").await,
            Err(ObdError::NotReady(LinkState::Failed))
        ));
    }

    #[tokio::test]
    async fn test_state_changes_are_observable() {
        let client = ObdClient::mock();
        let mut states = client.subscribe_state();
        client.connect().await.unwrap();
        states.changed().await.unwrap();
        assert_eq!(*states.borrow_and_update(), LinkState::Ready);
    }
}
