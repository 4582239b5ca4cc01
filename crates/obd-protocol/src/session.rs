//! Adapter session setup
//!
//! Runs the fixed ELM327 initialization sequence and selects the bus
//! protocol. Non-OK replies are logged and the sequence carries on; only a
//! transport failure aborts it.

use crate::command;
use crate::error::ObdError;
use crate::framer::{is_affirmative, Framer};
use crate::profile::VehicleProfile;
use crate::protocol::ObdProtocol;
use tracing::{debug, info, warn};

/// Setup commands sent before protocol selection
const SETUP_STEPS: [(&str, &str); 5] = [
    ("Reset", command::RESET),
    ("Version", command::VERSION),
    ("Echo off", command::ECHO_OFF),
    ("Headers off", command::HEADERS_OFF),
    ("Linefeeds off", command::LINEFEEDS_OFF),
];

/// Outcome of [`initialize`]
#[derive(Debug, Default)]
pub struct InitResult {
    /// One line per command sent, in order
    pub log: Vec<String>,
    /// Reply to `ATI`
    pub firmware: Option<String>,
    /// Reply to `ATDP`
    pub active_protocol: Option<String>,
    /// Transport failure that aborted the sequence
    pub error: Option<ObdError>,
}

impl InitResult {
    pub fn ok(&self) -> bool {
        self.error.is_none()
    }

    /// Log lines joined for display
    pub fn summary(&self) -> String {
        self.log.join("\n")
    }
}

/// Bring the adapter into a known state and negotiate the bus protocol
pub async fn initialize(framer: &mut Framer, profile: Option<&VehicleProfile>) -> InitResult {
    let mut result = InitResult::default();

    if let Err(e) = run_sequence(framer, profile, &mut result).await {
        warn!("Adapter initialization aborted: {}", e);
        result.error = Some(e);
    } else {
        info!(
            "Adapter initialized, protocol: {}",
            result.active_protocol.as_deref().unwrap_or("unknown")
        );
    }

    result
}

async fn run_sequence(
    framer: &mut Framer,
    profile: Option<&VehicleProfile>,
    result: &mut InitResult,
) -> Result<(), ObdError> {
    for (label, cmd) in SETUP_STEPS {
        let response = framer.send(cmd).await?;
        result.log.push(format!("{}: {}", label, response));

        match cmd {
            command::VERSION => result.firmware = Some(response),
            command::RESET => {}
            _ if !is_affirmative(&response) => {
                warn!("Adapter replied {:?} to {}, continuing", response, cmd);
            }
            _ => {}
        }
    }

    match profile {
        Some(profile) => {
            let primary = profile.protocol_command();
            let response = framer.send(primary).await?;
            result.log.push(format!("Protocol select ({}): {}", primary, response));

            if !is_affirmative(&response) {
                let fallback = profile.fallback_command();
                warn!(
                    "{} rejected {} ({:?}), trying fallback {}",
                    profile.name, primary, response, fallback
                );
                let response = framer.send(fallback).await?;
                result.log.push(format!("Protocol fallback ({}): {}", fallback, response));
                if !is_affirmative(&response) {
                    warn!("Fallback {} not acknowledged either, continuing", fallback);
                }
            }
        }
        None => {
            let auto = ObdProtocol::Auto.to_elm_command();
            let response = framer.send(auto).await?;
            result.log.push(format!("Protocol select ({}): {}", auto, response));
        }
    }

    let description = framer.send(command::DESCRIBE_PROTOCOL).await?;
    debug!("Active protocol: {}", description);
    result.log.push(format!("Protocol: {}", description));
    result.active_protocol = Some(description);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockAdapter;
    use std::time::Duration;

    fn framer_for(adapter: MockAdapter) -> Framer {
        Framer::new(Box::new(adapter.spawn()), Duration::from_millis(200), 256)
    }

    fn fiat() -> VehicleProfile {
        VehicleProfile::find(&VehicleProfile::builtin(), "Fiat 500 Series 1")
            .cloned()
            .unwrap()
    }

    #[tokio::test]
    async fn test_auto_protocol_without_profile() {
        let adapter = MockAdapter::default();
        let history = adapter.history();
        let mut framer = framer_for(adapter);

        let result = initialize(&mut framer, None).await;
        assert!(result.ok());
        assert_eq!(
            history.commands(),
            ["ATZ", "ATI", "ATE0", "ATH0", "ATL0", "ATSP0", "ATDP"]
        );
        assert_eq!(result.firmware.as_deref(), Some("ELM327 v1.5"));
        assert_eq!(result.active_protocol.as_deref(), Some("AUTO"));
        assert_eq!(result.log.len(), 7);
        assert_eq!(result.log[0], "Reset: ELM327 v1.5");
    }

    #[tokio::test]
    async fn test_primary_protocol_accepted() {
        let adapter = MockAdapter::default();
        let history = adapter.history();
        let mut framer = framer_for(adapter);

        let result = initialize(&mut framer, Some(&fiat())).await;
        assert!(result.ok());
        assert_eq!(history.count("ATSP4"), 1);
        assert_eq!(history.count("ATSP3"), 0);
        assert_eq!(result.active_protocol.as_deref(), Some("ISO 14230-4 (KWP 5BAUD)"));
    }

    #[tokio::test]
    async fn test_fallback_sent_exactly_once() {
        let adapter = MockAdapter::default()
            .rejecting_protocol(ObdProtocol::Iso14230_4Kwp)
            .rejecting_protocol(ObdProtocol::Iso9141_2);
        let history = adapter.history();
        let mut framer = framer_for(adapter);

        let result = initialize(&mut framer, Some(&fiat())).await;
        assert!(result.ok());
        assert_eq!(history.count("ATSP4"), 1);
        assert_eq!(history.count("ATSP3"), 1);
        assert!(result.log.iter().any(|l| l == "Protocol select (ATSP4): ?"));
        assert!(result.log.iter().any(|l| l == "Protocol fallback (ATSP3): ?"));
        assert_eq!(history.commands().last().map(String::as_str), Some("ATDP"));
    }

    #[tokio::test]
    async fn test_non_ok_setup_replies_do_not_abort() {
        let adapter = MockAdapter::default()
            .with_reply("ATH0", "?")
            .with_reply("ATE0", "ERROR");
        let mut framer = framer_for(adapter);

        let result = initialize(&mut framer, None).await;
        assert!(result.ok());
        assert!(result.log.contains(&"Headers off: ?".to_string()));
        assert!(result.active_protocol.is_some());
    }

    #[tokio::test]
    async fn test_transport_failure_aborts_with_partial_log() {
        let adapter = MockAdapter::default().disconnect_after(2);
        let mut framer = framer_for(adapter);

        let result = initialize(&mut framer, None).await;
        assert!(!result.ok());
        assert!(result.error.as_ref().unwrap().is_fatal());
        assert_eq!(result.log.len(), 2);
        assert!(result.active_protocol.is_none());
    }
}
