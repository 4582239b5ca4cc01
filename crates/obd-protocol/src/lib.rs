//! OBD-II Protocol Implementation
//!
//! This crate speaks the ASCII command/response protocol of ELM327-compatible
//! adapters over TCP or serial links. It frames single exchanges, brings the
//! adapter into a known state, and decodes PID payloads and trouble codes.

mod client;
mod config;
mod dtc;
mod error;
mod framer;
mod link;
mod mock;
mod pid;
mod profile;
mod protocol;
mod session;
mod snapshot;
mod transport;

pub use client::{ObdClient, SessionInfo};
pub use config::{LinkConfig, TransportConfig, DEFAULT_BAUD_RATE, DEFAULT_HOST, DEFAULT_PORT};
pub use dtc::{decode_trouble_codes, describe_code, DtcCategory, TroubleCode, UNKNOWN_CODE};
pub use error::ObdError;
pub use framer::{is_affirmative, is_negative, normalize_response, Framer};
pub use link::{DiagnosticLink, LinkState};
pub use mock::{CommandHistory, MockAdapter};
pub use pid::{decode_metric, Formula, ParameterDefinition, Pid, Unit};
pub use profile::{poll_plan, PlannedMetric, ProfileParameter, VehicleProfile};
pub use protocol::ObdProtocol;
pub use session::{initialize, InitResult};
pub use snapshot::{MetricReading, Snapshot};
pub use transport::{open_transport, AdapterStream, BoxedStream};

/// OBD-II mode constants
pub mod mode {
    /// Current data
    pub const CURRENT_DATA: u8 = 0x01;
    /// Diagnostic trouble codes
    pub const READ_DTC: u8 = 0x03;
    /// Clear trouble codes
    pub const CLEAR_DTC: u8 = 0x04;
}

/// ELM327 command strings (sent without terminator)
pub mod command {
    /// Full adapter reset
    pub const RESET: &str = "ATZ";
    /// Firmware identification
    pub const VERSION: &str = "ATI";
    pub const ECHO_OFF: &str = "ATE0";
    pub const HEADERS_OFF: &str = "ATH0";
    pub const LINEFEEDS_OFF: &str = "ATL0";
    /// Describe the active bus protocol
    pub const DESCRIBE_PROTOCOL: &str = "ATDP";
    pub const READ_DTC: &str = "03";
    pub const CLEAR_DTC: &str = "04";
}

/// Tokens the adapter uses in its replies
pub mod marker {
    /// Prompt byte terminating every response
    pub const PROMPT: u8 = b'>';
    /// Command line terminator
    pub const TERMINATOR: u8 = b'\r';
    /// Affirmative acknowledgment
    pub const OK: &str = "OK";
    pub const NO_DATA: &str = "NO DATA";
    pub const ERROR: &str = "ERROR";
}
