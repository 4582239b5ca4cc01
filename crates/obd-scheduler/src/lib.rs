//! OBD-II Poll Scheduling and Link Orchestration
//!
//! Runs the periodic poll loop over a [`DiagnosticLink`](obd_protocol::DiagnosticLink)
//! and publishes connection status, snapshots and trouble codes as
//! [`LinkEvent`]s for whatever front end is listening.

mod controller;
mod events;
mod scheduler;

pub use controller::LinkController;
pub use events::{event_channel, EventReceiver, EventSender, LinkEvent};
pub use scheduler::{PollConfig, PollScheduler, PollState, PollSummary, StopReason};
