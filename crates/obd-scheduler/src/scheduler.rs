//! Poll Loop Implementation

use crate::events::{emit, EventSender, LinkEvent};
use chrono::Utc;
use metrics::counter;
use obd_protocol::{
    poll_plan, DiagnosticLink, LinkConfig, LinkState, MetricReading, ObdError, PlannedMetric,
    Snapshot, VehicleProfile,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Configuration for the poll loop
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Pause between completed cycles
    pub interval: Duration,
    /// Pause after a failed request while the link is still up
    pub error_backoff: Duration,
    /// Stop on its own after this many snapshots
    pub max_cycles: Option<u64>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            error_backoff: Duration::from_millis(1000),
            max_cycles: None,
        }
    }
}

impl From<&LinkConfig> for PollConfig {
    fn from(config: &LinkConfig) -> Self {
        Self {
            interval: config.poll_interval(),
            error_backoff: config.error_backoff(),
            max_cycles: None,
        }
    }
}

/// Lifecycle of the poll loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Running,
    Stopping,
}

/// Why the loop exited
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// `stop()` was called or the scheduler handle dropped
    Requested,
    /// A request failed and the link reported itself disconnected
    ConnectionLost,
    /// `max_cycles` snapshots were produced
    CycleLimit,
}

/// Counters returned when the loop finishes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollSummary {
    /// Snapshots produced
    pub cycles: u64,
    /// Cycles abandoned because a request failed
    pub failed_cycles: u64,
    pub stop_reason: Option<StopReason>,
}

/// Handle to a running poll loop
pub struct PollScheduler {
    stop: watch::Sender<bool>,
    state: watch::Receiver<PollState>,
    task: JoinHandle<PollSummary>,
}

impl PollScheduler {
    /// Start polling `link` on a background task.
    ///
    /// Returns `None` unless the link is initialized and idle, so a second
    /// loop never starts on a link that is already polling.
    pub fn start<L>(
        link: Arc<L>,
        profile: Option<&VehicleProfile>,
        config: PollConfig,
        events: EventSender,
    ) -> Option<Self>
    where
        L: DiagnosticLink + 'static,
    {
        let link_state = link.state();
        if link_state != LinkState::Ready {
            warn!("Not starting poll loop, link is {}", link_state);
            return None;
        }

        let plan = poll_plan(profile);
        let (stop, stop_rx) = watch::channel(false);
        let (state_tx, state) = watch::channel(PollState::Running);

        link.set_polling(true);
        let task = tokio::spawn(run(link, plan, config, events, stop_rx, state_tx));

        Some(Self { stop, state, task })
    }

    /// Ask the loop to stop; it exits at the next cycle boundary
    pub fn stop(&self) {
        self.stop.send_replace(true);
    }

    pub fn state(&self) -> PollState {
        *self.state.borrow()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the loop to exit on its own
    pub async fn join(self) -> PollSummary {
        match self.task.await {
            Ok(summary) => summary,
            Err(e) => {
                error!("Poll task failed: {}", e);
                PollSummary::default()
            }
        }
    }

    /// Stop and wait for the loop to exit
    pub async fn shutdown(self) -> PollSummary {
        self.stop();
        self.join().await
    }
}

async fn run<L: DiagnosticLink>(
    link: Arc<L>,
    plan: Vec<PlannedMetric>,
    config: PollConfig,
    events: EventSender,
    mut stop: watch::Receiver<bool>,
    state: watch::Sender<PollState>,
) -> PollSummary {
    info!("Starting poll loop with {} metrics", plan.len());
    let mut summary = PollSummary::default();

    let reason = loop {
        if stop_requested(&stop) {
            break StopReason::Requested;
        }
        if config.max_cycles.is_some_and(|max| summary.cycles >= max) {
            break StopReason::CycleLimit;
        }

        match poll_cycle(link.as_ref(), &plan).await {
            Ok(snapshot) => {
                summary.cycles += 1;
                counter!("obd_poll_cycles_total").increment(1);
                debug!(
                    "Cycle {}: {}/{} metrics available",
                    summary.cycles,
                    snapshot.available_count(),
                    plan.len()
                );
                emit(&events, LinkEvent::SnapshotProduced(snapshot));
                pause(config.interval, &mut stop).await;
            }
            Err(e) => {
                summary.failed_cycles += 1;
                counter!("obd_poll_errors_total").increment(1);
                error!("Poll cycle failed: {}", e);

                if !link.is_connected() {
                    warn!("Link lost, stopping poll loop");
                    emit(
                        &events,
                        LinkEvent::ConnectionStatusChanged {
                            success: false,
                            message: format!("Connection lost: {}", e),
                        },
                    );
                    break StopReason::ConnectionLost;
                }
                pause(config.error_backoff, &mut stop).await;
            }
        }
    };

    state.send_replace(PollState::Stopping);
    link.set_polling(false);
    summary.stop_reason = Some(reason);
    info!(
        "Poll loop stopped ({:?}) after {} cycles, {} failed",
        reason, summary.cycles, summary.failed_cycles
    );
    state.send_replace(PollState::Idle);

    summary
}

/// Request every planned metric once, in order.
///
/// A metric that cannot be decoded is recorded as unavailable; a request
/// error abandons the whole cycle.
async fn poll_cycle<L: DiagnosticLink + ?Sized>(
    link: &L,
    plan: &[PlannedMetric],
) -> Result<Snapshot, ObdError> {
    let mut readings = Vec::with_capacity(plan.len());

    for metric in plan {
        let response = link.request(&metric.pid.request()).await?;
        let definition = metric.pid.definition();
        let value = definition.decode(&response);
        if value.is_none() {
            debug!("{} unavailable: {:?}", metric.key, response);
            counter!("obd_decode_misses_total").increment(1);
        }
        readings.push(MetricReading {
            name: metric.key.clone(),
            pid: metric.pid,
            value,
            unit: definition.unit,
        });
    }

    Ok(Snapshot::new(Utc::now(), readings))
}

/// Stop flag set, or the handle holding the sender is gone
fn stop_requested(stop: &watch::Receiver<bool>) -> bool {
    stop.has_changed().is_err() || *stop.borrow()
}

async fn pause(duration: Duration, stop: &mut watch::Receiver<bool>) {
    tokio::select! {
        _ = tokio::time::sleep(duration) => {}
        _ = stop.changed() => {}
    }
}
